//! Runtime dependency injection container with explicitly registered bindings.
//!
//! Unlike derive-based frameworks which discover components at compile time, this container is
//! populated at runtime, typically by service providers during application bootstrap. Bindings map
//! an abstract [BindingKey](binding::BindingKey) to a [Producer](binding::Producer) - either a
//! literal value or a factory closure which can pull its own dependencies from the container.
//! Shared (singleton) bindings are built once and cached for the process lifetime; everything else
//! is built fresh on every resolution.
//!
//! On top of plain resolution, the container supports bound methods: handlers registered under
//! `"Class@method"` keys with an explicit parameter list, invoked through
//! [Container::call](container::Container::call) with dependency-injected parameters.

pub mod binding;
pub mod container;
pub mod error;
pub mod instance;
pub mod invoker;
pub mod registry;
