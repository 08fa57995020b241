//! Application framework built on the [trellis_container] dependency injection container.
//!
//! An [Application](application::Application) owns the one authoritative container and walks a
//! fixed startup sequence expressed as [bootstrappers](bootstrap::Bootstrapper): load the
//! environment, load configuration, register the configured
//! [service providers](provider::ServiceProvider) and finally boot them. Each provider binds its
//! services during `register` and wires them during `boot`, once every provider had the chance to
//! register. After boot the application reaches steady state: everything else resolves services
//! through the container or invokes bound methods through it.

pub mod application;
pub mod bootstrap;
pub mod command;
pub mod config;
pub mod middleware;
pub mod provider;
