//! Bindings map abstract identifiers to the producers which can create concrete instances.
//!
//! An abstract identifier is either a concrete Rust type or a string alias - both can be used
//! interchangeably as lookup keys. The concrete side of a binding is a [Producer]: a literal value
//! returned unchanged on every resolution, or a factory closure invoked with the container itself,
//! so it can resolve further dependencies.

use crate::container::Container;
use crate::instance::{AnyInstancePtr, ErrorPtr};
use crate::invoker::Arguments;
use std::any::{type_name, Any, TypeId};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Abstract identifier under which a producer or instance is registered.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum BindingKey {
    /// Keyed by a concrete Rust type.
    Type { id: TypeId, name: &'static str },
    /// Keyed by a string alias, e.g. `"config"` or `"middlewares.auth"`.
    Name(String),
}

impl BindingKey {
    /// Creates a key for a concrete type.
    pub fn of<T: Any + ?Sized>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Creates a key for a string alias.
    pub fn named<T: Into<String>>(name: T) -> Self {
        Self::Name(name.into())
    }
}

impl Display for BindingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingKey::Type { name, .. } => f.write_str(name),
            BindingKey::Name(name) => f.write_str(name),
        }
    }
}

/// Factory closure building a type-erased instance. Receives the container for resolving nested
/// dependencies and the arguments supplied by the caller, if any. Must not suspend - asynchronous
/// work belongs in bound methods, not in the resolution path.
pub type FactoryFn =
    Arc<dyn Fn(&mut Container, &Arguments) -> Result<AnyInstancePtr, ErrorPtr> + Send + Sync>;

/// The concrete side of a binding.
#[derive(Clone)]
pub enum Producer {
    /// A literal value; resolving returns it unchanged.
    Value(AnyInstancePtr),
    /// A factory invoked on every build.
    Factory(FactoryFn),
}

impl Debug for Producer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Producer::Value(_) => f.write_str("Value"),
            Producer::Factory(_) => f.write_str("Factory"),
        }
    }
}

impl Producer {
    /// Wraps a literal value.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// Wraps an already-erased literal value.
    pub fn value_ptr(value: AnyInstancePtr) -> Self {
        Self::Value(value)
    }

    /// Wraps a factory which ignores caller-supplied arguments.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Container) -> Result<T, ErrorPtr> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move |container, _arguments| {
            factory(container).map(|value| Arc::new(value) as AnyInstancePtr)
        }))
    }

    /// Wraps a factory which receives the arguments supplied to `make_with`.
    pub fn factory_with_args<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Container, &Arguments) -> Result<T, ErrorPtr> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move |container, arguments| {
            factory(container, arguments).map(|value| Arc::new(value) as AnyInstancePtr)
        }))
    }
}

/// A registered abstract-to-concrete mapping.
#[derive(Clone, Debug)]
pub struct Binding {
    pub producer: Producer,
    /// Shared bindings are built once and cached for the process lifetime.
    pub shared: bool,
}

#[cfg(test)]
mod tests {
    use crate::binding::BindingKey;

    #[test]
    fn should_distinguish_type_and_name_keys() {
        assert_ne!(BindingKey::of::<i8>(), BindingKey::of::<u8>());
        assert_ne!(BindingKey::of::<i8>(), BindingKey::named("i8"));
        assert_eq!(BindingKey::named("config"), BindingKey::named("config"));
    }

    #[test]
    fn should_display_alias_and_type_names() {
        assert_eq!(BindingKey::named("config").to_string(), "config");
        assert_eq!(BindingKey::of::<i8>().to_string(), "i8");
    }
}
