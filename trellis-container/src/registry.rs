//! Storage for abstract-to-concrete bindings and their shared flags.

use crate::binding::{Binding, BindingKey, Producer};
use fxhash::FxHashMap;

/// Stores at most one binding per abstract key. Rebinding is always legal and replaces the
/// previous entry; notification of interested parties happens one level up, in the container.
#[derive(Clone, Debug, Default)]
pub struct BindingRegistry {
    bindings: FxHashMap<BindingKey, Binding>,
}

impl BindingRegistry {
    /// Registers `producer` under `key`, replacing any previous binding.
    pub fn insert(&mut self, key: BindingKey, producer: Producer, shared: bool) {
        self.bindings.insert(key, Binding { producer, shared });
    }

    pub fn get(&self, key: &BindingKey) -> Option<&Binding> {
        self.bindings.get(key)
    }

    #[inline]
    pub fn is_bound(&self, key: &BindingKey) -> bool {
        self.bindings.contains_key(key)
    }

    /// A key is shared when its binding was registered as a singleton. Unbound keys are not
    /// shared.
    #[inline]
    pub fn is_shared(&self, key: &BindingKey) -> bool {
        self.bindings
            .get(key)
            .map(|binding| binding.shared)
            .unwrap_or(false)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
