//! Core resolution functionality: the [Container] owns the binding registry, the instance cache
//! for shared bindings, the build stack and the bound-method registries.
//!
//! Resolution is deliberately forgiving: asking for an unbound key is not an error but a soft
//! miss, reported as `None` (or a caller-supplied default through [Container::make_or]). Factory
//! errors, on the other hand, propagate unmodified to the caller.
//!
//! Note: rebinding a shared key does *not* evict an instance already sitting in the cache. The
//! rebound hooks registered via [Container::on_rebound] fire and are expected to call
//! [Container::forget_instance] themselves when eviction is the desired behavior.

use crate::binding::{BindingKey, Producer};
use crate::error::ContainerError;
use crate::instance::{convert_error, AnyInstancePtr, ErrorPtr, InstancePtr};
use crate::invoker::{Arguments, MethodBinding, MethodOverride};
use crate::registry::BindingRegistry;
use fxhash::FxHashMap;
use tracing::debug;

/// Callback fired when an already-resolved key is bound again.
pub type ReboundCallback = Box<dyn FnMut(&mut Container) + Send>;

/// Owner of all binding state for one application. Only one container is expected per process,
/// reached through explicitly passed handles rather than ambient globals.
#[derive(Default)]
pub struct Container {
    registry: BindingRegistry,
    instances: FxHashMap<BindingKey, AnyInstancePtr>,
    rebound_callbacks: FxHashMap<BindingKey, Vec<ReboundCallback>>,
    methods: FxHashMap<String, MethodBinding>,
    overrides: FxHashMap<String, MethodOverride>,
    build_stack: Vec<String>,
}

impl Container {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `producer` under `key`, replacing any previous binding. When the key was already
    /// resolved, the rebound hooks fire; the cache entry itself stays untouched.
    pub fn bind(&mut self, key: BindingKey, producer: Producer, shared: bool) {
        self.registry.insert(key.clone(), producer, shared);

        if self.resolved(&key) {
            self.fire_rebound(&key);
        }
    }

    /// Sugar for a shared [Container::bind].
    pub fn singleton(&mut self, key: BindingKey, producer: Producer) {
        self.bind(key, producer, true);
    }

    /// Seeds the instance cache directly, bypassing normal building. The value is treated as
    /// already shared.
    pub fn instance<T: Send + Sync + 'static>(
        &mut self,
        key: BindingKey,
        value: T,
    ) -> InstancePtr<T> {
        let instance = InstancePtr::new(value);
        self.instances
            .insert(key, instance.clone() as AnyInstancePtr);
        instance
    }

    /// [Container::instance] for an already-erased pointer.
    pub fn instance_ptr(&mut self, key: BindingKey, value: AnyInstancePtr) {
        self.instances.insert(key, value);
    }

    /// Removes a cached instance, returning it. The designated way for rebound hooks to make a
    /// fresh binding visible for shared keys.
    pub fn forget_instance(&mut self, key: &BindingKey) -> Option<AnyInstancePtr> {
        self.instances.remove(key)
    }

    /// Registers a hook fired whenever `key` is rebound after having been resolved.
    pub fn on_rebound(&mut self, key: BindingKey, callback: ReboundCallback) {
        self.rebound_callbacks.entry(key).or_default().push(callback);
    }

    /// Whether `key` has an instance in the cache.
    #[inline]
    pub fn resolved(&self, key: &BindingKey) -> bool {
        self.instances.contains_key(key)
    }

    #[inline]
    pub fn is_bound(&self, key: &BindingKey) -> bool {
        self.registry.is_bound(key)
    }

    #[inline]
    pub fn is_shared(&self, key: &BindingKey) -> bool {
        self.registry.is_shared(key)
    }

    /// Resolves `key` to a type-erased instance. Returns `Ok(None)` when nothing is bound under
    /// the key - callers decide whether that is an error. Shared keys are built at most once;
    /// arguments supplied after the first build of a shared key are ignored.
    pub fn resolve(
        &mut self,
        key: &BindingKey,
        arguments: &Arguments,
    ) -> Result<Option<AnyInstancePtr>, ErrorPtr> {
        let producer = match self.producer_for(key) {
            Some(producer) => producer,
            None => return Ok(None),
        };

        if !self.registry.is_shared(key) {
            return self.build(&producer, arguments).map(Some);
        }

        if let Some(existing) = self.instances.get(key) {
            return Ok(Some(existing.clone()));
        }

        let instance = self.build(&producer, arguments)?;
        debug!("Caching shared instance for {key}");
        self.instances.insert(key.clone(), instance.clone());
        Ok(Some(instance))
    }

    /// Typed resolution. `Ok(None)` is the soft miss; a cached or built instance of the wrong
    /// type is [ContainerError::IncompatibleInstance].
    pub fn make<T: Send + Sync + 'static>(
        &mut self,
        key: &BindingKey,
    ) -> Result<Option<InstancePtr<T>>, ErrorPtr> {
        self.make_with(key, &Arguments::new())
    }

    /// [Container::make] with explicit arguments forwarded to the factory.
    pub fn make_with<T: Send + Sync + 'static>(
        &mut self,
        key: &BindingKey,
        arguments: &Arguments,
    ) -> Result<Option<InstancePtr<T>>, ErrorPtr> {
        match self.resolve(key, arguments)? {
            Some(instance) => instance.downcast::<T>().map(Some).map_err(|_| {
                convert_error(ContainerError::IncompatibleInstance {
                    key: key.to_string(),
                })
            }),
            None => Ok(None),
        }
    }

    /// Soft-miss helper: returns `default` when nothing is bound under `key`.
    pub fn make_or<T: Send + Sync + 'static>(
        &mut self,
        key: &BindingKey,
        default: T,
    ) -> Result<InstancePtr<T>, ErrorPtr> {
        Ok(self
            .make(key)?
            .unwrap_or_else(|| InstancePtr::new(default)))
    }

    /// Fallback chain for the concrete side: explicit binding, then an already-cached instance.
    fn producer_for(&self, key: &BindingKey) -> Option<Producer> {
        if let Some(binding) = self.registry.get(key) {
            return Some(binding.producer.clone());
        }

        self.instances.get(key).cloned().map(Producer::Value)
    }

    fn build(
        &mut self,
        producer: &Producer,
        arguments: &Arguments,
    ) -> Result<AnyInstancePtr, ErrorPtr> {
        match producer {
            Producer::Value(value) => Ok(value.clone()),
            Producer::Factory(factory) => factory(self, arguments),
        }
    }

    fn fire_rebound(&mut self, key: &BindingKey) {
        if let Some(mut callbacks) = self.rebound_callbacks.remove(key) {
            for callback in &mut callbacks {
                callback(self);
            }

            // hooks registered while firing are preserved
            callbacks.extend(self.rebound_callbacks.remove(key).unwrap_or_default());
            self.rebound_callbacks.insert(key.clone(), callbacks);
        }
    }

    /// Class names currently being invoked through the bound-method path. Diagnostic only.
    pub fn build_stack(&self) -> &[String] {
        &self.build_stack
    }

    pub(crate) fn push_build_stack(&mut self, class: &str) -> bool {
        if self.build_stack.iter().any(|entry| entry == class) {
            return false;
        }

        self.build_stack.push(class.to_string());
        true
    }

    pub(crate) fn pop_build_stack(&mut self) {
        self.build_stack.pop();
    }

    pub(crate) fn method_binding(&self, key: &str) -> Option<MethodBinding> {
        self.methods.get(key).cloned()
    }

    pub(crate) fn insert_method(&mut self, key: String, binding: MethodBinding) {
        self.methods.insert(key, binding);
    }

    pub(crate) fn method_override(&self, key: &str) -> Option<MethodOverride> {
        self.overrides.get(key).cloned()
    }

    pub(crate) fn insert_override(&mut self, key: String, handler: MethodOverride) {
        self.overrides.insert(key, handler);
    }

    pub(crate) fn has_override(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use crate::binding::{BindingKey, Producer};
    use crate::container::Container;
    use crate::error::ContainerError;
    use crate::invoker::Arguments;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_producer() -> (Producer, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let producer = Producer::factory(move |_| {
            Ok(counter_clone.fetch_add(1, Ordering::SeqCst))
        });
        (producer, counter)
    }

    #[test]
    fn should_return_same_instance_for_shared_binding() {
        let key = BindingKey::named("shared.counter");
        let (producer, counter) = counting_producer();

        let mut container = Container::new();
        container.singleton(key.clone(), producer);

        let first = container.make::<usize>(&key).unwrap().unwrap();
        let second = container
            .make_with::<usize>(&key, &Arguments::new().with("ignored", 1_i8))
            .unwrap()
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_build_fresh_instances_for_non_shared_binding() {
        let key = BindingKey::named("fresh.counter");
        let (producer, counter) = counting_producer();

        let mut container = Container::new();
        container.bind(key.clone(), producer, false);

        let first = container.make::<usize>(&key).unwrap().unwrap();
        let second = container.make::<usize>(&key).unwrap().unwrap();

        assert_eq!(*first, 0);
        assert_eq!(*second, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn should_return_default_on_soft_miss() {
        let mut container = Container::new();
        let value = container
            .make_or(&BindingKey::named("unregistered.key"), 42_i32)
            .unwrap();

        assert_eq!(*value, 42);
        assert!(container
            .make::<i32>(&BindingKey::named("unregistered.key"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn should_return_literal_values_unchanged() {
        let key = BindingKey::named("literal");

        let mut container = Container::new();
        container.bind(key.clone(), Producer::value("text".to_string()), false);

        assert_eq!(*container.make::<String>(&key).unwrap().unwrap(), "text");
    }

    #[test]
    fn should_see_rebind_of_non_shared_binding_immediately() {
        let key = BindingKey::named("rebindable");

        let mut container = Container::new();
        container.bind(key.clone(), Producer::value(1_i32), false);
        assert_eq!(*container.make::<i32>(&key).unwrap().unwrap(), 1);

        container.bind(key.clone(), Producer::value(2_i32), false);
        assert_eq!(*container.make::<i32>(&key).unwrap().unwrap(), 2);
    }

    #[test]
    fn should_keep_cached_instance_after_shared_rebind() {
        let key = BindingKey::named("hot.rebind");

        let mut container = Container::new();
        container.singleton(key.clone(), Producer::value(1_i32));
        assert_eq!(*container.make::<i32>(&key).unwrap().unwrap(), 1);

        container.singleton(key.clone(), Producer::value(2_i32));
        assert_eq!(*container.make::<i32>(&key).unwrap().unwrap(), 1);

        // eviction is the hook implementer's responsibility
        container.forget_instance(&key);
        assert_eq!(*container.make::<i32>(&key).unwrap().unwrap(), 2);
    }

    #[test]
    fn should_fire_rebound_hook_for_resolved_keys_only() {
        let key = BindingKey::named("hooked");
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        let mut container = Container::new();
        container.on_rebound(
            key.clone(),
            Box::new(move |_| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        container.singleton(key.clone(), Producer::value(1_i32));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        container.make::<i32>(&key).unwrap();
        container.singleton(key.clone(), Producer::value(2_i32));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_let_rebound_hook_evict_the_cache() {
        let key = BindingKey::named("evicting");
        let hook_key = key.clone();

        let mut container = Container::new();
        container.on_rebound(
            key.clone(),
            Box::new(move |container| {
                container.forget_instance(&hook_key);
            }),
        );

        container.singleton(key.clone(), Producer::value(1_i32));
        assert_eq!(*container.make::<i32>(&key).unwrap().unwrap(), 1);

        container.singleton(key.clone(), Producer::value(2_i32));
        assert_eq!(*container.make::<i32>(&key).unwrap().unwrap(), 2);
    }

    #[test]
    fn should_seed_cache_with_instance() {
        let key = BindingKey::named("seeded");

        let mut container = Container::new();
        let seeded = container.instance(key.clone(), 7_i32);
        let resolved = container.make::<i32>(&key).unwrap().unwrap();

        assert!(Arc::ptr_eq(&seeded, &resolved));
        assert!(container.resolved(&key));
    }

    #[test]
    fn should_resolve_nested_dependencies_through_factories() {
        let dependency = BindingKey::named("nested.dependency");
        let dependent = BindingKey::named("nested.dependent");

        let mut container = Container::new();
        container.bind(dependency.clone(), Producer::value(20_i32), false);
        let dependency_key = dependency.clone();
        container.bind(
            dependent.clone(),
            Producer::factory(move |container| {
                let base = container
                    .make_or(&dependency_key, 0_i32)
                    .map(|value| *value)?;
                Ok(base + 1)
            }),
            false,
        );

        assert_eq!(*container.make::<i32>(&dependent).unwrap().unwrap(), 21);
    }

    #[test]
    fn should_forward_factory_errors() {
        let key = BindingKey::named("failing");

        let mut container = Container::new();
        container.bind(
            key.clone(),
            Producer::factory(|_| -> Result<i32, _> {
                Err(crate::instance::convert_error(
                    ContainerError::IncompatibleInstance {
                        key: "inner".to_string(),
                    },
                ))
            }),
            false,
        );

        assert!(container.make::<i32>(&key).is_err());
    }

    #[test]
    fn should_report_incompatible_downcast() {
        let key = BindingKey::named("typed");

        let mut container = Container::new();
        container.bind(key.clone(), Producer::value(1_i32), false);

        let error = container.make::<String>(&key).unwrap_err();
        assert!(error.to_string().contains("typed"));
    }
}
