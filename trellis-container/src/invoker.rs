//! Bound-method invocation with dependency-injected parameters.
//!
//! Methods are registered up front under `"Class@method"` keys, each carrying an explicit
//! [ParameterSpec] list - the runtime equivalent of a declared signature. Keys and parameter
//! lists are validated at registration time, so calling can assume a well-formed binding.
//!
//! [Container::call] dispatches by string target: `"Class@method"` splits into target and method,
//! a bare `"Class"` needs a default method name, and anything else is an invocation error. The
//! resolved parameters follow a strict precedence: caller argument matched by name, caller
//! argument matched by the parameter's binding-key name, declared default, container binding -
//! and failing all four, an error naming the parameter and its owning class.
//!
//! Handlers are uniformly asynchronous: synchronous closures are wrapped through [sync_handler]
//! and awaited like any other, so call sites never branch on the nature of the callee.

use crate::binding::BindingKey;
use crate::container::Container;
use crate::error::InvocationError;
use crate::instance::{convert_error, AnyInstancePtr, ErrorPtr};
use derivative::Derivative;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use itertools::Itertools;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::trace;

/// Ordered, named argument pool supplied by callers. Entries are consumed as parameters match
/// them; whatever remains is appended positionally after the declared parameters.
#[derive(Clone, Default)]
pub struct Arguments {
    entries: Vec<(String, AnyInstancePtr)>,
}

impl Arguments {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a named argument.
    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.entries.push((name.into(), Arc::new(value)));
        self
    }

    /// Adds an already-erased named argument.
    pub fn with_ptr(mut self, name: impl Into<String>, value: AnyInstancePtr) -> Self {
        self.entries.push((name.into(), value));
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Looks up an argument by name without consuming it.
    pub fn get(&self, name: &str) -> Option<&AnyInstancePtr> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| value)
    }

    /// Removes and returns the first argument with the given name, so repeated parameters cannot
    /// reuse it.
    fn take(&mut self, name: &str) -> Option<AnyInstancePtr> {
        let index = self.entries.iter().position(|(entry, _)| entry == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Drains leftover arguments in insertion order.
    fn drain_rest(&mut self) -> Vec<AnyInstancePtr> {
        self.entries.drain(..).map(|(_, value)| value).collect()
    }
}

impl Debug for Arguments {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

/// Declared parameter of a bound method.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ParameterSpec {
    pub name: &'static str,
    /// Binding resolved through the container when no caller argument matches.
    pub key: Option<BindingKey>,
    #[derivative(Debug = "ignore")]
    pub default: Option<AnyInstancePtr>,
}

impl ParameterSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            key: None,
            default: None,
        }
    }

    /// A parameter resolvable through the given container binding.
    pub fn bound(name: &'static str, key: BindingKey) -> Self {
        Self {
            name,
            key: Some(key),
            default: None,
        }
    }

    /// Attaches a declared default value.
    pub fn with_default<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(value));
        self
    }
}

/// Handler invoked with the resolved target instance and the fully-resolved parameter list.
pub type MethodHandler = Arc<
    dyn Fn(AnyInstancePtr, Vec<AnyInstancePtr>) -> BoxFuture<'static, Result<AnyInstancePtr, ErrorPtr>>
        + Send
        + Sync,
>;

/// Override invoked in place of the original handler - the extension point for mocking or
/// decorating a specific bound method.
pub type MethodOverride =
    Arc<dyn Fn(AnyInstancePtr, &mut Container) -> Result<AnyInstancePtr, ErrorPtr> + Send + Sync>;

/// A method registered under a `"Class@method"` key.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct MethodBinding {
    /// Binding resolved to obtain the target instance.
    pub target: BindingKey,
    pub parameters: Vec<ParameterSpec>,
    #[derivative(Debug = "ignore")]
    pub handler: MethodHandler,
}

/// Wraps a synchronous closure into a [MethodHandler].
pub fn sync_handler<F>(handler: F) -> MethodHandler
where
    F: Fn(AnyInstancePtr, Vec<AnyInstancePtr>) -> Result<AnyInstancePtr, ErrorPtr>
        + Send
        + Sync
        + 'static,
{
    Arc::new(move |instance, parameters| future::ready(handler(instance, parameters)).boxed())
}

fn split_method_key(key: &str) -> Result<(&str, &str), InvocationError> {
    match key.split_once('@') {
        Some((class, method)) if !class.is_empty() && !method.is_empty() => Ok((class, method)),
        _ => Err(InvocationError::MalformedMethodKey(key.to_string())),
    }
}

impl Container {
    /// Registers a handler under `"Class@method"`. The key shape and the parameter list are
    /// validated here rather than at call time.
    pub fn bind_method(&mut self, key: &str, binding: MethodBinding) -> Result<(), InvocationError> {
        let (class, method) = split_method_key(key)?;

        for (index, parameter) in binding.parameters.iter().enumerate() {
            if binding.parameters[..index]
                .iter()
                .any(|other| other.name == parameter.name)
            {
                return Err(InvocationError::DuplicateParameter {
                    method: key.to_string(),
                    parameter: parameter.name.to_string(),
                });
            }
        }

        self.insert_method(format!("{class}@{method}"), binding);
        Ok(())
    }

    /// Registers an override invoked instead of the original handler for the given key.
    pub fn override_method(
        &mut self,
        key: &str,
        handler: MethodOverride,
    ) -> Result<(), InvocationError> {
        let (class, method) = split_method_key(key)?;
        self.insert_override(format!("{class}@{method}"), handler);
        Ok(())
    }

    pub fn has_method_override(&self, key: &str) -> bool {
        self.has_override(key)
    }

    /// Calls a bound method by string target. `"Class@method"` carries its own method name; a
    /// bare `"Class"` falls back to `default_method` and fails without one. The target instance
    /// is resolved through the container.
    pub async fn call(
        &mut self,
        target: &str,
        arguments: Arguments,
        default_method: Option<&str>,
    ) -> Result<AnyInstancePtr, ErrorPtr> {
        let (class, method) = match target.split_once('@') {
            Some((class, method)) => (class.to_string(), method.to_string()),
            None => match default_method {
                Some(method) => (target.to_string(), method.to_string()),
                None => return Err(convert_error(InvocationError::MethodNotProvided)),
            },
        };

        let key = format!("{class}@{method}");
        let binding = self
            .method_binding(&key)
            .ok_or_else(|| convert_error(InvocationError::UnknownMethod(key.clone())))?;

        let instance = self
            .resolve(&binding.target, &Arguments::new())?
            .ok_or_else(|| {
                convert_error(InvocationError::UnresolvedTarget(binding.target.to_string()))
            })?;

        self.call_instance(instance, &class, &method, arguments).await
    }

    /// Invokes `method` on an already-resolved target instance.
    pub async fn call_instance(
        &mut self,
        instance: AnyInstancePtr,
        class: &str,
        method: &str,
        mut arguments: Arguments,
    ) -> Result<AnyInstancePtr, ErrorPtr> {
        let key = format!("{class}@{method}");
        let binding = self
            .method_binding(&key)
            .ok_or_else(|| convert_error(InvocationError::UnknownMethod(key.clone())))?;

        let pushed = self.push_build_stack(class);
        trace!("Calling {key}; build stack: {}", self.build_stack().iter().join(" -> "));

        let result = self
            .run_bound_method(&key, class, &binding, instance, &mut arguments)
            .await;

        if pushed {
            self.pop_build_stack();
        }

        result
    }

    async fn run_bound_method(
        &mut self,
        key: &str,
        class: &str,
        binding: &MethodBinding,
        instance: AnyInstancePtr,
        arguments: &mut Arguments,
    ) -> Result<AnyInstancePtr, ErrorPtr> {
        let parameters = self.resolve_call_parameters(class, &binding.parameters, arguments)?;

        if let Some(override_handler) = self.method_override(key) {
            return override_handler(instance, self);
        }

        (binding.handler)(instance, parameters).await
    }

    /// Matches each declared parameter against the argument pool, declared defaults and container
    /// bindings, in that order. Leftover arguments are appended positionally.
    fn resolve_call_parameters(
        &mut self,
        owner: &str,
        specs: &[ParameterSpec],
        arguments: &mut Arguments,
    ) -> Result<Vec<AnyInstancePtr>, ErrorPtr> {
        let mut dependencies = Vec::with_capacity(specs.len() + arguments.len());

        for spec in specs {
            if let Some(value) = arguments.take(spec.name) {
                dependencies.push(value);
                continue;
            }

            if let Some(key) = &spec.key {
                if let Some(value) = arguments.take(&key.to_string()) {
                    dependencies.push(value);
                    continue;
                }
            }

            if let Some(default) = &spec.default {
                dependencies.push(default.clone());
                continue;
            }

            if let Some(key) = &spec.key {
                if let Some(value) = self.resolve(key, &Arguments::new())? {
                    dependencies.push(value);
                    continue;
                }
            }

            return Err(convert_error(InvocationError::UnresolvedParameter {
                parameter: spec.name.to_string(),
                owner: owner.to_string(),
            }));
        }

        dependencies.extend(arguments.drain_rest());
        Ok(dependencies)
    }
}

#[cfg(test)]
mod tests {
    use crate::binding::{BindingKey, Producer};
    use crate::container::Container;
    use crate::error::InvocationError;
    use crate::instance::{convert_error, AnyInstancePtr};
    use crate::invoker::{sync_handler, Arguments, MethodBinding, ParameterSpec};
    use std::sync::Arc;

    struct Calculator;

    fn as_i32(value: &AnyInstancePtr) -> i32 {
        *value.clone().downcast::<i32>().unwrap()
    }

    fn sum_handler() -> crate::invoker::MethodHandler {
        sync_handler(|_, parameters| {
            let sum: i32 = parameters.iter().map(as_i32).sum();
            Ok(Arc::new(sum) as AnyInstancePtr)
        })
    }

    fn register_sum(container: &mut Container, parameters: Vec<ParameterSpec>) {
        container.instance(BindingKey::of::<Calculator>(), Calculator);
        container
            .bind_method(
                "Calculator@sum",
                MethodBinding {
                    target: BindingKey::of::<Calculator>(),
                    parameters,
                    handler: sum_handler(),
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn should_prefer_explicit_arguments_over_container_bindings() {
        let mut container = Container::new();
        container.bind(BindingKey::named("b"), Producer::value(10_i32), false);
        register_sum(
            &mut container,
            vec![
                ParameterSpec::new("a"),
                ParameterSpec::bound("b", BindingKey::named("b")),
            ],
        );

        let result = container
            .call("Calculator@sum", Arguments::new().with("a", 1_i32), None)
            .await
            .unwrap();

        // a comes from the caller, b from the container
        assert_eq!(as_i32(&result), 11);

        let result = container
            .call(
                "Calculator@sum",
                Arguments::new().with("a", 1_i32).with("b", 2_i32),
                None,
            )
            .await
            .unwrap();

        assert_eq!(as_i32(&result), 3);
    }

    #[tokio::test]
    async fn should_match_arguments_by_binding_key_name() {
        let mut container = Container::new();
        register_sum(
            &mut container,
            vec![ParameterSpec::bound("value", BindingKey::named("some.alias"))],
        );

        let result = container
            .call(
                "Calculator@sum",
                Arguments::new().with("some.alias", 5_i32),
                None,
            )
            .await
            .unwrap();

        assert_eq!(as_i32(&result), 5);
    }

    #[tokio::test]
    async fn should_use_declared_default_before_container_binding() {
        let mut container = Container::new();
        container.bind(BindingKey::named("a"), Producer::value(100_i32), false);
        register_sum(
            &mut container,
            vec![ParameterSpec::bound("a", BindingKey::named("a")).with_default(7_i32)],
        );

        let result = container
            .call("Calculator@sum", Arguments::new(), None)
            .await
            .unwrap();

        assert_eq!(as_i32(&result), 7);
    }

    #[tokio::test]
    async fn should_fail_on_unresolved_parameter() {
        let mut container = Container::new();
        register_sum(&mut container, vec![ParameterSpec::new("mystery")]);

        let error = container
            .call("Calculator@sum", Arguments::new(), None)
            .await
            .unwrap_err();

        assert!(error.to_string().contains("[mystery]"));
        assert!(error.to_string().contains("Calculator"));
    }

    #[tokio::test]
    async fn should_append_leftover_arguments_positionally() {
        let mut container = Container::new();
        register_sum(&mut container, vec![ParameterSpec::new("a")]);

        let result = container
            .call(
                "Calculator@sum",
                Arguments::new().with("a", 1_i32).with("extra", 2_i32),
                None,
            )
            .await
            .unwrap();

        assert_eq!(as_i32(&result), 3);
    }

    #[tokio::test]
    async fn should_require_method_name_for_bare_targets() {
        let mut container = Container::new();
        register_sum(&mut container, Vec::new());

        let error = container
            .call("Calculator", Arguments::new(), None)
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Method not provided.");

        let result = container
            .call("Calculator", Arguments::new(), Some("sum"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_fail_on_unresolvable_target() {
        let mut container = Container::new();
        container
            .bind_method(
                "Ghost@walk",
                MethodBinding {
                    target: BindingKey::named("ghost"),
                    parameters: Vec::new(),
                    handler: sum_handler(),
                },
            )
            .unwrap();

        let error = container
            .call("Ghost@walk", Arguments::new(), None)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn should_invoke_override_instead_of_handler() {
        let mut container = Container::new();
        register_sum(&mut container, Vec::new());
        container
            .override_method(
                "Calculator@sum",
                Arc::new(|_, _| Ok(Arc::new(99_i32) as AnyInstancePtr)),
            )
            .unwrap();

        assert!(container.has_method_override("Calculator@sum"));

        let result = container
            .call("Calculator@sum", Arguments::new(), None)
            .await
            .unwrap();
        assert_eq!(as_i32(&result), 99);
    }

    #[tokio::test]
    async fn should_track_build_stack_during_invocation() {
        let mut container = Container::new();
        register_sum(&mut container, Vec::new());
        container
            .override_method(
                "Calculator@sum",
                Arc::new(|_, container| {
                    assert_eq!(container.build_stack(), ["Calculator"]);
                    Ok(Arc::new(0_i32) as AnyInstancePtr)
                }),
            )
            .unwrap();

        container
            .call("Calculator@sum", Arguments::new(), None)
            .await
            .unwrap();

        assert!(container.build_stack().is_empty());
    }

    #[tokio::test]
    async fn should_forward_handler_errors() {
        let mut container = Container::new();
        container.instance(BindingKey::of::<Calculator>(), Calculator);
        container
            .bind_method(
                "Calculator@fail",
                MethodBinding {
                    target: BindingKey::of::<Calculator>(),
                    parameters: Vec::new(),
                    handler: sync_handler(|_, _| {
                        Err(convert_error(InvocationError::MethodNotProvided))
                    }),
                },
            )
            .unwrap();

        assert!(container
            .call("Calculator@fail", Arguments::new(), None)
            .await
            .is_err());
    }

    #[test]
    fn should_reject_malformed_method_keys() {
        let mut container = Container::new();
        let binding = MethodBinding {
            target: BindingKey::named("x"),
            parameters: Vec::new(),
            handler: sum_handler(),
        };

        assert_eq!(
            container.bind_method("no-separator", binding.clone()).unwrap_err(),
            InvocationError::MalformedMethodKey("no-separator".to_string())
        );
        assert!(matches!(
            container.bind_method("@method", binding.clone()).unwrap_err(),
            InvocationError::MalformedMethodKey(..)
        ));
        assert!(matches!(
            container.bind_method("Class@", binding).unwrap_err(),
            InvocationError::MalformedMethodKey(..)
        ));
    }

    #[test]
    fn should_reject_duplicate_parameter_names() {
        let mut container = Container::new();
        let binding = MethodBinding {
            target: BindingKey::named("x"),
            parameters: vec![ParameterSpec::new("a"), ParameterSpec::new("a")],
            handler: sum_handler(),
        };

        assert!(matches!(
            container.bind_method("Class@method", binding).unwrap_err(),
            InvocationError::DuplicateParameter { .. }
        ));
    }

    #[tokio::test]
    async fn should_consume_each_argument_only_once() {
        let mut container = Container::new();
        register_sum(
            &mut container,
            vec![
                ParameterSpec::new("a"),
                ParameterSpec::new("a2").with_default(0_i32),
            ],
        );

        // "a" is consumed by the first parameter and not reused
        let result = container
            .call("Calculator@sum", Arguments::new().with("a", 4_i32), None)
            .await
            .unwrap();

        assert_eq!(as_i32(&result), 4);
    }
}
