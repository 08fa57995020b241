//! Service providers are the pluggable unit of application setup.
//!
//! A provider binds its services into the container during `register` and wires them during
//! `boot`, once every provider had the chance to register. Both phases default to no-ops, so a
//! provider implements only what it needs. Providers exposing whole collections of bindings can
//! return them from [ServiceProvider::bindings]/[ServiceProvider::singletons] instead of binding
//! one by one inside `register`.

use crate::application::{Application, LifecycleCallback};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use trellis_container::binding::{BindingKey, Producer};
use trellis_container::instance::ErrorPtr;

/// A self-contained unit of setup with a register phase and a boot phase.
pub trait ServiceProvider: Send {
    /// Name recorded in the loaded-provider ledger; conventionally the type name.
    fn name(&self) -> &'static str;

    /// Binds services into the container. Must not assume other providers are registered.
    fn register<'a>(
        &'a mut self,
        app: &'a mut Application,
    ) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        let _ = app;
        future::ready(Ok(())).boxed()
    }

    /// Wires services once all providers are registered.
    fn boot<'a>(&'a mut self, app: &'a mut Application) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        let _ = app;
        future::ready(Ok(())).boxed()
    }

    /// Bulk bindings applied right after `register` returns.
    fn bindings(&self) -> Vec<(BindingKey, Producer)> {
        Vec::new()
    }

    /// Bulk singletons applied right after `register` returns.
    fn singletons(&self) -> Vec<(BindingKey, Producer)> {
        Vec::new()
    }
}

/// Ledger entry for one registered provider. Owns the per-provider callback queues, so no state
/// is ever shared between provider instances.
pub(crate) struct ProviderEntry {
    pub(crate) name: String,
    /// Empty only while the provider itself is being driven (register/boot).
    pub(crate) provider: Option<Box<dyn ServiceProvider>>,
    pub(crate) booting: Vec<LifecycleCallback>,
    pub(crate) booted: Vec<LifecycleCallback>,
}

impl ProviderEntry {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            provider: None,
            booting: Vec::new(),
            booted: Vec::new(),
        }
    }
}
