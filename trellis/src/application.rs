//! Core application lifecycle functionality.
//!
//! The application walks `unregistered -> base-registered -> providers-registering -> booting ->
//! booted`. Providers boot strictly in registration order; within one provider, `register` always
//! completes before `boot` begins, booting callbacks run before its `boot` and booted callbacks
//! after. A provider registered once the application is already booted is booted immediately, so
//! late registrations are never left half-initialized. Any error inside a provider or
//! bootstrapper aborts the whole sequence - there is no partial-failure recovery during startup.

use crate::config::{ConfigRepository, FrameworkConfig};
use crate::provider::{ProviderEntry, ServiceProvider};
use fxhash::FxHashSet;
use std::mem;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use trellis_container::binding::{BindingKey, Producer};
use trellis_container::container::Container;
use trellis_container::instance::{convert_error, ErrorPtr, InstancePtr};
use trellis_container::invoker::Arguments;

/// Callback fired around lifecycle transitions; receives the application itself.
pub type LifecycleCallback = Box<dyn FnMut(&mut Application) + Send>;

/// Binding key under which the configuration repository is shared.
pub fn config_binding() -> BindingKey {
    BindingKey::named("config")
}

/// Main entrypoint for the application. Owns the container and orchestrates the provider
/// lifecycle.
pub struct Application {
    container: Container,
    env_path: Option<PathBuf>,
    env_file: String,
    config_path: PathBuf,
    booted: bool,
    providers: Vec<ProviderEntry>,
    loaded_providers: FxHashSet<String>,
    base_providers: Vec<Box<dyn ServiceProvider>>,
    booting_callbacks: Vec<LifecycleCallback>,
    booted_callbacks: Vec<LifecycleCallback>,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
            env_path: None,
            env_file: ".env".to_string(),
            config_path: PathBuf::from("config"),
            booted: false,
            providers: Vec::new(),
            loaded_providers: Default::default(),
            base_providers: Vec::new(),
            booting_callbacks: Vec::new(),
            booted_callbacks: Vec::new(),
        }
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    /// Directory holding the environment file; defaults to the working directory.
    pub fn env_path(&self) -> PathBuf {
        self.env_path.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn set_env_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.env_path = Some(path.into());
        self
    }

    pub fn env_file(&self) -> &str {
        &self.env_file
    }

    pub fn set_env_file(&mut self, file: impl Into<String>) -> &mut Self {
        self.env_file = file.into();
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn set_config_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.config_path = path.into();
        self
    }

    #[inline]
    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Whether a provider with the given name went through `register`.
    pub fn is_provider_loaded(&self, name: &str) -> bool {
        self.loaded_providers.contains(name)
    }

    /// Adds a provider registered as part of base registration, before the configured ones boot.
    pub fn with_base_provider(mut self, provider: Box<dyn ServiceProvider>) -> Self {
        self.base_providers.push(provider);
        self
    }

    /// Queues a callback fired right before providers boot. Pending callbacks are drained when
    /// they fire.
    pub fn on_booting(&mut self, callback: LifecycleCallback) {
        self.booting_callbacks.push(callback);
    }

    /// Queues a callback fired after every provider booted.
    pub fn on_booted(&mut self, callback: LifecycleCallback) {
        self.booted_callbacks.push(callback);
    }

    /// Queues a callback run right before the named provider boots. The provider queues are
    /// per-instance state owned by the ledger, drained exactly once.
    pub fn add_provider_booting(&mut self, provider: &str, callback: LifecycleCallback) {
        match self
            .providers
            .iter_mut()
            .rev()
            .find(|entry| entry.name == provider)
        {
            Some(entry) => entry.booting.push(callback),
            None => warn!("No registered provider {provider} for booting callback"),
        }
    }

    /// Queues a callback run right after the named provider boots.
    pub fn add_provider_booted(&mut self, provider: &str, callback: LifecycleCallback) {
        match self
            .providers
            .iter_mut()
            .rev()
            .find(|entry| entry.name == provider)
        {
            Some(entry) => entry.booted.push(callback),
            None => warn!("No registered provider {provider} for booted callback"),
        }
    }

    /// Registers a service provider: runs its `register`, applies the bulk binding collections,
    /// records it in the ledger and - when the application already booted - boots it immediately.
    /// Duplicate registrations are legal and run `register` again.
    pub async fn register(
        &mut self,
        provider: Box<dyn ServiceProvider>,
    ) -> Result<(), ErrorPtr> {
        let name = provider.name().to_string();
        debug!("Registering provider {name}");

        // the ledger entry exists up front, so the provider can queue its own boot callbacks
        // from within register
        self.providers.push(ProviderEntry::new(name.clone()));
        let index = self.providers.len() - 1;

        let mut provider = provider;
        if let Err(error) = provider.register(self).await {
            self.providers.remove(index);
            return Err(error);
        }

        for (key, producer) in provider.bindings() {
            self.container.bind(key, producer, false);
        }
        for (key, producer) in provider.singletons() {
            self.container.bind(key, producer, true);
        }

        self.providers[index].provider = Some(provider);
        self.loaded_providers.insert(name);

        if self.booted {
            self.boot_at(index).await?;
        }

        Ok(())
    }

    /// Boots the application. Idempotent: a booted application returns immediately. Otherwise
    /// base registration runs, pending booting callbacks fire, every registered provider boots in
    /// registration order, and finally pending booted callbacks fire.
    pub async fn boot(&mut self) -> Result<(), ErrorPtr> {
        if self.booted {
            return Ok(());
        }

        info!("Booting application...");
        self.base_register().await?;

        let mut callbacks = mem::take(&mut self.booting_callbacks);
        for callback in &mut callbacks {
            callback(self);
        }

        // providers registered while booting are picked up by the loop as well
        let mut index = 0;
        while index < self.providers.len() {
            self.boot_at(index).await?;
            index += 1;
        }

        self.booted = true;
        info!("Application booted");

        let mut callbacks = mem::take(&mut self.booted_callbacks);
        for callback in &mut callbacks {
            callback(self);
        }

        Ok(())
    }

    async fn base_register(&mut self) -> Result<(), ErrorPtr> {
        for provider in mem::take(&mut self.base_providers) {
            self.register(provider).await?;
        }

        Ok(())
    }

    async fn boot_at(&mut self, index: usize) -> Result<(), ErrorPtr> {
        let mut booting = mem::take(&mut self.providers[index].booting);
        for callback in &mut booting {
            callback(self);
        }

        if let Some(mut provider) = self.providers[index].provider.take() {
            debug!("Booting provider {}", self.providers[index].name);
            let result = provider.boot(self).await;
            self.providers[index].provider = Some(provider);
            result?;
        }

        let mut booted = mem::take(&mut self.providers[index].booted);
        for callback in &mut booted {
            callback(self);
        }

        Ok(())
    }

    /// Runs an ordered list of bootstrappers, awaiting each before starting the next.
    pub async fn bootstrap_with(
        &mut self,
        bootstrappers: &mut [Box<dyn crate::bootstrap::Bootstrapper>],
    ) -> Result<(), ErrorPtr> {
        for bootstrapper in bootstrappers.iter_mut() {
            bootstrapper.bootstrap(self).await?;
        }

        Ok(())
    }

    /// Dotted-path lookup in the bound configuration repository. `None` when no repository is
    /// bound or the path does not exist.
    pub fn config_value(&mut self, path: &str) -> Option<config::Value> {
        let repository = self
            .container
            .make::<ConfigRepository>(&config_binding())
            .ok()
            .flatten()?;
        repository.get(path)
    }

    /// [Application::config_value] narrowed to strings.
    pub fn config_string(&mut self, path: &str) -> Option<String> {
        self.config_value(path)
            .and_then(|value| value.into_string().ok())
    }

    // container sugar, so providers don't have to reach for container_mut everywhere

    pub fn bind(&mut self, key: BindingKey, producer: Producer, shared: bool) {
        self.container.bind(key, producer, shared);
    }

    pub fn singleton(&mut self, key: BindingKey, producer: Producer) {
        self.container.singleton(key, producer);
    }

    pub fn instance<T: Send + Sync + 'static>(
        &mut self,
        key: BindingKey,
        value: T,
    ) -> InstancePtr<T> {
        self.container.instance(key, value)
    }

    pub fn make<T: Send + Sync + 'static>(
        &mut self,
        key: &BindingKey,
    ) -> Result<Option<InstancePtr<T>>, ErrorPtr> {
        self.container.make(key)
    }

    pub fn make_or<T: Send + Sync + 'static>(
        &mut self,
        key: &BindingKey,
        default: T,
    ) -> Result<InstancePtr<T>, ErrorPtr> {
        self.container.make_or(key, default)
    }

    pub async fn call(
        &mut self,
        target: &str,
        arguments: Arguments,
        default_method: Option<&str>,
    ) -> Result<trellis_container::instance::AnyInstancePtr, ErrorPtr> {
        self.container.call(target, arguments, default_method).await
    }
}

/// Creates an [Application] configured from [FrameworkConfig], installing the tracing logger when
/// enabled.
pub fn create_default() -> Result<Application, ErrorPtr> {
    let config = FrameworkConfig::init_from_environment().map_err(convert_error)?;
    if config.install_tracing_logger {
        install_tracing_logger();
    }

    Ok(Application::new())
}

fn install_tracing_logger() {
    use tracing_subscriber::{fmt, EnvFilter};

    // a logger may already be installed by the embedding application
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
