//! Discrete, independently-testable startup steps.
//!
//! An application is brought up by running an ordered list of [Bootstrapper]s through
//! [Application::bootstrap_with](crate::application::Application::bootstrap_with). The canonical
//! sequence is [LoadEnvironment] -> [LoadConfiguration] -> [RegisterProviders] ->
//! [BootProviders], but kernels are free to insert their own steps in between.

use crate::application::{config_binding, Application};
use crate::config::ConfigRepository;
use crate::provider::ServiceProvider;
use config::{Config, File};
use derive_more::Constructor;
use futures::future::BoxFuture;
use futures::FutureExt;
use itertools::Itertools;
use std::fs;
use std::mem;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use trellis_container::binding::Producer;
use trellis_container::instance::{convert_error, AnyInstancePtr, ErrorPtr, InstancePtr};

/// One ordered step of the application's startup sequence.
pub trait Bootstrapper: Send {
    fn bootstrap<'a>(&'a mut self, app: &'a mut Application)
        -> BoxFuture<'a, Result<(), ErrorPtr>>;
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Unable to load the \"app\" configuration file.")]
    MissingAppSection,
    #[error("Unable to read configuration from {path}: {source}")]
    InvalidConfigFile {
        path: String,
        source: config::ConfigError,
    },
}

/// Loads the application's `.env` file into the process environment. A missing file is not an
/// error.
#[derive(Clone, Copy, Default)]
pub struct LoadEnvironment;

impl Bootstrapper for LoadEnvironment {
    fn bootstrap<'a>(
        &'a mut self,
        app: &'a mut Application,
    ) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move {
            let path = app.env_path().join(app.env_file());
            if path.is_file() {
                dotenv::from_path(&path).map_err(convert_error)?;
                debug!("Loaded environment from {}", path.display());
            } else {
                debug!("No environment file at {}", path.display());
            }

            Ok(())
        }
        .boxed()
    }
}

/// Assembles the [ConfigRepository] and binds it - shared and pre-resolved - under `"config"`.
///
/// By default the application's configuration directory is scanned: every readable file becomes
/// one top-level section named after its stem, in lexicographic order. A pre-assembled repository
/// can be supplied instead, e.g. when configuration comes from code rather than files.
#[derive(Default)]
pub struct LoadConfiguration {
    repository: Option<ConfigRepository>,
}

impl LoadConfiguration {
    pub fn new() -> Self {
        Default::default()
    }

    /// Uses a pre-assembled repository instead of scanning the configuration directory.
    pub fn with_repository(repository: ConfigRepository) -> Self {
        Self {
            repository: Some(repository),
        }
    }

    fn load_config_files(path: &Path) -> Result<ConfigRepository, ErrorPtr> {
        let mut repository = ConfigRepository::new();

        for (stem, file) in Self::config_files(path) {
            let value = Config::builder()
                .add_source(File::from(file.as_path()))
                .build()
                .and_then(|config| config.try_deserialize::<config::Value>())
                .map_err(|source| {
                    convert_error(BootstrapError::InvalidConfigFile {
                        path: file.display().to_string(),
                        source,
                    })
                })?;

            repository.insert_section(stem, value);
        }

        if !repository.has_section("app") {
            return Err(convert_error(BootstrapError::MissingAppSection));
        }

        Ok(repository)
    }

    fn config_files(path: &Path) -> Vec<(String, std::path::PathBuf)> {
        const FORMATS: [&str; 5] = ["toml", "json", "yaml", "yml", "ini"];

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let extension = path.extension()?.to_str()?;
                if !FORMATS.contains(&extension) {
                    return None;
                }

                let stem = path.file_stem()?.to_str()?.to_string();
                path.is_file().then_some((stem, path))
            })
            .sorted_by(|(left, _), (right, _)| left.cmp(right))
            .collect()
    }
}

impl Bootstrapper for LoadConfiguration {
    fn bootstrap<'a>(
        &'a mut self,
        app: &'a mut Application,
    ) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move {
            let repository = match self.repository.take() {
                Some(repository) => repository,
                None => Self::load_config_files(app.config_path())?,
            };

            let repository = InstancePtr::new(repository);
            app.container_mut().bind(
                config_binding(),
                Producer::value_ptr(repository.clone() as AnyInstancePtr),
                true,
            );
            app.container_mut()
                .instance_ptr(config_binding(), repository);

            info!("Configuration loaded");
            Ok(())
        }
        .boxed()
    }
}

/// Registers the configured providers in declaration order.
#[derive(Constructor, Default)]
pub struct RegisterProviders {
    providers: Vec<Box<dyn ServiceProvider>>,
}

impl Bootstrapper for RegisterProviders {
    fn bootstrap<'a>(
        &'a mut self,
        app: &'a mut Application,
    ) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move {
            for provider in mem::take(&mut self.providers) {
                app.register(provider).await?;
            }

            Ok(())
        }
        .boxed()
    }
}

/// Boots every registered provider.
#[derive(Clone, Copy, Default)]
pub struct BootProviders;

impl Bootstrapper for BootProviders {
    fn bootstrap<'a>(
        &'a mut self,
        app: &'a mut Application,
    ) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move { app.boot().await }.boxed()
    }
}
