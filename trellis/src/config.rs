//! Configuration support: the repository assembled at bootstrap and the framework's own
//! self-configuration.
//!
//! Application configuration lives in a [ConfigRepository]: one top-level section per
//! configuration file, addressed with dotted paths (`"app.providers"`, `"queue.default"`).
//! Framework self-configuration is created with opinionated defaults, which can be overwritten
//! by a `trellis.json` file or `TRELLIS_`-prefixed environment variables.

use config::{Config, ConfigError, Environment, File, Value};
use fxhash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const CONFIG_ENV_PREFIX: &str = "TRELLIS";

/// Name of the framework config file.
pub const CONFIG_FILE: &str = "trellis.json";

/// Keyed configuration sections with dotted-path lookup.
#[derive(Clone, Debug, Default)]
pub struct ConfigRepository {
    sections: FxHashMap<String, Value>,
}

impl ConfigRepository {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_sections<I: IntoIterator<Item = (String, Value)>>(sections: I) -> Self {
        Self {
            sections: sections.into_iter().collect(),
        }
    }

    pub fn insert_section(&mut self, name: impl Into<String>, value: Value) {
        self.sections.insert(name.into(), value);
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// Walks `path` segment by segment, returning `None` the moment a segment is missing.
    pub fn get(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let mut current = self.sections.get(head)?.clone();

        for segment in segments {
            let table = current.into_table().ok()?;
            current = table.get(segment)?.clone();
        }

        Some(current)
    }

    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    /// Typed lookup through serde.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.get(path)
            .and_then(|value| value.try_deserialize().ok())
    }
}

/// Framework self-configuration, resolved once when creating a default application.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct FrameworkConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
        }
    }
}

impl From<OptionalFrameworkConfig> for FrameworkConfig {
    fn from(value: OptionalFrameworkConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
        }
    }
}

impl FrameworkConfig {
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalFrameworkConfig>())
            .map(|config| config.into())
    }
}

#[derive(Deserialize)]
struct OptionalFrameworkConfig {
    install_tracing_logger: Option<bool>,
}
