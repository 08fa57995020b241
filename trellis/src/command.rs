//! Deferred command loading.
//!
//! Console kernels know their commands by dotted module path, but constructing every command up
//! front is wasted work when a single one is about to run. The [CommandLoader] keeps type-erased
//! factories keyed by module path and object name, and only invokes a factory - verifying the
//! produced object actually is a command - when the name is first looked up. Results are not
//! cached: every load pays the factory again, which is acceptable for loaders living as long as
//! one CLI invocation.

use crate::application::Application;
use futures::future::BoxFuture;
use fxhash::FxHashMap;
use itertools::Itertools;
use std::any::Any;
use thiserror::Error;
use trellis_container::instance::ErrorPtr;

/// Name of the conventional command object within a module.
pub const DEFAULT_COMMAND_OBJECT: &str = "cli";

/// Command capability checked by the loader.
pub trait Command: Send {
    fn name(&self) -> &str;

    fn run<'a>(&'a mut self, app: &'a mut Application) -> BoxFuture<'a, Result<(), ErrorPtr>>;
}

/// Type-erased deferred constructor. Expected to produce a `Box<dyn Command>`.
pub type CommandFactory = Box<dyn Fn() -> Box<dyn Any> + Send + Sync>;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum CommandLoadError {
    #[error("Unknown command module: {0}")]
    UnknownModule(String),
    #[error("Unknown command object {object} in module {module}")]
    UnknownObject { module: String, object: String },
    #[error("Lazy loading of {0} failed by returning a non-command object")]
    NotACommand(String),
}

/// Registry of deferred command factories.
#[derive(Default)]
pub struct CommandLoader {
    modules: FxHashMap<String, FxHashMap<String, CommandFactory>>,
}

impl CommandLoader {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a factory for `object` within `module`.
    pub fn register<C, F>(&mut self, module: &str, object: &str, factory: F)
    where
        C: Command + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.register_raw(
            module,
            object,
            Box::new(move || Box::new(Box::new(factory()) as Box<dyn Command>) as Box<dyn Any>),
        );
    }

    /// Registers a type-erased factory; the command shape is verified at load time.
    pub fn register_raw(&mut self, module: &str, object: &str, factory: CommandFactory) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(object.to_string(), factory);
    }

    pub fn is_registered(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// Loads `"module.path[:object]"`, defaulting the object name to
    /// [DEFAULT_COMMAND_OBJECT].
    pub fn load(&self, name: &str) -> Result<Box<dyn Command>, CommandLoadError> {
        let (module, object) = match name.split_once(':') {
            Some((module, object)) => (module, object),
            None => (name, DEFAULT_COMMAND_OBJECT),
        };

        let objects = self
            .modules
            .get(module)
            .ok_or_else(|| CommandLoadError::UnknownModule(module.to_string()))?;
        let factory = objects
            .get(object)
            .ok_or_else(|| CommandLoadError::UnknownObject {
                module: module.to_string(),
                object: object.to_string(),
            })?;

        factory()
            .downcast::<Box<dyn Command>>()
            .map(|command| *command)
            .map_err(|_| CommandLoadError::NotACommand(format!("{module}:{object}")))
    }

    /// Loads the default object of every module under `"prefix.*"`, in module order.
    pub fn load_group(&self, pattern: &str) -> Result<Vec<Box<dyn Command>>, CommandLoadError> {
        let prefix = match pattern.split_once(".*") {
            Some((prefix, _)) => prefix,
            None => pattern,
        };

        let prefixed = format!("{prefix}.");
        self.modules
            .keys()
            .filter(|module| module.starts_with(&prefixed))
            .sorted()
            .map(|module| self.load(module))
            .try_collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::application::Application;
    use crate::command::{Command, CommandLoadError, CommandLoader};
    use futures::future::{self, BoxFuture};
    use futures::FutureExt;
    use std::any::Any;
    use trellis_container::instance::ErrorPtr;

    struct ListCommand;

    impl Command for ListCommand {
        fn name(&self) -> &str {
            "list"
        }

        fn run<'a>(
            &'a mut self,
            _app: &'a mut Application,
        ) -> BoxFuture<'a, Result<(), ErrorPtr>> {
            future::ready(Ok(())).boxed()
        }
    }

    fn loader() -> CommandLoader {
        let mut loader = CommandLoader::new();
        loader.register("app.commands.list", "cli", || ListCommand);
        loader
    }

    #[test]
    fn should_load_default_object() {
        let loader = loader();
        let command = loader.load("app.commands.list").unwrap();
        assert_eq!(command.name(), "list");
    }

    #[test]
    fn should_load_explicit_object() {
        let loader = loader();
        assert!(loader.load("app.commands.list:cli").is_ok());
    }

    #[test]
    fn should_fail_on_unknown_module() {
        let loader = loader();
        assert_eq!(
            loader.load("app.commands.missing").err().unwrap(),
            CommandLoadError::UnknownModule("app.commands.missing".to_string())
        );
    }

    #[test]
    fn should_fail_on_unknown_object() {
        let loader = loader();
        assert!(matches!(
            loader.load("app.commands.list:other").err().unwrap(),
            CommandLoadError::UnknownObject { .. }
        ));
    }

    #[test]
    fn should_fail_on_non_command_objects() {
        let mut loader = CommandLoader::new();
        loader.register_raw(
            "app.commands.broken",
            "cli",
            Box::new(|| Box::new(42_i32) as Box<dyn Any>),
        );

        assert_eq!(
            loader.load("app.commands.broken").err().unwrap(),
            CommandLoadError::NotACommand("app.commands.broken:cli".to_string())
        );
    }

    #[test]
    fn should_load_group_in_module_order() {
        let mut loader = loader();
        loader.register("app.commands.audit", "cli", || ListCommand);
        loader.register("other.commands.skip", "cli", || ListCommand);

        let commands = loader.load_group("app.commands.*").unwrap();
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn should_construct_fresh_commands_per_load() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();

        let mut loader = CommandLoader::new();
        loader.register("app.commands.list", "cli", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ListCommand
        });

        loader.load("app.commands.list").unwrap();
        loader.load("app.commands.list").unwrap();

        // factories run per load; nothing is cached
        assert_eq!(constructed.load(Ordering::SeqCst), 2);
    }
}
