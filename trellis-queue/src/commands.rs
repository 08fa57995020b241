//! Console commands for the queue subsystem, registered through the lazy command loader.

use crate::manager::{queue_binding, QueueManager, QueueManagerPtr};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::info;
use trellis::application::Application;
use trellis::command::{Command, CommandLoader};
use trellis_container::instance::ErrorPtr;

/// Module path the queue commands are registered under.
pub const COMMANDS_MODULE: &str = "trellis_queue.commands";

/// Registers the queue commands with a console kernel's loader.
pub fn register_commands(loader: &mut CommandLoader) {
    loader.register(COMMANDS_MODULE, "cli", WorkCommand::default);
}

/// Drains the configured queue in burst mode.
#[derive(Clone, Default)]
pub struct WorkCommand {
    /// Queue to drain; the manager's default when not set.
    pub queue: Option<String>,
}

impl Command for WorkCommand {
    fn name(&self) -> &str {
        "queue:work"
    }

    fn run<'a>(&'a mut self, app: &'a mut Application) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move {
            let manager = app.make_or(
                &queue_binding(),
                QueueManagerPtr::new(QueueManager::new("default")),
            )?;

            let mut manager = manager.lock().await;
            let mut completed = 0;
            while manager.run_next(self.queue.as_deref()).await.is_some() {
                completed += 1;
            }

            info!("queue:work processed {completed} jobs");
            Ok(())
        }
        .boxed()
    }
}
