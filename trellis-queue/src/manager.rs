//! Queue management and the service provider wiring it into an application.
//!
//! The [QueueManager] owns every named queue of a process plus the [JobRegistry] they execute
//! against. The [QueueServiceProvider] binds a shared manager under the `"queue"` alias, reading
//! the default queue name from the `queue.default` configuration key.

use crate::job::JobDescriptor;
use crate::queue::Queue;
use crate::registry::JobRegistry;
use futures::future::BoxFuture;
use futures::FutureExt;
use fxhash::FxHashMap;
use tokio::sync::Mutex;
use tracing::debug;
use trellis::application::Application;
use trellis::provider::ServiceProvider;
use trellis_container::binding::BindingKey;
use trellis_container::instance::ErrorPtr;

/// Binding key under which the shared [QueueManager] lives.
pub fn queue_binding() -> BindingKey {
    BindingKey::named("queue")
}

/// Named queues plus the handler registry they execute against.
pub struct QueueManager {
    default_queue: String,
    queues: FxHashMap<String, Queue>,
    registry: JobRegistry,
}

impl QueueManager {
    pub fn new(default_queue: impl Into<String>) -> Self {
        Self {
            default_queue: default_queue.into(),
            queues: Default::default(),
            registry: JobRegistry::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut JobRegistry {
        &mut self.registry
    }

    pub fn default_queue_name(&self) -> &str {
        &self.default_queue
    }

    /// Returns the named queue, creating it on first use.
    pub fn queue(&mut self, name: &str) -> &mut Queue {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Queue::new(name))
    }

    pub fn default_queue(&mut self) -> &mut Queue {
        let name = self.default_queue.clone();
        self.queue(&name)
    }

    /// Enqueues onto the named queue, or the default one.
    pub fn enqueue(&mut self, queue: Option<&str>, job: JobDescriptor) -> String {
        match queue {
            Some(name) => self.queue(name).enqueue(job),
            None => self.default_queue().enqueue(job),
        }
    }

    /// Dequeues and runs the next job of the named queue, if any.
    pub async fn run_next(&mut self, queue: Option<&str>) -> Option<JobDescriptor> {
        let registry = self.registry.clone();
        let queue = match queue {
            Some(name) => self.queue(name),
            None => self.default_queue(),
        };

        let job = queue.dequeue()?;
        Some(queue.run_sync(job, &registry).await)
    }
}

/// Shared handle stored in the container. An async mutex, since draining a queue suspends while
/// jobs run.
pub type QueueManagerPtr = Mutex<QueueManager>;

/// Registers a shared [QueueManager] configured from the `queue.default` key.
#[derive(Clone, Copy, Default)]
pub struct QueueServiceProvider;

impl ServiceProvider for QueueServiceProvider {
    fn name(&self) -> &'static str {
        "QueueServiceProvider"
    }

    fn register<'a>(
        &'a mut self,
        app: &'a mut Application,
    ) -> BoxFuture<'a, Result<(), ErrorPtr>> {
        async move {
            let default_queue = app
                .config_string("queue.default")
                .unwrap_or_else(|| "default".to_string());
            debug!("Default queue is {default_queue}");

            app.instance(queue_binding(), Mutex::new(QueueManager::new(default_queue)));
            Ok(())
        }
        .boxed()
    }
}
