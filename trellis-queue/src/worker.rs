//! Burst worker draining queues in declaration order.
//!
//! Queue order matters: the worker always serves the first non-empty queue, so earlier queues
//! effectively have priority. Per-job failures are contained by the queue itself - the worker
//! just moves on to the next job.

use crate::job::JobDescriptor;
use crate::queue::Queue;
use crate::registry::JobRegistry;
use tracing::{debug, info};

pub struct Worker {
    name: String,
    queues: Vec<Queue>,
    registry: JobRegistry,
}

impl Worker {
    pub fn new(name: impl Into<String>, queues: Vec<Queue>, registry: JobRegistry) -> Self {
        Self {
            name: name.into(),
            queues,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    pub fn queue_mut(&mut self, name: &str) -> Option<&mut Queue> {
        self.queues.iter_mut().find(|queue| queue.name() == name)
    }

    /// Pops and performs jobs until every queue is empty or `max_jobs` is reached. Returns the
    /// number of processed jobs, failed ones included.
    pub async fn work(&mut self, max_jobs: Option<usize>) -> usize {
        let mut completed = 0;

        loop {
            let index = match self.queues.iter().position(|queue| !queue.is_empty()) {
                Some(index) => index,
                None => {
                    debug!("Worker {}: done, quitting", self.name);
                    break;
                }
            };

            let registry = self.registry.clone();
            let queue = &mut self.queues[index];
            if let Some(job) = queue.dequeue() {
                queue.run_sync(job, &registry).await;
                completed += 1;
            }

            if let Some(max) = max_jobs {
                if completed >= max {
                    info!(
                        "Worker {}: finished executing {completed} jobs, quitting",
                        self.name
                    );
                    break;
                }
            }
        }

        completed
    }

    /// [Worker::work] for a single already-built descriptor, bypassing the backlog.
    pub async fn perform(&mut self, queue: &str, job: JobDescriptor) -> Option<JobDescriptor> {
        let registry = self.registry.clone();
        let queue = self.queue_mut(queue)?;
        Some(queue.run_sync(job, &registry).await)
    }
}
