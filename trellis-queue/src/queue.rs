//! Named FIFO queues with registries for settled jobs.
//!
//! A queue holds the ordered backlog of not-yet-dequeued descriptors plus bookkeeping maps for
//! started, finished and failed ones. Execution happens through [Queue::run_sync]: the job runs
//! on the calling task under its hard wall-clock timeout, transitions to exactly one of
//! finished/failed, and fires the matching callback. A failing job - handler error, unknown
//! function reference or timeout - is contained here and never propagates to the caller.

use crate::error::QueueError;
use crate::job::{JobCallback, JobDescriptor, JobStatus};
use crate::registry::{CallbackEvent, JobRegistry};
use chrono::Utc;
use fxhash::FxHashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info};
use trellis_container::instance::{convert_error, ErrorPtr};

/// Hard timeout applied when a descriptor carries none, in seconds.
pub const DEFAULT_JOB_TIMEOUT: u64 = 180;

pub struct Queue {
    name: String,
    backlog: VecDeque<JobDescriptor>,
    started: FxHashMap<String, JobDescriptor>,
    finished: FxHashMap<String, JobDescriptor>,
    failed: FxHashMap<String, JobDescriptor>,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backlog: VecDeque::new(),
            started: Default::default(),
            finished: Default::default(),
            failed: Default::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.backlog.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.backlog.is_empty()
    }

    pub fn queued_jobs(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.backlog.iter()
    }

    pub fn started_job(&self, id: &str) -> Option<&JobDescriptor> {
        self.started.get(id)
    }

    pub fn finished_job(&self, id: &str) -> Option<&JobDescriptor> {
        self.finished.get(id)
    }

    pub fn failed_job(&self, id: &str) -> Option<&JobDescriptor> {
        self.failed.get(id)
    }

    /// Appends a job to the backlog, honoring the at-front override. Returns the job id.
    pub fn enqueue(&mut self, mut job: JobDescriptor) -> String {
        job.origin = self.name.clone();
        job.status = JobStatus::Queued;
        job.enqueued_at = Some(Utc::now());

        let id = job.id.clone();
        debug!("Enqueued job {id} on {}", self.name);

        if job.enqueue_at_front {
            self.backlog.push_front(job);
        } else {
            self.backlog.push_back(job);
        }

        id
    }

    /// Pops the next job, marking it started.
    pub fn dequeue(&mut self) -> Option<JobDescriptor> {
        let mut job = self.backlog.pop_front()?;
        job.status = JobStatus::Started;
        job.started_at = Some(Utc::now());
        self.started.insert(job.id.clone(), job.clone());
        Some(job)
    }

    /// Runs a job on the calling task. The returned descriptor carries the final status; errors
    /// are absorbed into it.
    pub async fn run_sync(&mut self, mut job: JobDescriptor, registry: &JobRegistry) -> JobDescriptor {
        if job.started_at.is_none() {
            job.status = JobStatus::Started;
            job.started_at = Some(Utc::now());
        }
        self.started.insert(job.id.clone(), job.clone());

        match Self::execute(&job, registry).await {
            Ok(result) => {
                job.ended_at = Some(Utc::now());
                job.result = Some(result.clone());
                job.status = JobStatus::Finished;
                self.started.remove(&job.id);
                self.finished.insert(job.id.clone(), job.clone());
                info!("{}: job {} OK", self.name, job.id);

                if let Some(callback) = job.on_success.clone() {
                    Self::fire_callback(&job, &callback, CallbackEvent::Success(result), registry)
                        .await;
                }
            }
            Err(cause) => {
                job.ended_at = Some(Utc::now());
                job.set_exc_info(&cause.to_string());
                job.status = JobStatus::Failed;
                self.started.remove(&job.id);
                self.failed.insert(job.id.clone(), job.clone());
                error!("{}: job {} failed: {cause}", self.name, job.id);

                if let Some(callback) = job.on_failure.clone() {
                    Self::fire_callback(
                        &job,
                        &callback,
                        CallbackEvent::Failure(cause.to_string()),
                        registry,
                    )
                    .await;
                }
            }
        }

        job
    }

    /// Marks a job stopped and fires its stopped callback.
    pub async fn stop_job(&mut self, mut job: JobDescriptor, registry: &JobRegistry) -> JobDescriptor {
        job.ended_at = Some(Utc::now());
        job.status = JobStatus::Stopped;
        self.started.remove(&job.id);
        self.failed.insert(job.id.clone(), job.clone());
        info!("{}: job {} stopped", self.name, job.id);

        if let Some(callback) = job.on_stopped.clone() {
            Self::fire_callback(&job, &callback, CallbackEvent::Stopped, registry).await;
        }

        job
    }

    /// Invokes the handler under the descriptor's hard wall-clock timeout.
    async fn execute(job: &JobDescriptor, registry: &JobRegistry) -> Result<Value, ErrorPtr> {
        let handler = registry.handler(&job.func).map_err(convert_error)?;
        let seconds = job.timeout.unwrap_or(DEFAULT_JOB_TIMEOUT);

        match tokio::time::timeout(Duration::from_secs(seconds), handler(job.clone())).await {
            Ok(result) => result,
            Err(_) => Err(convert_error(QueueError::JobTimeout {
                id: job.id.clone(),
                seconds,
            })),
        }
    }

    /// Callback failures are logged, never propagated.
    async fn fire_callback(
        job: &JobDescriptor,
        callback: &JobCallback,
        event: CallbackEvent,
        registry: &JobRegistry,
    ) {
        let handler = match registry.callback(callback) {
            Ok(handler) => handler,
            Err(cause) => {
                error!("Job {}: {cause}", job.id);
                return;
            }
        };

        debug!("Running {:?} callback for {}", event, job.id);
        let future = handler(job.clone(), event);
        let result = match callback.timeout {
            Some(seconds) => {
                match tokio::time::timeout(Duration::from_secs(seconds), future).await {
                    Ok(result) => result,
                    Err(_) => {
                        error!("Job {}: callback {} timed out", job.id, callback.name);
                        return;
                    }
                }
            }
            None => future.await,
        };

        if let Err(cause) = result {
            error!(
                "Job {}: error while executing callback {}: {cause}",
                job.id, callback.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::QueueError;
    use crate::job::{JobCallback, JobDescriptor, JobStatus};
    use crate::queue::Queue;
    use crate::registry::{
        sync_callback_handler, sync_job_handler, CallbackEvent, JobRegistry,
    };
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use trellis_container::instance::convert_error;

    fn registry() -> JobRegistry {
        let mut registry = JobRegistry::new();
        registry.register_handler("math.double", sync_job_handler(|job| {
            let value = job.args.first().and_then(|arg| arg.as_i64()).unwrap_or(0);
            Ok(json!(value * 2))
        }));
        registry.register_handler("always.fails", sync_job_handler(|_| {
            Err(convert_error(QueueError::InvalidCallback))
        }));
        registry
    }

    #[tokio::test]
    async fn should_keep_fifo_order_with_at_front_override() {
        let mut queue = Queue::new("default");
        let first = queue.enqueue(JobDescriptor::new("math.double"));
        let second = queue.enqueue(JobDescriptor::new("math.double"));
        let urgent = queue.enqueue(JobDescriptor::builder("math.double").at_front().build());

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue().unwrap().id, urgent);
        assert_eq!(queue.dequeue().unwrap().id, first);
        assert_eq!(queue.dequeue().unwrap().id, second);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn should_mark_dequeued_jobs_started() {
        let mut queue = Queue::new("default");
        let id = queue.enqueue(JobDescriptor::new("math.double"));

        let job = queue.dequeue().unwrap();
        assert_eq!(job.status, JobStatus::Started);
        assert!(job.started_at.is_some());
        assert_eq!(queue.started_job(&id).unwrap().id, id);
    }

    #[tokio::test]
    async fn should_finish_successful_jobs_and_fire_success_callback() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut registry = registry();
        let callback_events = events.clone();
        registry.register_callback(
            "record",
            sync_callback_handler(move |_, event| {
                callback_events.lock().unwrap().push(format!("{event:?}"));
                Ok(())
            }),
        );

        let mut queue = Queue::new("default");
        let job = JobDescriptor::builder("math.double")
            .arg(json!(21))
            .on_success(JobCallback::new("record").unwrap())
            .build();

        let done = queue.run_sync(job, &registry).await;

        assert_eq!(done.status, JobStatus::Finished);
        assert_eq!(done.result, Some(json!(42)));
        assert!(queue.finished_job(&done.id).is_some());
        assert!(queue.started_job(&done.id).is_none());
        assert_eq!(events.lock().unwrap().len(), 1);
        assert!(events.lock().unwrap()[0].contains("Success"));
    }

    #[tokio::test]
    async fn should_fail_jobs_and_fire_failure_callback() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut registry = registry();
        let callback_events = events.clone();
        registry.register_callback(
            "record",
            sync_callback_handler(move |_, event| {
                if let CallbackEvent::Failure(cause) = event {
                    callback_events.lock().unwrap().push(cause);
                }
                Ok(())
            }),
        );

        let mut queue = Queue::new("default");
        let job = JobDescriptor::builder("always.fails")
            .on_failure(JobCallback::new("record").unwrap())
            .build();

        let done = queue.run_sync(job, &registry).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(queue.failed_job(&done.id).is_some());
        assert!(done.exc_info().unwrap().contains("Callback name"));
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn should_fail_jobs_with_unknown_function_reference() {
        let mut queue = Queue::new("default");
        let done = queue
            .run_sync(JobDescriptor::new("not.registered"), &registry())
            .await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.exc_info().unwrap().contains("not.registered"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_abort_jobs_exceeding_their_timeout() {
        let mut registry = registry();
        registry.register_handler(
            "slow.crawl",
            Arc::new(|_| {
                async {
                    tokio::time::sleep(Duration::from_secs(120)).await;
                    Ok(json!(null))
                }
                .boxed()
            }),
        );

        let mut queue = Queue::new("default");
        let job = JobDescriptor::builder("slow.crawl").timeout(1).build();
        let done = queue.run_sync(job, &registry).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.exc_info().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn should_absorb_callback_errors() {
        let mut registry = registry();
        registry.register_callback(
            "explodes",
            sync_callback_handler(|_, _| Err(convert_error(QueueError::InvalidCallback))),
        );

        let mut queue = Queue::new("default");
        let job = JobDescriptor::builder("math.double")
            .arg(json!(1))
            .on_success(JobCallback::new("explodes").unwrap())
            .build();

        // a failing success callback doesn't change the job outcome
        let done = queue.run_sync(job, &registry).await;
        assert_eq!(done.status, JobStatus::Finished);
    }

    #[tokio::test]
    async fn should_fire_stopped_callback() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut registry = registry();
        let counter = stopped.clone();
        registry.register_callback(
            "on.stop",
            sync_callback_handler(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let mut queue = Queue::new("default");
        let job = JobDescriptor::builder("math.double")
            .on_stopped(JobCallback::new("on.stop").unwrap())
            .build();

        let done = queue.stop_job(job, &registry).await;
        assert_eq!(done.status, JobStatus::Stopped);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }
}
