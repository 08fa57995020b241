//! String-keyed registries mapping function references to executable handlers.
//!
//! Descriptors travel between processes, so they reference their function and callbacks by name.
//! Each executing process owns a [JobRegistry] resolving those names - the late-bound dispatch
//! happens against handlers validated and registered up front.

use crate::error::QueueError;
use crate::job::{JobCallback, JobDescriptor};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use fxhash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use trellis_container::instance::ErrorPtr;

/// Outcome passed to a callback handler.
#[derive(Clone, Debug)]
pub enum CallbackEvent {
    Success(Value),
    Failure(String),
    Stopped,
}

/// Executes one job; receives the full descriptor.
pub type JobHandler =
    Arc<dyn Fn(JobDescriptor) -> BoxFuture<'static, Result<Value, ErrorPtr>> + Send + Sync>;

/// Runs after a job settled; receives the descriptor and what happened.
pub type CallbackHandler = Arc<
    dyn Fn(JobDescriptor, CallbackEvent) -> BoxFuture<'static, Result<(), ErrorPtr>> + Send + Sync,
>;

/// Wraps a synchronous closure into a [JobHandler].
pub fn sync_job_handler<F>(handler: F) -> JobHandler
where
    F: Fn(JobDescriptor) -> Result<Value, ErrorPtr> + Send + Sync + 'static,
{
    Arc::new(move |job| future::ready(handler(job)).boxed())
}

/// Wraps a synchronous closure into a [CallbackHandler].
pub fn sync_callback_handler<F>(handler: F) -> CallbackHandler
where
    F: Fn(JobDescriptor, CallbackEvent) -> Result<(), ErrorPtr> + Send + Sync + 'static,
{
    Arc::new(move |job, event| future::ready(handler(job, event)).boxed())
}

/// Registry of job and callback handlers for one executing process.
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: FxHashMap<String, JobHandler>,
    callbacks: FxHashMap<String, CallbackHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register_handler(&mut self, name: impl Into<String>, handler: JobHandler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn register_callback(&mut self, name: impl Into<String>, handler: CallbackHandler) {
        self.callbacks.insert(name.into(), handler);
    }

    #[inline]
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn handler(&self, name: &str) -> Result<JobHandler, QueueError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownHandler(name.to_string()))
    }

    pub fn callback(&self, callback: &JobCallback) -> Result<CallbackHandler, QueueError> {
        self.callbacks
            .get(&callback.name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownCallback(callback.name.clone()))
    }
}
