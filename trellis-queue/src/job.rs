//! Job descriptors: the persisted unit of deferred work.
//!
//! A descriptor references its function by name, since the process executing it is generally not
//! the process which enqueued it - everything it carries must survive serialization. The serde
//! representation *is* the wire format consumed by worker processes.

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{Read, Write};
use uuid::Uuid;

/// The single current status of a job descriptor.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
    Stopped,
    Scheduled,
    Deferred,
}

/// Reference to a success/failure/stopped callback, carrying its own argument payload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobCallback {
    pub name: String,
    /// Hard limit for the callback itself, in seconds.
    pub timeout: Option<u64>,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl JobCallback {
    pub fn new(name: impl Into<String>) -> Result<Self, QueueError> {
        let name = name.into();
        if name.is_empty() {
            return Err(QueueError::InvalidCallback);
        }

        Ok(Self {
            name,
            timeout: None,
            params: Vec::new(),
        })
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// A unit of deferred work submitted to exactly one named queue.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct JobDescriptor {
    pub id: String,
    /// Function reference resolved through a job registry at execution time.
    pub func: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Name of the queue the descriptor was submitted to.
    #[serde(default)]
    pub origin: String,
    /// Hard wall-clock execution limit, in seconds.
    pub timeout: Option<u64>,
    /// Maximum queue residence time, in seconds.
    pub ttl: Option<u64>,
    /// Retention of successful results, in seconds.
    pub result_ttl: Option<u64>,
    /// Retention of failed-job information, in seconds.
    pub failure_ttl: Option<u64>,
    pub status: JobStatus,
    #[serde(default)]
    pub dependency_ids: Vec<String>,
    #[serde(default)]
    pub retry_intervals: Vec<u64>,
    #[serde(default)]
    pub retries_left: Option<u32>,
    #[serde(default)]
    pub enqueue_at_front: bool,
    #[serde(default)]
    pub on_success: Option<JobCallback>,
    #[serde(default)]
    pub on_failure: Option<JobCallback>,
    #[serde(default)]
    pub on_stopped: Option<JobCallback>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub enqueued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<Value>,
    /// Zlib-compressed exception trace, present after a failure.
    #[serde(default)]
    exc_info: Option<Vec<u8>>,
}

impl JobDescriptor {
    pub fn new(func: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            func: func.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            description: None,
            meta: Map::new(),
            origin: String::new(),
            timeout: None,
            ttl: None,
            result_ttl: None,
            failure_ttl: None,
            status: JobStatus::Queued,
            dependency_ids: Vec::new(),
            retry_intervals: Vec::new(),
            retries_left: None,
            enqueue_at_front: false,
            on_success: None,
            on_failure: None,
            on_stopped: None,
            created_at: Utc::now(),
            enqueued_at: None,
            started_at: None,
            ended_at: None,
            result: None,
            exc_info: None,
        }
    }

    pub fn builder(func: impl Into<String>) -> JobBuilder {
        JobBuilder {
            job: Self::new(func),
        }
    }

    /// The configured description, or a generated call string.
    pub fn description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("{}({} args)", self.func, self.args.len()))
    }

    /// Compresses and stores an exception trace.
    pub fn set_exc_info(&mut self, trace: &str) {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let _ = encoder.write_all(trace.as_bytes());
        self.exc_info = encoder.finish().ok();
    }

    /// Decompresses the stored trace, falling back to the raw bytes when not compressed.
    pub fn exc_info(&self) -> Option<String> {
        let raw = self.exc_info.as_ref()?;
        let mut decoder = ZlibDecoder::new(raw.as_slice());
        let mut text = String::new();

        match decoder.read_to_string(&mut text) {
            Ok(_) => Some(text),
            Err(_) => Some(String::from_utf8_lossy(raw).into_owned()),
        }
    }

    /// Serializes into the persisted wire format.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Restores a descriptor from the persisted wire format.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Builder for [JobDescriptor]s.
pub struct JobBuilder {
    job: JobDescriptor,
}

impl JobBuilder {
    pub fn arg(mut self, value: Value) -> Self {
        self.job.args.push(value);
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.job.kwargs.insert(name.into(), value);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.job.description = Some(description.into());
        self
    }

    pub fn meta(mut self, name: impl Into<String>, value: Value) -> Self {
        self.job.meta.insert(name.into(), value);
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.job.timeout = Some(seconds);
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.job.ttl = Some(seconds);
        self
    }

    pub fn result_ttl(mut self, seconds: u64) -> Self {
        self.job.result_ttl = Some(seconds);
        self
    }

    pub fn failure_ttl(mut self, seconds: u64) -> Self {
        self.job.failure_ttl = Some(seconds);
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.job.dependency_ids.push(id.into());
        self
    }

    pub fn retry_intervals(mut self, intervals: Vec<u64>) -> Self {
        self.job.retry_intervals = intervals;
        self
    }

    pub fn retries(mut self, count: u32) -> Self {
        self.job.retries_left = Some(count);
        self
    }

    pub fn at_front(mut self) -> Self {
        self.job.enqueue_at_front = true;
        self
    }

    pub fn on_success(mut self, callback: JobCallback) -> Self {
        self.job.on_success = Some(callback);
        self
    }

    pub fn on_failure(mut self, callback: JobCallback) -> Self {
        self.job.on_failure = Some(callback);
        self
    }

    pub fn on_stopped(mut self, callback: JobCallback) -> Self {
        self.job.on_stopped = Some(callback);
        self
    }

    pub fn build(self) -> JobDescriptor {
        self.job
    }
}
