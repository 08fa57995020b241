use thiserror::Error;

/// Errors related to queueing and executing jobs.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum QueueError {
    #[error("No job handler registered for function reference: {0}")]
    UnknownHandler(String),
    #[error("No callback registered: {0}")]
    UnknownCallback(String),
    #[error("Callback name must not be empty")]
    InvalidCallback,
    #[error("Job {id} exceeded its timeout of {seconds}s")]
    JobTimeout { id: String, seconds: u64 },
}
