use std::any::Any;
use std::error::Error;
use std::sync::Arc;

pub type InstancePtr<T> = Arc<T>;

pub type AnyInstancePtr = Arc<dyn Any + Send + Sync>;

pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Erases a concrete value into the pointer type stored by the container.
pub fn erased<T: Send + Sync + 'static>(value: T) -> AnyInstancePtr {
    Arc::new(value)
}

/// Converts a concrete error into the opaque pointer propagated by container operations.
pub fn convert_error<E: Error + Send + Sync + 'static>(error: E) -> ErrorPtr {
    Arc::new(error) as ErrorPtr
}
