use thiserror::Error;

/// Errors related to turning type-erased instances into typed ones.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum ContainerError {
    #[error("Instance resolved for '{key}' cannot be downcast to the requested type")]
    IncompatibleInstance { key: String },
}

/// Errors related to registering and calling bound methods.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum InvocationError {
    #[error("Method not provided.")]
    MethodNotProvided,
    #[error("Malformed method key: {0}")]
    MalformedMethodKey(String),
    #[error("Duplicate parameter '{parameter}' declared for method {method}")]
    DuplicateParameter { method: String, parameter: String },
    #[error("No method bound under key: {0}")]
    UnknownMethod(String),
    #[error("Unable to resolve call target '{0}'")]
    UnresolvedTarget(String),
    #[error("Unable to resolve dependency [{parameter}] in class {owner}")]
    UnresolvedParameter { parameter: String, owner: String },
}
