use secp256k1::Error as SecpError;
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ResourceExhausted,
    ServiceUnavailable,
    ConvergenceTimeout,
    ConstructionFailed,
    InvalidStateTransition,
    TeardownFailed,
    ConfigError,
    NodeRpcError,
    SigningServiceError,
    KeyNotFound,
    InvalidPassphrase,
    InvalidKey,
    StorageError,
    SerializationError,
    ProcessError,
    Message,
}

#[derive(Debug, Error)]
pub enum ItestError {
    #[error("resource exhausted: {resource}: {details}")]
    ResourceExhausted { resource: String, details: String },

    #[error("service {service} unavailable after {waited_ms}ms (last error: {})", .last_error.as_deref().unwrap_or("none"))]
    ServiceUnavailable { service: String, waited_ms: u128, last_error: Option<String> },

    #[error("timed out after {waited_ms}ms waiting for {description} (last error: {})", .last_error.as_deref().unwrap_or("none"))]
    ConvergenceTimeout { description: String, waited_ms: u128, last_error: Option<String> },

    #[error("failed to construct {component}: {details}")]
    ConstructionFailed { component: String, details: String },

    #[error("invalid state transition for {service}: {from} -> {to}")]
    InvalidStateTransition { service: String, from: String, to: String },

    #[error("teardown failed with {} error(s): {}", .failures.len(), .failures.join("; "))]
    TeardownFailed { failures: Vec<String> },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("node RPC error: {0}")]
    NodeRpcError(String),

    #[error("signing service error: {0}")]
    SigningServiceError(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid passphrase for key {0}")]
    InvalidPassphrase(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("serialization error ({format}): {details}")]
    SerializationError { format: String, details: String },

    #[error("process {name} failed: {details}")]
    ProcessError { name: String, details: String },

    #[error("{0}")]
    Message(String),
}

impl ItestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ItestError::ResourceExhausted { .. } => ErrorCode::ResourceExhausted,
            ItestError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            ItestError::ConvergenceTimeout { .. } => ErrorCode::ConvergenceTimeout,
            ItestError::ConstructionFailed { .. } => ErrorCode::ConstructionFailed,
            ItestError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            ItestError::TeardownFailed { .. } => ErrorCode::TeardownFailed,
            ItestError::ConfigError(_) => ErrorCode::ConfigError,
            ItestError::NodeRpcError(_) => ErrorCode::NodeRpcError,
            ItestError::SigningServiceError(_) => ErrorCode::SigningServiceError,
            ItestError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            ItestError::InvalidPassphrase(_) => ErrorCode::InvalidPassphrase,
            ItestError::InvalidKey(_) => ErrorCode::InvalidKey,
            ItestError::StorageError { .. } => ErrorCode::StorageError,
            ItestError::SerializationError { .. } => ErrorCode::SerializationError,
            ItestError::ProcessError { .. } => ErrorCode::ProcessError,
            ItestError::Message(_) => ErrorCode::Message,
        }
    }

    pub fn resource_exhausted(resource: impl Into<String>, details: impl ToString) -> Self {
        ItestError::ResourceExhausted { resource: resource.into(), details: details.to_string() }
    }

    pub fn construction_failed(component: impl Into<String>, details: impl ToString) -> Self {
        ItestError::ConstructionFailed { component: component.into(), details: details.to_string() }
    }

    pub fn process(name: impl Into<String>, details: impl ToString) -> Self {
        ItestError::ProcessError { name: name.into(), details: details.to_string() }
    }

    /// Collapses a list of independent failures into one error, or `Ok` when there were none.
    pub fn aggregate(failures: Vec<ItestError>) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        let mut messages = Vec::with_capacity(failures.len());
        for failure in failures {
            match failure {
                ItestError::TeardownFailed { failures } => messages.extend(failures),
                other => messages.push(other.to_string()),
            }
        }
        Err(ItestError::TeardownFailed { failures: messages })
    }
}

pub type Result<T> = std::result::Result<T, ItestError>;

#[macro_export]
macro_rules! storage_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::ItestError::StorageError { operation: $op.into(), details: $err.to_string() }
    };
}

impl From<io::Error> for ItestError {
    fn from(err: io::Error) -> Self {
        ItestError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for ItestError {
    fn from(err: serde_json::Error) -> Self {
        ItestError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<hex::FromHexError> for ItestError {
    fn from(err: hex::FromHexError) -> Self {
        ItestError::InvalidKey(format!("hex decode error: {}", err))
    }
}

impl From<SecpError> for ItestError {
    fn from(err: SecpError) -> Self {
        ItestError::InvalidKey(format!("secp256k1: {}", err))
    }
}

// NOTE: Avoid adding generic "stringly" error conversions here.
// Use structured `ItestError` variants at the call site to preserve context.
