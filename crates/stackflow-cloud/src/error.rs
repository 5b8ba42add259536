//! Gateway error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured classification of a failed gateway call.
///
/// The lifecycle engine branches on this value only; provider error text is
/// carried along for the report but never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The resource does not exist
    NotFound,
    /// The resource is in use or in a conflicting state
    Conflict,
    /// The provider refuses to touch the resource
    Protected,
    /// The provider asked us to slow down
    RateLimited,
    /// The request itself is malformed; retrying will not help
    Validation,
    /// The call did not complete in time
    Timeout,
    /// Anything the provider did not classify
    Unknown,
}

impl ErrorKind {
    /// Whether a call failing with this kind may succeed when retried.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Conflict | ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::Unknown
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Protected => write!(f, "protected"),
            ErrorKind::RateLimited => write!(f, "rate-limited"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Error returned by every [`CloudGateway`](crate::CloudGateway) call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn protected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protected, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors of the memory gateway's state file (not of gateway calls)
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("State file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
