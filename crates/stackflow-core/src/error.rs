//! Engine error types

use stackflow_cloud::{ErrorKind, GatewayError};
use stackflow_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Dependency cycle detected between: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Unknown resource type: {0}")]
    UnknownType(String),

    #[error("Discovery of {resource_type} failed: {source}")]
    Discovery {
        resource_type: String,
        #[source]
        source: GatewayError,
    },

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Errors caused by the topology rather than by the provider
    pub fn is_configuration(&self) -> bool {
        match self {
            CoreError::CycleDetected(_) | CoreError::Registry(_) | CoreError::UnknownType(_) => true,
            // the provider rejected the request itself, e.g. an unsupported type
            CoreError::Discovery { source, .. } => source.kind == ErrorKind::Validation,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(kind: ErrorKind) -> CoreError {
        CoreError::Discovery {
            resource_type: "network".to_string(),
            source: GatewayError::new(kind, "describe failed"),
        }
    }

    #[test]
    fn test_is_configuration() {
        assert!(CoreError::CycleDetected(vec!["a/x".to_string()]).is_configuration());
        assert!(CoreError::UnknownType("router".to_string()).is_configuration());
        assert!(discovery(ErrorKind::Validation).is_configuration());
        assert!(!discovery(ErrorKind::RateLimited).is_configuration());
        assert!(!CoreError::LockError("held".to_string()).is_configuration());
    }
}
