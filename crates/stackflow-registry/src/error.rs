//! Registry error types

/// Errors raised while loading or validating the topology
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Topology file not found (looked for stack.kdl)")]
    NotFound,

    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("Invalid topology: {0}")]
    InvalidConfig(String),

    #[error("Resource type '{referenced_by}' references undeclared type '{type_name}'")]
    UndeclaredType {
        type_name: String,
        referenced_by: String,
    },

    #[error("Resource type '{0}' is declared more than once")]
    DuplicateType(String),

    #[error("Deployment '{0}' not found")]
    DeploymentNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
