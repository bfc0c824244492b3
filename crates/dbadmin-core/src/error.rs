//! Error types for dbadmin

use thiserror::Error;

/// Main error type shared by the gateway, the cache bridge and configuration
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Request shape problems detected before anything reaches the engine
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Relational engine failure, text passed through verbatim
    #[error("{0}")]
    Database(String),

    /// Cache server failure, text passed through verbatim
    #[error("{0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("{0}")]
    Other(String),
}

impl AdminError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AdminError::InvalidRequest(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;
