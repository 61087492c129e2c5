//! Error types for P7 Host

use p7_core::P7Error;
use thiserror::Error;

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// Errors that can occur on the host side
#[derive(Error, Debug)]
pub enum HostError {
    /// Engine-level failure
    #[error(transparent)]
    P7(#[from] P7Error),

    /// Configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Binding used before it was attached to an owner
    #[error("Telemetry '{0}' is not bound to an owner")]
    Unbound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Stable code, delegating to the engine error where there is one
    pub fn error_code(&self) -> &'static str {
        match self {
            HostError::P7(err) => err.error_code(),
            HostError::Config(_) => "INVALID_CONFIG",
            HostError::Unbound(_) => "UNBOUND",
            HostError::Serialization(_) => "SERIALIZATION",
            HostError::Io(_) => "IO",
        }
    }
}
