//! Error types for the deployment controller

use thiserror::Error;

use crate::compose::gateway::GatewayError;

/// Main error type for the deployment controller
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Backend operation failed: {0}")]
    BackendOperationFailed(String),

    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        /// Variables already applied in memory
        updated: Vec<String>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Stable error kind reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::InvalidState(_) => "InvalidStateError",
            ControllerError::ValidationError(_) => "ValidationError",
            ControllerError::ContainerNotFound(_) => "ContainerNotFoundError",
            ControllerError::BackendUnavailable(_) => "BackendUnavailableError",
            ControllerError::VerificationFailed(_) => "VerificationFailedError",
            ControllerError::BackendOperationFailed(_) => "BackendOperationFailedError",
            ControllerError::Persistence { .. } => "PersistenceError",
            _ => "InternalError",
        }
    }

    /// Whether the request itself was at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ControllerError::InvalidState(_)
                | ControllerError::ValidationError(_)
                | ControllerError::ContainerNotFound(_)
        )
    }
}

impl From<GatewayError> for ControllerError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => ControllerError::BackendUnavailable(msg),
            other => ControllerError::BackendOperationFailed(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        ControllerError::Internal(err.to_string())
    }
}
