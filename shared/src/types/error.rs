//! Common error types for the game sandbox subsystem

use thiserror::Error;

/// Error taxonomy shared by the sandbox service and its HTTP surface.
///
/// Fatal variants carry a message already safe to show a caller; the root
/// cause is logged at the point of failure before the error is raised.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SandboxError {
    pub fn http_status_code(&self) -> u16 {
        match self {
            SandboxError::Validation(_) => 400,
            SandboxError::NotFound(_) => 404,
            SandboxError::PolicyViolation(_) => 409,
            SandboxError::Scan(_) => 422,
            SandboxError::Provisioning(_) => 502,
            SandboxError::Timeout(_) => 504,
            SandboxError::Internal(_) => 500,
        }
    }

    /// Advisory only: the subsystem itself never retries a failed
    /// provision; retry is the caller's explicit decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }
}

impl From<std::io::Error> for SandboxError {
    fn from(err: std::io::Error) -> Self {
        SandboxError::Internal(err.to_string())
    }
}
