//! Error taxonomy for the two failure domains the core cares about:
//! the platform location stream and the external HTTP collaborators.

use thiserror::Error;

/// Failures raised by the platform location stream. These halt sampling;
/// retrying is the caller's decision (call `start()` again).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("location services unavailable: {0}")]
    Unavailable(String),

    #[error("location permission denied")]
    PermissionDenied,
}

/// Failures from the music-generation and weather services. Each variant
/// maps to a distinct remediation message the UI can render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("generation credits exhausted")]
    CreditsExhausted,

    #[error("service configuration error: {0}")]
    Config(String),

    #[error("service error: {0}")]
    Generic(String),
}

impl ServiceError {
    pub fn is_credits(&self) -> bool {
        matches!(self, ServiceError::CreditsExhausted)
    }

    pub fn is_config(&self) -> bool {
        matches!(self, ServiceError::Config(_))
    }

    /// Remediation message shown to the user when a submission fails.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::CreditsExhausted => {
                "Insufficient credits available. Please check your generation service account."
                    .to_string()
            }
            ServiceError::Config(_) => {
                "Music service connection error. Please make sure the generation server is running and reachable."
                    .to_string()
            }
            ServiceError::Generic(message) => {
                format!("Music generation failed. {message}")
            }
        }
    }
}
