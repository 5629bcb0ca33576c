use super::classify::Failure;
use super::http::TransportError;
use crate::auth::RenewalError;

/// Errors surfaced to callers of [`super::ApiClient`]
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was rejected as unauthorized even after a credential renewal
    #[error("Unauthorized")]
    Unauthorized,
    /// The expired credential could not be renewed
    ///
    /// Unless the renewal was abandoned, the session has ended.
    #[error("Session renewal failed: {0}")]
    RenewalFailed(#[from] RenewalError),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(#[from] TransportError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// Returns true if the user has been moved to the logged-out state
    pub fn is_session_ended(&self) -> bool {
        matches!(self, ApiError::RenewalFailed(e) if *e != RenewalError::Abandoned)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<Failure> for ApiError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Transport(e) => ApiError::Network(e),
            Failure::Status(ref response) => ApiError::Http {
                status: response.status,
                message: failure.user_message(),
            },
        }
    }
}
