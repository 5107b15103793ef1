//! Client error types

use latch_core::{StorageError, ValidationError};
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed and could not be recovered by a refresh
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Input rejected, locally or by the server; the message is user-facing
    #[error("{0}")]
    Validation(String),

    /// The session could not be recovered
    #[error("Session refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// Durable token storage failed
    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether this error ended the session (as opposed to failing one call)
    pub const fn is_session_terminal(&self) -> bool {
        matches!(self, Self::RefreshFailed(_))
    }
}

impl From<ValidationError> for ClientError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Why a refresh attempt failed
///
/// Every variant is handled identically by the refresh coordinator: the
/// session is torn down and all waiting requests are rejected with a clone of
/// the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// No refresh token was stored, so there was nothing to exchange
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The refresh endpoint could not be reached
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The refresh endpoint did not answer in time
    #[error("refresh request timed out")]
    Timeout,

    /// The refresh endpoint rejected the refresh token
    #[error("refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The refresh endpoint answered with something unusable
    #[error("malformed refresh response: {0}")]
    Malformed(String),

    /// The session was cleared or replaced while the refresh was in flight
    #[error("session was replaced while refreshing")]
    Superseded,

    /// The refreshed tokens could not be persisted
    #[error("failed to store refreshed tokens: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ClientError::from_status(StatusCode::UNAUTHORIZED, "expired".into()),
            ClientError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_REQUEST, "bad".into()),
            ClientError::BadRequest(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::FORBIDDEN, "no".into()),
            ClientError::Forbidden(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::NOT_FOUND, "gone".into()),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_GATEWAY, "down".into()),
            ClientError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn test_validation_error_keeps_user_message() {
        let err: ClientError = ValidationError::PasswordTooShort.into();
        assert_eq!(err.to_string(), "Password must be at least 6 characters");
        assert!(!err.is_session_terminal());
    }

    #[test]
    fn test_refresh_failure_is_terminal() {
        let err: ClientError = RefreshError::Timeout.into();
        assert!(err.is_session_terminal());
        assert_eq!(err.to_string(), "Session refresh failed: refresh request timed out");
    }
}
