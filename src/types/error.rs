//! Error types for Liaison

use hyper::StatusCode;

/// Main error type for Liaison operations
///
/// The first five variants are the recoverable domain errors and carry their
/// user-facing message verbatim; boundary layers surface them as-is. The
/// remaining variants are infrastructure and configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum LiaisonError {
    /// Registration validation: a required field was empty
    #[error("{0}")]
    MissingField(String),

    /// Registration validation: the username is already taken
    #[error("{0}")]
    DuplicateUsername(String),

    /// Identity or token lookup miss
    #[error("{0}")]
    NotFound(String),

    /// Link token unknown or already consumed
    #[error("{0}")]
    InvalidToken(String),

    /// Authorization gate denial
    #[error("{0}")]
    NotAuthorized(String),

    /// The chat identity is already bound to a different account
    #[error("{0}")]
    AlreadyLinked(String),

    #[error("Delivery failure: {0}")]
    Delivery(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl LiaisonError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingField(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateUsername(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidToken(_) => StatusCode::BAD_REQUEST,
            Self::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Self::AlreadyLinked(_) => StatusCode::CONFLICT,
            Self::Delivery(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// True for lookup misses that callers may collapse to a boolean or
    /// pivot on (the gate and the command dispatcher both do)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for LiaisonError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<sled::Error> for LiaisonError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LiaisonError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for LiaisonError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<reqwest::Error> for LiaisonError {
    fn from(err: reqwest::Error) -> Self {
        Self::Delivery(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for LiaisonError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for Liaison operations
pub type Result<T> = std::result::Result<T, LiaisonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_surface_verbatim() {
        let err = LiaisonError::NotFound("User not found".into());
        assert_eq!(err.to_string(), "User not found");

        let err = LiaisonError::NotAuthorized("Not Authorized".into());
        assert_eq!(err.to_string(), "Not Authorized");

        let err = LiaisonError::InvalidToken("The user association link was not valid.".into());
        assert_eq!(
            err.to_string(),
            "The user association link was not valid."
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            LiaisonError::MissingField("A username is required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LiaisonError::DuplicateUsername("The username is not available".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LiaisonError::NotAuthorized("Not Authorized".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            LiaisonError::AlreadyLinked("already associated".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LiaisonError::Storage("db closed".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(LiaisonError::NotFound("User not found".into()).is_not_found());
        assert!(!LiaisonError::Storage("broken".into()).is_not_found());
    }
}
