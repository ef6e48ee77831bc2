//! Error types for backend API calls.

use session_store::{AuthError, ClassifyAuth};
use thiserror::Error;

/// Backend API error.
///
/// Callers branch on the variant, never on the message.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Backend refused the credentials (401/403)
    #[error("Authentication error: {status}")]
    Authorization { status: u16 },

    /// Request never got an HTTP answer
    #[error("Network error: {0}")]
    Network(String),

    /// Input rejected before sending
    #[error("{0}")]
    Validation(String),

    /// Any other non-success status
    #[error("Error {status}: {message}")]
    Http { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Auth core error
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Text suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation(message) => message.clone(),
            ApiError::Http { message, .. } => message.clone(),
            ApiError::Auth(AuthError::NotLoggedIn) => {
                "Authentication required. Please log in again.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl ClassifyAuth for ApiError {
    fn is_authorization(&self) -> bool {
        match self {
            ApiError::Authorization { .. } => true,
            ApiError::Auth(e) => e.is_authorization(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}

/// Result type for backend API calls.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_classification() {
        assert!(ApiError::Authorization { status: 401 }.is_authorization());
        assert!(ApiError::Auth(AuthError::SessionExpired).is_authorization());
        assert!(!ApiError::Network("reset".to_string()).is_authorization());
        assert!(!ApiError::Http {
            status: 500,
            message: "boom".to_string()
        }
        .is_authorization());
    }

    #[test]
    fn test_http_error_message_mentioning_auth_is_not_authorization() {
        let err = ApiError::Http {
            status: 400,
            message: "author field missing".to_string(),
        };
        assert!(!err.is_authorization());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            ApiError::Auth(AuthError::NotLoggedIn).user_message(),
            "Authentication required. Please log in again."
        );
        assert_eq!(
            ApiError::Validation("Please enter a valid URL".to_string()).user_message(),
            "Please enter a valid URL"
        );
        assert_eq!(
            ApiError::Authorization { status: 403 }.user_message(),
            "Authentication error: 403"
        );
    }
}
