//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No session is stored
    #[error("Not logged in")]
    NotLoggedIn,

    /// Stored session expired and could not be refreshed
    #[error("Session expired")]
    SessionExpired,

    /// Provider rejected the session (revoked, signed out elsewhere, ...)
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Provider returned an error for a refresh
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// OAuth redirect could not be completed
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Provider answered with an unexpected status
    #[error("Auth provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] client_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable and timeouts
    /// - Connection failures
    /// - 5xx responses from the provider
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable | AuthError::Timeout => true,
            AuthError::Provider { status, .. } => *status >= 500,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|status| status.is_server_error())
            }
            _ => false,
        }
    }

    /// Returns true if the provider no longer recognizes the session.
    pub fn is_session_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::NotLoggedIn | AuthError::SessionExpired | AuthError::SessionInvalid(_)
        )
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can say whether they mean "the credentials were refused".
///
/// Retry and recovery paths branch on this tag instead of inspecting
/// messages.
pub trait ClassifyAuth {
    fn is_authorization(&self) -> bool;
}

impl ClassifyAuth for AuthError {
    fn is_authorization(&self) -> bool {
        match self {
            AuthError::Provider { status, .. } => matches!(status, 401 | 403),
            other => other.is_session_rejection(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_network_unavailable() {
        assert!(AuthError::NetworkUnavailable.is_transient());
    }

    #[test]
    fn test_is_transient_timeout() {
        assert!(AuthError::Timeout.is_transient());
    }

    #[test]
    fn test_is_transient_server_error_status() {
        let err = AuthError::Provider {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_is_not_transient_client_error_status() {
        let err = AuthError::Provider {
            status: 400,
            message: "invalid_grant".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_session_rejection() {
        assert!(AuthError::SessionInvalid("revoked".to_string()).is_session_rejection());
        assert!(AuthError::NotLoggedIn.is_session_rejection());
        assert!(!AuthError::Timeout.is_session_rejection());
    }

    #[test]
    fn test_classify_authorization() {
        let forbidden = AuthError::Provider {
            status: 403,
            message: "forbidden".to_string(),
        };
        assert!(forbidden.is_authorization());
        assert!(AuthError::SessionExpired.is_authorization());
        assert!(!AuthError::NetworkUnavailable.is_authorization());
    }
}
