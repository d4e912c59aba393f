//! Error types for the session layer.

use std::fmt;

use http::StatusCode;

/// Errors from the auth HTTP API.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// Connection refused, DNS failure, TLS error, ...
    Network(String),
    /// The request did not complete within the configured timeout.
    Timeout,
    /// The server answered with a non-2xx status.
    Status { status: StatusCode, message: String },
    /// The response body was not what the endpoint promises.
    Decode(String),
}

impl ApiError {
    /// Whether retrying an idempotent request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status { status, .. } => status.is_server_error(),
            Self::Decode(_) => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Status { status, message } => write!(f, "HTTP {}: {}", status.as_u16(), message),
            Self::Decode(msg) => write!(f, "Malformed response: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Errors from the token store backend.
#[derive(Debug, Clone)]
pub enum StoreError {
    Io(String),
    Serialize(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "Token store I/O error: {}", msg),
            Self::Serialize(msg) => write!(f, "Token store serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Why a stored token could not be turned into a profile.
#[derive(Debug, Clone)]
pub enum ResolveError {
    MissingToken,
    Api(ApiError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingToken => write!(f, "No session token to resolve"),
            Self::Api(e) => write!(f, "Could not load current user: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<ApiError> for ResolveError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

/// Errors returned by `login` and `register`.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// The server rejected the request or could not be reached.
    Api(ApiError),
    /// The session could not be persisted.
    Store(StoreError),
    /// A later login, register or logout replaced this attempt.
    Superseded,
}

impl AuthError {
    /// Text suitable for showing next to a login form.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(ApiError::Status { message, .. }) if !message.is_empty() => message.clone(),
            Self::Api(ApiError::Timeout) | Self::Api(ApiError::Network(_)) => {
                "Could not reach the server, please try again".to_string()
            }
            Self::Api(_) => "Unexpected response from the server".to_string(),
            Self::Store(_) => "Could not save the session on this device".to_string(),
            Self::Superseded => "Sign-in was cancelled".to_string(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(e) => write!(f, "{}", e),
            Self::Store(e) => write!(f, "{}", e),
            Self::Superseded => write!(f, "Superseded by a newer session change"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid credentials".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 401: Invalid credentials");
        assert_eq!(ApiError::Timeout.to_string(), "Request timed out");
    }

    #[test]
    fn test_api_error_retryable() {
        assert!(ApiError::Timeout.is_retryable());
        assert!(ApiError::Network("refused".to_string()).is_retryable());
        assert!(
            ApiError::Status {
                status: StatusCode::BAD_GATEWAY,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ApiError::Status {
                status: StatusCode::UNAUTHORIZED,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!ApiError::Decode("x".to_string()).is_retryable());
    }

    #[test]
    fn test_auth_error_user_message() {
        let err = AuthError::Api(ApiError::Status {
            status: StatusCode::BAD_REQUEST,
            message: "User already exists".to_string(),
        });
        assert_eq!(err.user_message(), "User already exists");
        assert_eq!(
            AuthError::Api(ApiError::Timeout).user_message(),
            "Could not reach the server, please try again"
        );
        assert_eq!(AuthError::Superseded.to_string(), "Superseded by a newer session change");
    }
}
