use std::sync::Arc;

/// Errors surfaced by the HITrack client library.
///
/// Expired access tokens are recovered inside [`crate::client::ApiClient`]; everything that
/// reaches a caller is one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Login credentials were rejected. Carries the server message, or a generic fallback.
    #[error("{0}")]
    Authentication(String),

    /// The access token could not be renewed; the session has been cleared. Concurrent requests
    /// that were waiting on the same refresh share the one failure.
    #[error("session expired: {0}")]
    SessionExpired(#[source] Arc<Error>),

    /// Any non-success HTTP response, including a 401 on an already-retried request.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP transport: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure not raised by reqwest (eg, a fake transport in tests)
    #[error("HTTP transport: {0}")]
    Transport(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token storage: {0}")]
    Storage(#[from] std::io::Error),

    #[error("couldn't parse JWT: {0}")]
    Jwt(String),

    #[error("configuration: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// HTTP status code, if this error came from an API response
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

#[test]
fn test_error_status() {
    let err = Error::Api {
        status: 401,
        message: "Authentication credentials were not provided.".to_string(),
    };
    assert!(err.is_unauthorized());
    assert_eq!(
        err.to_string(),
        "API error (401): Authentication credentials were not provided."
    );

    let expired = Error::SessionExpired(Arc::new(err));
    assert_eq!(expired.status(), None);
    assert!(!Error::Transport("connection refused".to_string()).is_unauthorized());
}
