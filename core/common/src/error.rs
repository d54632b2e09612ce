//! Common error types for drivekv.

use thiserror::Error;

/// Top-level error type for drivekv operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Login failed or was cancelled.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The drive rejected the bearer token (expired or revoked).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A record operation was attempted before `init()` completed.
    #[error("Database not initialized: await init() before load() or save()")]
    NotInitialized,

    /// Non-2xx HTTP response or network failure (status 0).
    #[error("Transport error: {status} {status_text}")]
    Transport { status: u16, status_text: String },

    /// File content is not valid JSON or not a record envelope.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a transport error from an HTTP status and its reason phrase.
    pub fn transport(status: u16, status_text: impl Into<String>) -> Self {
        Error::Transport {
            status,
            status_text: status_text.into(),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => Some(*status),
            Error::Unauthorized(_) => Some(401),
            _ => None,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display() {
        let err = Error::transport(503, "Service Unavailable");
        assert_eq!(err.to_string(), "Transport error: 503 Service Unavailable");
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_unauthorized_status() {
        assert_eq!(Error::Unauthorized("expired".into()).status(), Some(401));
        assert_eq!(Error::NotInitialized.status(), None);
    }
}
