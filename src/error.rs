//! Engine-wide error types.

use thiserror::Error;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure (connect, timeout, TLS).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered, but the body could not be decoded.
    #[error("Malformed response body: {0}")]
    Parse(#[from] serde_json::Error),

    /// 401-equivalent response. The caller must treat the session as
    /// invalid and let the session guard take over.
    #[error("Session is no longer authorized")]
    Unauthorized,

    /// Any other non-success HTTP status.
    #[error("Unexpected HTTP status: {status}")]
    Http { status: u16 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
