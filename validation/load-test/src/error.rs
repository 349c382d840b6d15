//! Error types for tile and descriptor requests.

use crate::executor::TaskError;
use thiserror::Error;

/// Result type alias using RequestError.
pub type RequestResult<T> = Result<T, RequestError>;

/// A failed request. The variants only differ in the diagnostics they carry.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("reading response body from {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid DZI descriptor: {0}")]
    Descriptor(String),

    #[error("request task did not complete: {0}")]
    Task(#[from] TaskError),
}

impl RequestError {
    /// Whether the request gave up waiting on the server.
    pub fn is_timeout(&self) -> bool {
        match self {
            RequestError::Transport { source, .. } | RequestError::Body { source, .. } => {
                source.is_timeout()
            }
            _ => false,
        }
    }

    /// HTTP status, if the server answered at all.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
