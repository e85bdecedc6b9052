use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can stop the relay from starting or serving.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Invalid command-line or environment configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Underlying I/O error (bind, serve).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// History or credential file failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    /// Wire message could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Outbound HTTP request failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
