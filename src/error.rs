//! Error types for the mustang-dl library.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the music service or downloading tracks.
#[derive(Error, Debug)]
pub enum Error {
    /// The request payload could not be serialized to a JSON object.
    #[error("Payload encoding failed: {0}")]
    Encoding(String),

    /// The asymmetric step received an operand outside the modulus range.
    #[error("Envelope arithmetic failed: {0}")]
    Arithmetic(String),

    /// The service refused the track (paywalled or unknown id).
    #[error("Track {id} rejected: {message}")]
    RemoteRejection {
        /// Track id that was rejected.
        id: u64,
        /// Human-readable reason.
        message: String,
    },

    /// Network failure, non-success status or truncated body during a download.
    #[error("{reason} ({url})")]
    Transfer {
        /// What went wrong.
        reason: String,
        /// Source URL of the transfer.
        url: String,
    },

    /// A transfer exceeded its time budget.
    #[error("Timed out after {}s downloading {url}", after.as_secs())]
    Timeout {
        /// Source URL of the transfer.
        url: String,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// The service answered with a body we could not map.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Invalid configuration or command-line input.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Builds a [`Error::Transfer`] from anything displayable.
    pub fn transfer(reason: impl std::fmt::Display, url: &str) -> Self {
        Self::Transfer {
            reason: reason.to_string(),
            url: url.to_string(),
        }
    }
}

/// A specialized `Result` type for mustang-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
