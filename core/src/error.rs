//! Error types for the Plex client.
//!
//! # Design
//! A non-2xx HTTP status is not an error at the dispatch layer: callers get
//! an `Envelope` and inspect the status themselves. `Status` exists only for
//! the typed library operations, which do treat a failed status as failure.
//! `Decode` is produced by the codec but swallowed by the dispatcher so one
//! malformed page never aborts a paginated call.

use thiserror::Error;

use crate::classify::Diagnosis;
use crate::http::Format;

pub type Result<T> = std::result::Result<T, PlexError>;

/// Errors returned by the Plex client.
#[derive(Debug, Error)]
pub enum PlexError {
    /// Construction-time validation failed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request never produced an HTTP response (refused, reset, timed out).
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The authentication collaborator could not produce a token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A body did not match its declared format.
    #[error("could not decode {format} body: {message}")]
    Decode { format: Format, message: String },

    /// A request body could not be serialized.
    #[error("could not encode request body: {0}")]
    Encode(String),

    /// A typed operation received a non-success status.
    #[error("{diagnosis}")]
    Status { status: u16, diagnosis: Diagnosis },

    #[error("configuration error: {0}")]
    Config(String),

    /// The blocking wrapper could not run.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl PlexError {
    /// Returns `true` for network-level failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns the HTTP status code if this is a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
