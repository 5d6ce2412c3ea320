//! Error types for the gather harvester
//!
//! This module defines the domain-specific error types used by the
//! collection engine. None of them is fatal on its own: the engine turns
//! each one into a smaller, explicitly reported result set.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while fetching a single detail record
///
/// Every variant is a transient request error from the engine's point of
/// view and is retried up to the per-request budget.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error (connection refused, reset, DNS, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("Server returned status {0}")]
    Status(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Body was not a JSON document
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Detail reference could not be turned into a URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Header value could not be encoded
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),
}

impl FetchError {
    /// Classify a reqwest error, separating timeouts from other transport failures
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl(_) | Self::InvalidHeader(_))
    }
}

/// A listing page could not be retrieved
///
/// Pagination faults end summary collection early. The records gathered so
/// far are still returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaginationFault {
    /// Listing endpoint answered with a non-success status
    #[error("listing page at offset {offset} returned status {status}")]
    Status { offset: usize, status: u16 },

    /// Request never produced a response
    #[error("listing page at offset {offset} failed: {message}")]
    Transport { offset: usize, message: String },

    /// Response body was not valid JSON
    #[error("listing page at offset {offset} was not valid JSON: {message}")]
    Decode { offset: usize, message: String },
}

impl PaginationFault {
    /// Offset of the page that failed
    pub fn offset(&self) -> usize {
        match self {
            Self::Status { offset, .. }
            | Self::Transport { offset, .. }
            | Self::Decode { offset, .. } => *offset,
        }
    }
}

/// Errors raised by checkpoint storage
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint directory could not be created
    #[error("Failed to create checkpoint directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing a checkpoint file failed
    #[error("Checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint file content is not a JSON array of objects
    #[error("Checkpoint {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A record's payload does not carry its own id, so it could not be restored
    #[error("Record {id} cannot be checkpointed: payload `{field}` is missing or differs")]
    Unkeyed { id: String, field: String },
}
