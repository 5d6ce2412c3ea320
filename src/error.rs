//! Unified error handling for the gather crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain-specific errors available where a caller needs the detail.
//!
//! # Architecture
//!
//! - [`GatherErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use gather::error::{Error, GatherErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::utils::error::{CheckpointError, FetchError, PaginationFault};

/// Common trait for all gather error types
pub trait GatherErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, status)
    Network,
    /// Decoding and data extraction errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl GatherErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        self.is_retryable()
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode(_) => ErrorCategory::Parsing,
            Self::InvalidUrl(_) | Self::InvalidHeader(_) => ErrorCategory::Config,
            _ => ErrorCategory::Network,
        }
    }
}

impl GatherErrorTrait for PaginationFault {
    fn is_recoverable(&self) -> bool {
        true
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Decode { .. } => ErrorCategory::Parsing,
            _ => ErrorCategory::Network,
        }
    }
}

impl GatherErrorTrait for CheckpointError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::CreateDir { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Corrupt { .. } | Self::Unkeyed { .. } => ErrorCategory::Parsing,
            _ => ErrorCategory::Storage,
        }
    }
}

/// Unified error type for the gather crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Listing pagination errors
    #[error("Pagination error: {0}")]
    Pagination(#[from] PaginationFault),

    /// Checkpoint storage errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GatherErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => e.is_recoverable(),
            Self::Pagination(e) => e.is_recoverable(),
            Self::Checkpoint(e) => e.is_recoverable(),
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Pagination(e) => e.category(),
            Self::Checkpoint(e) => e.category(),
            Self::Http(_) => ErrorCategory::Network,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let fetch_err = Error::Fetch(FetchError::Timeout);
        assert_eq!(fetch_err.category(), ErrorCategory::Network);

        let decode_err = Error::Fetch(FetchError::Decode("eof".into()));
        assert_eq!(decode_err.category(), ErrorCategory::Parsing);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Fetch(FetchError::Status(502)).is_recoverable());
        assert!(!Error::config("bad").is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let fault = PaginationFault::Transport {
            offset: 0,
            message: "refused".into(),
        };
        let unified: Error = fault.into();
        assert!(matches!(unified, Error::Pagination(_)));
        assert!(unified.is_recoverable());
    }

    #[test]
    fn test_checkpoint_error_category() {
        let err = Error::Checkpoint(CheckpointError::Io {
            path: "block_0000.json".into(),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        });
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert_eq!(err.category().as_str(), "storage");
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
    }
}
