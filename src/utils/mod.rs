//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use url::Url;

use crate::utils::error::FetchError;

/// Resolve a detail reference against the API base URL
///
/// Absolute references are returned unchanged. Relative references are
/// appended to the base URL's origin the way the remote API emits them
/// (`/v1/pedido/123` style paths).
pub fn resolve_reference(base: &Url, reference: &str) -> Result<Url, FetchError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(FetchError::InvalidUrl("empty detail reference".to_string()));
    }

    if let Ok(absolute) = Url::parse(reference) {
        return Ok(absolute);
    }

    base.join(reference)
        .map_err(|e| FetchError::InvalidUrl(format!("{reference}: {e}")))
}

/// Truncate text to a maximum length
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
