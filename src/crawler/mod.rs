//! Listing and detail retrieval
//!
//! This module implements the collection engine: sequential listing
//! pagination, block planning, bounded-concurrency detail fetching and the
//! reconciliation loop that drives them.

pub mod batch;
pub mod fetcher;
pub mod headers;
pub mod list;
pub mod reconcile;

use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::crawler::headers::{build_api_headers, Credentials};
use crate::utils::error::FetchError;

/// Everything needed to build an HTTP client for the remote API
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_agent: String,
    pub credentials: Credentials,
    /// Per-request timeout; an expired timeout counts as a failed attempt
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("gather/{}", env!("CARGO_PKG_VERSION")),
            credentials: Credentials::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_agent: config.api.user_agent.clone(),
            credentials: Credentials::new(&config.api.api_key, &config.api.application_key),
            timeout: config.request_timeout(),
        }
    }

    /// Build a client with the credential headers installed as defaults
    pub fn build_client(&self) -> Result<Client, FetchError> {
        let headers = build_api_headers(&self.user_agent, &self.credentials)?;

        Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .gzip(true)
            .build()
            .map_err(FetchError::Http)
    }
}
