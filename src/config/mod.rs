//! Configuration management for the gather harvester
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Command-line flags are applied on top by the
//! binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::models::RecordSchema;
use crate::utils::retry::RetryPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API configuration
    pub api: ApiConfig,

    /// Collection engine configuration
    pub collection: CollectionConfig,

    /// Checkpoint storage configuration
    pub checkpoint: CheckpointConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL detail references are resolved against
    pub base_url: String,

    /// Listing endpoint path (relative to `base_url`) or absolute URL
    pub listing_path: String,

    /// API key half of the credential pair
    pub api_key: String,

    /// Application key half of the credential pair
    pub application_key: String,

    /// User agent string
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Collection engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Items requested per listing page
    pub page_size: usize,

    /// Listing records per detail block
    pub block_size: usize,

    /// Simultaneous in-flight detail requests
    pub concurrency: usize,

    /// Attempts per detail request (first try included)
    pub max_attempts: u32,

    /// Linear backoff base between attempts, in milliseconds
    pub backoff_base_ms: u64,

    /// Reconciliation rounds after the initial block pass
    pub max_rounds: u32,

    /// Fixed part of the delay before each reconciliation round, in seconds
    pub round_delay_base_secs: u64,

    /// Per-round increment of that delay, in seconds
    pub round_delay_step_secs: u64,

    /// Field names of listing and detail objects
    pub schema: RecordSchema,
}

/// Checkpoint storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory holding one file per block
    pub dir: PathBuf,

    /// File name prefix, files are `{prefix}_{index:04}.json`
    pub prefix: String,

    /// Reuse stored blocks instead of fetching them again
    pub resume: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Merged dataset file (JSON array of detail objects)
    pub dataset_path: PathBuf,

    /// Run report file
    pub report_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://api.awsli.com.br"),
            listing_path: String::from("/v1/pedido"),
            api_key: String::new(),
            application_key: String::new(),
            user_agent: format!("gather/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            block_size: 500,
            concurrency: 10,
            max_attempts: 3,
            backoff_base_ms: 1000,
            max_rounds: 5,
            round_delay_base_secs: 5,
            round_delay_step_secs: 3,
            schema: RecordSchema::default(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("checkpoints"),
            prefix: String::from("block"),
            resume: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("output/dataset.json"),
            report_path: PathBuf::from("output/report.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Overlay `GATHER_*` environment variables onto this configuration
    pub fn apply_env(&mut self) {
        let api = &mut self.api;
        if let Some(v) = env_string("GATHER_BASE_URL") {
            api.base_url = v;
        }
        if let Some(v) = env_string("GATHER_LISTING_PATH") {
            api.listing_path = v;
        }
        if let Some(v) = env_string("GATHER_API_KEY") {
            api.api_key = v;
        }
        if let Some(v) = env_string("GATHER_APPLICATION_KEY") {
            api.application_key = v;
        }
        if let Some(v) = env_string("GATHER_USER_AGENT") {
            api.user_agent = v;
        }
        if let Some(v) = env_parse("GATHER_REQUEST_TIMEOUT") {
            api.request_timeout_secs = v;
        }

        let collection = &mut self.collection;
        if let Some(v) = env_parse("GATHER_PAGE_SIZE") {
            collection.page_size = v;
        }
        if let Some(v) = env_parse("GATHER_BLOCK_SIZE") {
            collection.block_size = v;
        }
        if let Some(v) = env_parse("GATHER_CONCURRENCY") {
            collection.concurrency = v;
        }
        if let Some(v) = env_parse("GATHER_MAX_ATTEMPTS") {
            collection.max_attempts = v;
        }
        if let Some(v) = env_parse("GATHER_BACKOFF_BASE_MS") {
            collection.backoff_base_ms = v;
        }
        if let Some(v) = env_parse("GATHER_MAX_ROUNDS") {
            collection.max_rounds = v;
        }

        if let Some(v) = env_string("GATHER_CHECKPOINT_DIR") {
            self.checkpoint.dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse("GATHER_RESUME") {
            self.checkpoint.resume = v;
        }

        if let Some(v) = env_string("GATHER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env_string("GATHER_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;

        if self.api.listing_path.trim().is_empty() {
            anyhow::bail!("listing_path must not be empty");
        }

        if self.api.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        let c = &self.collection;
        if c.page_size == 0 {
            anyhow::bail!("page_size must be greater than 0");
        }
        if c.block_size == 0 {
            anyhow::bail!("block_size must be greater than 0");
        }
        if c.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than 0");
        }
        if c.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }
        if c.schema.id_field.is_empty() || c.schema.reference_field.is_empty() {
            anyhow::bail!("schema field names must not be empty");
        }

        if self.checkpoint.prefix.is_empty() {
            anyhow::bail!("checkpoint prefix must not be empty");
        }

        Ok(())
    }

    /// Parsed API base URL
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid base_url: {}", self.api.base_url))
    }

    /// Absolute listing endpoint URL
    pub fn listing_url(&self) -> Result<Url> {
        let base = self.base_url()?;
        base.join(&self.api.listing_path)
            .with_context(|| format!("Invalid listing_path: {}", self.api.listing_path))
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Per-request retry policy
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_delay(
            self.collection.max_attempts,
            Duration::from_millis(self.collection.backoff_base_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_block_size() {
        let mut config = Config::default();
        config.collection.block_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.api.base_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_listing_url() {
        let mut config = Config::default();
        config.api.base_url = "http://127.0.0.1:8080".into();
        config.api.listing_path = "/v1/cliente".into();
        assert_eq!(
            config.listing_url().unwrap().as_str(),
            "http://127.0.0.1:8080/v1/cliente"
        );
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [collection]
            block_size = 100

            [checkpoint]
            resume = true
            "#,
        )
        .unwrap();

        assert_eq!(config.collection.block_size, 100);
        assert_eq!(config.collection.page_size, 20);
        assert!(config.checkpoint.resume);
        assert_eq!(config.collection.schema.id_field, "numero");
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("GATHER_CONCURRENCY", "4");
        std::env::set_var("GATHER_API_KEY", "key-123");
        let config = Config::from_env().unwrap();
        std::env::remove_var("GATHER_CONCURRENCY");
        std::env::remove_var("GATHER_API_KEY");

        assert_eq!(config.collection.concurrency, 4);
        assert_eq!(config.api.api_key, "key-123");
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        std::env::set_var("GATHER_PAGE_SIZE", "lots");
        let config = Config::from_env().unwrap();
        std::env::remove_var("GATHER_PAGE_SIZE");

        assert_eq!(config.collection.page_size, 20);
    }
}
