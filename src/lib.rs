//! gather - Resilient listing/detail harvester
//!
//! Collects every record behind a paginated listing API and assembles a
//! consistent offline dataset despite partial network failures.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Listing pagination, block planning, detail fetching and reconciliation
//! - [`models`] - Core data structures and collection state
//! - [`storage`] - Block checkpoints and dataset export
//! - [`metrics`] - Prometheus counters for the engine
//! - [`error`] - Unified error handling
//! - [`utils`] - Retry and URL helpers
//!
//! # Example
//!
//! ```no_run
//! use gather::config::Config;
//! use gather::crawler::reconcile::Reconciler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let reconciler = Reconciler::from_config(&config)?;
//!     let report = reconciler.run(&config.listing_url()?).await?;
//!     println!("obtained {} records", report.obtained);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::fetcher::{BlockFetch, DetailFetcher};
    pub use crate::crawler::list::{PageCollection, PageCollector};
    pub use crate::crawler::reconcile::{CollectionReport, Outcome, Reconciler};
    pub use crate::error::{Error, ErrorCategory, GatherErrorTrait, Result};
    pub use crate::models::{Block, CollectionState, DetailRecord, ListingRecord, RecordId};
    pub use crate::storage::{CheckpointWriter, DatasetWriter};
}

// Direct re-exports for convenience
pub use models::{DetailRecord, ListingRecord, RecordId};
