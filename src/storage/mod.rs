//! Durable storage for collected records
//!
//! - [`checkpoint`] - per-block checkpoint files used to resume a run
//! - [`export`] - the merged dataset and run report handed downstream

pub mod checkpoint;
pub mod export;

pub use checkpoint::CheckpointWriter;
pub use export::DatasetWriter;
