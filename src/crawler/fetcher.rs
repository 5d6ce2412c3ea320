//! Bounded-concurrency detail fetcher
//!
//! This module fetches one full record per listing record with:
//! - A fixed pool of workers pulling ids from a shared queue
//! - Per-request retry with linear backoff
//! - One HTTP client per call, shared by that call's workers
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────┐
//!            ┌───▶│ worker 0 │───┐
//! ┌───────┐  │    └──────────┘   │    ┌─────────────┐
//! │  job  │──┼───▶   ...      ───┼───▶│ result sink │──▶ BlockFetch
//! │ queue │  │    ┌──────────┐   │    └─────────────┘
//! └───────┘  └───▶│ worker N │───┘
//!                 └──────────┘
//! ```
//!
//! Workers never share mutable state: each one sends its `FetchOutcome` to
//! the result channel and the caller assembles them by position once the
//! queue is drained and every worker has been joined.

use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use url::Url;

use crate::crawler::ClientSettings;
use crate::metrics;
use crate::models::{
    Block, DetailRecord, FetchOutcome, FetchStatus, ListingRecord, RecordId, RecordSchema,
};
use crate::utils::error::FetchError;
use crate::utils::{resolve_reference, truncate_text};
use crate::utils::retry::{with_retry, RetryPolicy};

/// An id whose retry budget ran out during one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFetch {
    pub id: RecordId,
    pub attempts: u32,
    pub error: String,
}

/// Result of one fetch call, in the order of the input records
#[derive(Debug, Clone, Default)]
pub struct BlockFetch {
    pub details: Vec<DetailRecord>,
    pub failed: Vec<FailedFetch>,

    /// HTTP requests issued across all ids
    pub requests: u32,
}

impl BlockFetch {
    pub fn failed_ids(&self) -> Vec<RecordId> {
        self.failed.iter().map(|f| f.id.clone()).collect()
    }

    fn from_outcomes(outcomes: Vec<FetchOutcome>) -> Self {
        let mut fetch = Self::default();
        for outcome in outcomes {
            fetch.requests += outcome.attempts;
            match outcome.status {
                FetchStatus::Success(detail) => fetch.details.push(detail),
                FetchStatus::Failure(error) => fetch.failed.push(FailedFetch {
                    id: outcome.id,
                    attempts: outcome.attempts,
                    error,
                }),
            }
        }
        fetch
    }
}

/// Fetches detail records with a fixed number of concurrent workers
#[derive(Debug, Clone)]
pub struct DetailFetcher {
    settings: ClientSettings,
    base_url: Url,
    schema: RecordSchema,
    concurrency: usize,
    retry: RetryPolicy,
}

impl DetailFetcher {
    /// Create a fetcher
    ///
    /// # Arguments
    ///
    /// * `settings` - Client settings used to build one client per call
    /// * `base_url` - Base URL detail references are resolved against
    /// * `schema` - Field names; a detail must carry the id it was requested for
    /// * `concurrency` - Maximum simultaneous in-flight requests
    /// * `retry` - Per-request attempt budget and backoff
    pub fn new(
        settings: ClientSettings,
        base_url: Url,
        schema: RecordSchema,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            settings,
            base_url,
            schema,
            concurrency: concurrency.max(1),
            retry,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch every record of a planned block
    pub async fn fetch_block(&self, block: &Block) -> Result<BlockFetch, FetchError> {
        tracing::debug!(block = block.index, size = block.len(), "Fetching block");
        self.fetch_records(&block.records).await
    }

    /// Fetch an arbitrary set of records as one call
    ///
    /// Returns `Err` only when the HTTP client cannot be built. Per-id
    /// failures are reported in [`BlockFetch::failed`].
    pub async fn fetch_records(&self, records: &[ListingRecord]) -> Result<BlockFetch, FetchError> {
        if records.is_empty() {
            return Ok(BlockFetch::default());
        }

        // Scoped to this call; dropped with the last worker
        let client = self.settings.build_client()?;

        let capacity = records.len();
        let (job_tx, job_rx) = mpsc::channel::<(usize, ListingRecord)>(capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, FetchOutcome)>(capacity);

        for (position, record) in records.iter().cloned().enumerate() {
            if job_tx.send((position, record)).await.is_err() {
                tracing::error!("Job queue closed before dispatch");
                break;
            }
        }
        drop(job_tx);

        let workers = self.concurrency.min(records.len());
        let handles = self.spawn_workers(workers, client, job_rx, result_tx);

        for (worker_id, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                tracing::error!(worker_id, error = %e, "Fetch worker panicked");
            }
        }

        let mut slots: Vec<Option<FetchOutcome>> = vec![None; records.len()];
        while let Some((position, outcome)) = result_rx.recv().await {
            slots[position] = Some(outcome);
        }

        // A panicked worker leaves its job without an outcome
        let outcomes = slots
            .into_iter()
            .zip(records)
            .map(|(slot, record)| {
                slot.unwrap_or_else(|| FetchOutcome {
                    id: record.id.clone(),
                    status: FetchStatus::Failure("worker aborted".to_string()),
                    attempts: 0,
                })
            })
            .collect();

        let fetch = BlockFetch::from_outcomes(outcomes);
        tracing::debug!(
            fetched = fetch.details.len(),
            failed = fetch.failed.len(),
            requests = fetch.requests,
            workers,
            "Fetch call finished"
        );
        Ok(fetch)
    }

    /// Spawn fetcher worker tasks
    fn spawn_workers(
        &self,
        workers: usize,
        client: Client,
        job_rx: mpsc::Receiver<(usize, ListingRecord)>,
        result_tx: mpsc::Sender<(usize, FetchOutcome)>,
    ) -> Vec<JoinHandle<()>> {
        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let client = client.clone();
            let base_url = self.base_url.clone();
            let schema = self.schema.clone();
            let retry = self.retry.clone();

            let handle = tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };

                    let Some((position, record)) = job else {
                        break;
                    };

                    let outcome = fetch_record(&client, &base_url, &schema, &record, &retry).await;
                    if result_tx.send((position, outcome)).await.is_err() {
                        tracing::error!(worker_id, "Result channel closed");
                        break;
                    }
                }

                tracing::trace!(worker_id, "Fetch worker shutting down");
            });

            handles.push(handle);
        }

        handles
    }
}

/// Run the full retry sequence for one record
async fn fetch_record(
    client: &Client,
    base_url: &Url,
    schema: &RecordSchema,
    record: &ListingRecord,
    retry: &RetryPolicy,
) -> FetchOutcome {
    let url = match resolve_reference(base_url, &record.detail_reference) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(id = %record.id, reference = %record.detail_reference, error = %e, "Unusable detail reference");
            return FetchOutcome {
                id: record.id.clone(),
                status: FetchStatus::Failure(e.to_string()),
                attempts: 0,
            };
        }
    };

    let attempted = with_retry(
        retry,
        |attempt| request_detail(client, &url, schema, &record.id, attempt),
        FetchError::is_retryable,
    )
    .await;

    if attempted.attempts > 1 {
        let waited: Duration = (1..attempted.attempts).map(|n| retry.delay_after(n)).sum();
        metrics::record_backoff("request", waited.as_secs_f64());
    }

    let status = match attempted.result {
        Ok(payload) => FetchStatus::Success(DetailRecord::new(record.id.clone(), payload)),
        Err(e) => {
            tracing::warn!(
                id = %record.id,
                url = %url,
                attempts = attempted.attempts,
                error = %e,
                "Detail fetch failed for this call"
            );
            FetchStatus::Failure(truncate_text(&e.to_string(), 200))
        }
    };

    FetchOutcome {
        id: record.id.clone(),
        status,
        attempts: attempted.attempts,
    }
}

/// Issue one detail request
async fn request_detail(
    client: &Client,
    url: &Url,
    schema: &RecordSchema,
    expected: &RecordId,
    attempt: u32,
) -> Result<Value, FetchError> {
    let result = async {
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(FetchError::from_transport)?;
        let payload = parse_detail(&bytes)?;
        check_detail_id(&payload, schema, expected)?;
        Ok(payload)
    }
    .await;

    metrics::record_detail_request(result.is_ok());
    tracing::trace!(url = %url, attempt, ok = result.is_ok(), "Detail request");
    result
}

/// Decode a detail body; only a non-empty JSON object counts as a record
fn parse_detail(bytes: &[u8]) -> Result<Value, FetchError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;

    match &value {
        Value::Object(map) if !map.is_empty() => Ok(value),
        Value::Object(_) => Err(FetchError::Decode("empty detail object".to_string())),
        _ => Err(FetchError::Decode("detail body is not a JSON object".to_string())),
    }
}

/// A detail is only usable if it names the id it was requested for
///
/// Stored blocks are keyed by the id inside each payload, so a detail that
/// lacks it or carries another one could not be restored.
fn check_detail_id(
    payload: &Value,
    schema: &RecordSchema,
    expected: &RecordId,
) -> Result<(), FetchError> {
    match schema.id_of(payload) {
        Some(id) if &id == expected => Ok(()),
        Some(id) => Err(FetchError::Decode(format!("detail {expected} returned id {id}"))),
        None => Err(FetchError::Decode(format!(
            "detail {} has no `{}` field",
            expected, schema.id_field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fetcher(concurrency: usize) -> DetailFetcher {
        DetailFetcher::new(
            ClientSettings::default(),
            Url::parse("http://127.0.0.1:9").unwrap(),
            RecordSchema::default(),
            concurrency,
            RetryPolicy::with_delay(1, Duration::from_millis(1)),
        )
    }

    #[test]
    fn test_parse_detail() {
        assert!(parse_detail(br#"{"numero": 1}"#).is_ok());
        assert!(matches!(parse_detail(b"{}"), Err(FetchError::Decode(_))));
        assert!(matches!(parse_detail(b"[1,2]"), Err(FetchError::Decode(_))));
        assert!(matches!(parse_detail(b"<html>"), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_detail_must_carry_requested_id() {
        let schema = RecordSchema::default();
        let expected = RecordId::from(5u64);

        assert!(check_detail_id(&json!({"numero": 5}), &schema, &expected).is_ok());
        assert!(check_detail_id(&json!({"numero": "5"}), &schema, &expected).is_ok());

        let other = check_detail_id(&json!({"numero": 6}), &schema, &expected);
        assert!(matches!(other, Err(FetchError::Decode(_))));

        let unkeyed = check_detail_id(&json!({"id": 5, "valor_total": "1.00"}), &schema, &expected);
        assert!(matches!(unkeyed, Err(FetchError::Decode(msg)) if msg.contains("numero")));
    }

    #[test]
    fn test_concurrency_floor() {
        assert_eq!(fetcher(0).concurrency(), 1);
        assert_eq!(fetcher(8).concurrency(), 8);
    }

    #[test]
    fn test_block_fetch_from_outcomes() {
        let outcomes = vec![
            FetchOutcome {
                id: "1".into(),
                status: FetchStatus::Success(DetailRecord::new("1".into(), json!({"numero": 1}))),
                attempts: 2,
            },
            FetchOutcome {
                id: "2".into(),
                status: FetchStatus::Failure("Server returned status 500".into()),
                attempts: 3,
            },
        ];

        let fetch = BlockFetch::from_outcomes(outcomes);
        assert_eq!(fetch.details.len(), 1);
        assert_eq!(fetch.failed_ids(), vec![RecordId::from("2")]);
        assert_eq!(fetch.failed[0].attempts, 3);
        assert_eq!(fetch.requests, 5);
    }

    #[tokio::test]
    async fn test_empty_input_issues_nothing() {
        let fetch = fetcher(4).fetch_records(&[]).await.unwrap();
        assert!(fetch.details.is_empty());
        assert!(fetch.failed.is_empty());
        assert_eq!(fetch.requests, 0);
    }

    #[tokio::test]
    async fn test_invalid_reference_fails_without_request() {
        let records = vec![ListingRecord::new("1", "   ")];
        let fetch = fetcher(1).fetch_records(&records).await.unwrap();
        assert_eq!(fetch.failed.len(), 1);
        assert_eq!(fetch.failed[0].attempts, 0);
        assert_eq!(fetch.requests, 0);
    }
}
