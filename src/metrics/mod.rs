//! Prometheus metrics for the collection engine
//!
//! This module tracks listing pages, detail requests, reconciliation rounds
//! and the residual missing set.
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! Until then, and if initialization fails, metric operations are no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, register_int_counter_vec,
    CounterVec, Encoder, Gauge, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Container for all engine metrics
struct EngineMetrics {
    pages_requested: IntCounter,
    pagination_faults: IntCounter,
    detail_requests: IntCounterVec,
    detail_outcomes: IntCounterVec,
    rounds: IntCounter,
    missing_records: Gauge,
    backoff_seconds: CounterVec,
}

static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = EngineMetrics {
        pages_requested: register_int_counter!(
            "gather_listing_pages_requested_total",
            "Listing pages requested"
        )?,
        pagination_faults: register_int_counter!(
            "gather_listing_faults_total",
            "Listing collections ended early by a pagination fault"
        )?,
        detail_requests: register_int_counter_vec!(
            "gather_detail_requests_total",
            "Detail HTTP requests issued, by result",
            &["result"]
        )?,
        detail_outcomes: register_int_counter_vec!(
            "gather_detail_outcomes_total",
            "Per-id detail fetch outcomes after retries, by phase and status",
            &["phase", "status"]
        )?,
        rounds: register_int_counter!(
            "gather_reconciliation_rounds_total",
            "Reconciliation rounds executed"
        )?,
        missing_records: register_gauge!(
            "gather_missing_records",
            "Requested ids not yet obtained"
        )?,
        backoff_seconds: register_counter_vec!(
            "gather_backoff_seconds_total",
            "Time spent waiting in backoff, by level",
            &["level"]
        )?,
    };

    ENGINE_METRICS.set(metrics).ok();
    Ok(())
}

pub fn record_page_requested() {
    if let Some(m) = ENGINE_METRICS.get() {
        m.pages_requested.inc();
    }
}

pub fn record_pagination_fault() {
    if let Some(m) = ENGINE_METRICS.get() {
        m.pagination_faults.inc();
    }
}

/// Record one detail HTTP request (`ok` or `error`)
pub fn record_detail_request(success: bool) {
    if let Some(m) = ENGINE_METRICS.get() {
        let label = if success { "ok" } else { "error" };
        m.detail_requests.with_label_values(&[label]).inc();
    }
}

/// Record per-id outcomes of one fetch call
pub fn record_fetch_outcomes(phase: &str, succeeded: usize, failed: usize) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.detail_outcomes
            .with_label_values(&[phase, "success"])
            .inc_by(succeeded as u64);
        m.detail_outcomes
            .with_label_values(&[phase, "failure"])
            .inc_by(failed as u64);
    }
}

pub fn record_round() {
    if let Some(m) = ENGINE_METRICS.get() {
        m.rounds.inc();
    }
}

pub fn set_missing(count: usize) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.missing_records.set(count as f64);
    }
}

/// Record time spent in backoff (`request` or `round`)
pub fn record_backoff(level: &str, seconds: f64) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.backoff_seconds.with_label_values(&[level]).inc_by(seconds);
    }
}

/// Encode all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_roundtrip() {
        init_metrics().unwrap();
        // Second call is a no-op
        init_metrics().unwrap();

        record_page_requested();
        record_detail_request(true);
        record_detail_request(false);
        record_fetch_outcomes("blocks", 3, 1);
        record_round();
        set_missing(2);
        record_backoff("round", 0.5);

        let text = gather_metrics();
        assert!(text.contains("gather_listing_pages_requested_total"));
        assert!(text.contains("gather_detail_requests_total"));
        assert!(text.contains("gather_missing_records 2"));
    }
}
