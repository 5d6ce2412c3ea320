//! Collection and reconciliation loop
//!
//! The reconciler drives one full run against a listing endpoint:
//!
//! ```text
//! ┌────────────────────┐   ┌────────────────┐   ┌──────────────────┐
//! │ CollectingSummary  │──▶│ FetchingBlocks │──▶│ Reconciling(1..N)│──┐
//! └────────────────────┘   └────────────────┘   └──────────────────┘  │
//!                                                   ▲      │          │
//!                                                   └──────┘          ▼
//!                                                           Done | DoneWithGaps
//! ```
//!
//! Each block is fetched and checkpointed before the next one starts. After
//! the block pass, the ids still missing are fetched again as one ad-hoc
//! batch per round, with an escalating delay before every round, until
//! nothing is missing or the round budget is spent.
//!
//! # Example
//!
//! ```no_run
//! use gather::config::Config;
//! use gather::crawler::reconcile::Reconciler;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let reconciler = Reconciler::from_config(&config)?;
//!
//! let report = reconciler.run(&config.listing_url()?).await?;
//! println!("{} records, {} missing", report.details.len(), report.missing.len());
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::crawler::batch::partition;
use crate::crawler::fetcher::DetailFetcher;
use crate::crawler::list::{PageCollection, PageCollector};
use crate::crawler::ClientSettings;
use crate::error::Result;
use crate::metrics;
use crate::models::{Block, CollectionState, DetailRecord, ListingRecord, RecordId};
use crate::storage::checkpoint::CheckpointWriter;

// ============================================================================
// Settings
// ============================================================================

/// Knobs of the reconciliation loop
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub page_size: usize,
    pub block_size: usize,

    /// Rounds allowed after the block pass
    pub max_rounds: u32,

    pub round_delay_base: Duration,
    pub round_delay_step: Duration,

    /// Reuse stored checkpoints instead of refetching their records
    pub resume: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            page_size: 20,
            block_size: 500,
            max_rounds: 5,
            round_delay_base: Duration::from_secs(5),
            round_delay_step: Duration::from_secs(3),
            resume: false,
        }
    }
}

impl ReconcileSettings {
    pub fn from_config(config: &Config) -> Self {
        let c = &config.collection;
        Self {
            page_size: c.page_size,
            block_size: c.block_size,
            max_rounds: c.max_rounds,
            round_delay_base: Duration::from_secs(c.round_delay_base_secs),
            round_delay_step: Duration::from_secs(c.round_delay_step_secs),
            resume: config.checkpoint.resume,
        }
    }

    /// Wait before round `round`: `base + round * step`
    pub fn round_delay(&self, round: u32) -> Duration {
        self.round_delay_base + self.round_delay_step.saturating_mul(round)
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Phases of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CollectingSummary,
    FetchingBlocks,
    Reconciling { round: u32 },
    Done,
    DoneWithGaps,
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every requested id was obtained
    Done,
    /// The round budget ran out with ids still missing
    DoneWithGaps,
}

/// What the listing pass produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub records: usize,
    pub pages_requested: usize,
    pub skipped: usize,
    pub duplicates: usize,

    /// Pagination fault that ended the listing early
    pub fault: Option<String>,
}

impl From<&PageCollection> for SummaryStats {
    fn from(collection: &PageCollection) -> Self {
        Self {
            records: collection.records.len(),
            pages_requested: collection.pages_requested,
            skipped: collection.skipped,
            duplicates: collection.duplicates,
            fault: collection.fault.as_ref().map(ToString::to_string),
        }
    }
}

/// Result of one block in the block pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct BlockReport {
    pub index: usize,
    pub size: usize,

    /// Records taken from an existing checkpoint
    pub resumed: usize,
    pub fetched: usize,
    pub failed: usize,
    pub requests: u32,
    pub checkpointed: bool,
}

/// Result of one reconciliation round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub round: u32,

    /// Ids re-driven in this round
    pub attempted: usize,
    pub recovered: usize,
    pub still_missing: usize,
    pub requests: u32,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub run_id: Uuid,
    pub endpoint: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub summary: SummaryStats,
    pub blocks: Vec<BlockReport>,
    pub rounds: Vec<RoundReport>,

    /// Requested ids never obtained, sorted
    pub missing: Vec<RecordId>,

    /// Number of records in `details`
    pub obtained: usize,
    pub checkpoint_failures: usize,

    /// Records taken from checkpoints instead of the network
    pub resumed: usize,

    /// Merged details in listing order
    #[serde(skip)]
    pub details: Vec<DetailRecord>,
}

impl CollectionReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == Outcome::Done
    }

    pub fn total_requests(&self) -> u32 {
        self.blocks.iter().map(|b| b.requests).sum::<u32>()
            + self.rounds.iter().map(|r| r.requests).sum::<u32>()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Mutable state of one run, owned by the reconciler
struct Run {
    summary: PageCollection,
    blocks: Vec<Block>,
    block_of: HashMap<RecordId, usize>,
    state: CollectionState,
    block_reports: Vec<BlockReport>,
    rounds: Vec<RoundReport>,
    checkpoint_failures: usize,
    resumed: usize,
}

impl Run {
    fn new() -> Self {
        Self {
            summary: PageCollection::default(),
            blocks: Vec::new(),
            block_of: HashMap::new(),
            state: CollectionState::default(),
            block_reports: Vec::new(),
            rounds: Vec::new(),
            checkpoint_failures: 0,
            resumed: 0,
        }
    }

    /// Obtained details of one block, in block order
    fn block_details(&self, block: &Block) -> Vec<DetailRecord> {
        self.state.ordered_details(&block.records)
    }
}

/// Drives listing, block fetching and reconciliation for one endpoint
pub struct Reconciler {
    collector: PageCollector,
    fetcher: DetailFetcher,
    checkpoints: CheckpointWriter,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        collector: PageCollector,
        fetcher: DetailFetcher,
        checkpoints: CheckpointWriter,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            collector,
            fetcher,
            checkpoints,
            settings,
        }
    }

    /// Build every component from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let client_settings = ClientSettings::from_config(config);
        let schema = config.collection.schema.clone();

        let collector = PageCollector::new(client_settings.build_client()?, schema.clone());
        let fetcher = DetailFetcher::new(
            client_settings,
            config.base_url()?,
            schema.clone(),
            config.collection.concurrency,
            config.retry_policy(),
        );
        let checkpoints = CheckpointWriter::new(
            config.checkpoint.dir.clone(),
            config.checkpoint.prefix.as_str(),
            schema,
        )?;

        Ok(Self::new(
            collector,
            fetcher,
            checkpoints,
            ReconcileSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn checkpoints(&self) -> &CheckpointWriter {
        &self.checkpoints
    }

    /// Run the whole collection against `endpoint`
    ///
    /// Network failures never fail the run; they surface as missing ids in
    /// the report. `Err` is returned only when the HTTP client cannot be
    /// built.
    pub async fn run(&self, endpoint: &Url) -> Result<CollectionReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut run = Run::new();
        let mut phase = Phase::CollectingSummary;

        tracing::info!(%run_id, endpoint = %endpoint, "Starting collection run");

        loop {
            tracing::debug!(?phase, "Entering phase");
            phase = match phase {
                Phase::CollectingSummary => self.collect_summary(&mut run, endpoint).await,
                Phase::FetchingBlocks => self.fetch_blocks(&mut run).await?,
                Phase::Reconciling { round } => self.reconcile_round(&mut run, round).await?,
                Phase::Done | Phase::DoneWithGaps => break,
            };
        }

        let outcome = if phase == Phase::Done {
            Outcome::Done
        } else {
            Outcome::DoneWithGaps
        };

        let details = run.state.ordered_details(&run.summary.records);
        let missing: Vec<RecordId> = run.state.missing().into_iter().collect();

        tracing::info!(
            %run_id,
            ?outcome,
            obtained = details.len(),
            missing = missing.len(),
            rounds = run.rounds.len(),
            "Collection run finished"
        );

        Ok(CollectionReport {
            run_id,
            endpoint: endpoint.to_string(),
            started_at,
            finished_at: Utc::now(),
            outcome,
            summary: SummaryStats::from(&run.summary),
            blocks: run.block_reports,
            rounds: run.rounds,
            missing,
            obtained: details.len(),
            checkpoint_failures: run.checkpoint_failures,
            resumed: run.resumed,
            details,
        })
    }

    async fn collect_summary(&self, run: &mut Run, endpoint: &Url) -> Phase {
        run.summary = self.collector.collect(endpoint, self.settings.page_size).await;
        run.state = CollectionState::new(run.summary.records.iter().map(|r| &r.id));

        if let Some(fault) = &run.summary.fault {
            tracing::warn!(
                records = run.summary.records.len(),
                error = %fault,
                "Continuing with a partial summary"
            );
        }

        Phase::FetchingBlocks
    }

    async fn fetch_blocks(&self, run: &mut Run) -> Result<Phase> {
        run.blocks = partition(&run.summary.records, self.settings.block_size);
        run.block_of = run
            .blocks
            .iter()
            .flat_map(|b| b.ids().map(move |id| (id.clone(), b.index)))
            .collect();

        tracing::info!(
            blocks = run.blocks.len(),
            records = run.summary.records.len(),
            block_size = self.settings.block_size,
            "Fetching blocks"
        );

        for i in 0..run.blocks.len() {
            let block = run.blocks[i].clone();
            let report = self.fetch_block(run, &block).await?;

            tracing::info!(
                block = report.index,
                size = report.size,
                resumed = report.resumed,
                fetched = report.fetched,
                failed = report.failed,
                "Block finished"
            );
            run.block_reports.push(report);
        }

        Ok(Phase::Reconciling { round: 1 })
    }

    async fn fetch_block(&self, run: &mut Run, block: &Block) -> Result<BlockReport> {
        let mut report = BlockReport {
            index: block.index,
            size: block.len(),
            ..Default::default()
        };

        if self.settings.resume {
            report.resumed = self.resume_block(run, block);
            run.resumed += report.resumed;
        }

        let remaining: Vec<ListingRecord> = block
            .records
            .iter()
            .filter(|r| !run.state.obtained.contains_key(&r.id))
            .cloned()
            .collect();

        if remaining.is_empty() && report.resumed > 0 {
            tracing::debug!(block = block.index, "Block fully restored from checkpoint");
            return Ok(report);
        }

        let fetch = self.fetcher.fetch_records(&remaining).await?;
        metrics::record_fetch_outcomes("blocks", fetch.details.len(), fetch.failed.len());

        report.fetched = fetch.details.len();
        report.failed = fetch.failed.len();
        report.requests = fetch.requests;
        run.state.merge(fetch.details);

        report.checkpointed = self.persist_block(run, block);
        Ok(report)
    }

    /// Merge a block's stored details; returns how many were taken
    fn resume_block(&self, run: &mut Run, block: &Block) -> usize {
        let stored = match self.checkpoints.load(block.index) {
            Ok(Some(stored)) => stored,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(block = block.index, error = %e, "Ignoring unreadable checkpoint");
                return 0;
            }
        };

        let members: BTreeSet<&RecordId> = block.ids().collect();
        let total = stored.len();
        let in_block: Vec<DetailRecord> = stored
            .into_iter()
            .filter(|d| members.contains(&d.id))
            .collect();

        if in_block.len() < total {
            tracing::debug!(
                block = block.index,
                ignored = total - in_block.len(),
                "Checkpoint records outside the block ignored"
            );
        }

        run.state.merge(in_block).inserted
    }

    /// Write the block's obtained details; failures are counted, not raised
    fn persist_block(&self, run: &mut Run, block: &Block) -> bool {
        let details = run.block_details(block);
        match self.checkpoints.persist(block.index, &details) {
            Ok(_) => true,
            Err(e) => {
                run.checkpoint_failures += 1;
                tracing::error!(block = block.index, error = %e, "Checkpoint write failed");
                false
            }
        }
    }

    async fn reconcile_round(&self, run: &mut Run, round: u32) -> Result<Phase> {
        let missing = run.state.missing();
        metrics::set_missing(missing.len());

        if missing.is_empty() {
            tracing::info!(rounds = round - 1, "All requested records obtained");
            return Ok(Phase::Done);
        }

        if round > self.settings.max_rounds {
            let sample: Vec<&str> = missing.iter().take(10).map(RecordId::as_str).collect();
            tracing::warn!(
                missing = missing.len(),
                max_rounds = self.settings.max_rounds,
                sample = ?sample,
                "Round budget exhausted, finishing with gaps"
            );
            return Ok(Phase::DoneWithGaps);
        }

        let delay = self.settings.round_delay(round);
        tracing::info!(
            round,
            missing = missing.len(),
            delay_secs = delay.as_secs_f64(),
            "Starting reconciliation round"
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            metrics::record_backoff("round", delay.as_secs_f64());
        }

        run.state.round = round;
        metrics::record_round();

        // Listing order keeps retried requests and logs stable across runs
        let records: Vec<ListingRecord> = run
            .summary
            .records
            .iter()
            .filter(|r| missing.contains(&r.id))
            .cloned()
            .collect();

        let fetch = self.fetcher.fetch_records(&records).await?;
        metrics::record_fetch_outcomes("round", fetch.details.len(), fetch.failed.len());

        let touched: BTreeSet<usize> = fetch
            .details
            .iter()
            .filter_map(|d| run.block_of.get(&d.id).copied())
            .collect();

        let stats = run.state.merge(fetch.details);

        for index in touched {
            let block = run.blocks[index].clone();
            self.persist_block(run, &block);
        }

        let still_missing = run.state.missing().len();
        tracing::info!(
            round,
            attempted = records.len(),
            recovered = stats.inserted,
            still_missing,
            requests = fetch.requests,
            "Reconciliation round finished"
        );

        run.rounds.push(RoundReport {
            round,
            attempted: records.len(),
            recovered: stats.inserted,
            still_missing,
            requests: fetch.requests,
        });

        Ok(Phase::Reconciling { round: round + 1 })
    }
}
