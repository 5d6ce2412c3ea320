use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use gather::config::Config;
use gather::crawler::reconcile::{CollectionReport, Outcome, Reconciler};
use gather::metrics;
use gather::storage::DatasetWriter;

use super::load_config;

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listing endpoint, relative to the base URL or absolute
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// API base URL detail references are resolved against
    #[arg(long)]
    pub base_url: Option<String>,

    /// Items per listing page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Listing records per detail block
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Simultaneous in-flight detail requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Attempts per detail request
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Reconciliation rounds after the block pass
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Checkpoint directory
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Dataset output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Run report output file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Reuse stored block checkpoints
    #[arg(long, conflicts_with = "fresh")]
    pub resume: bool,

    /// Delete stored block checkpoints before starting
    #[arg(long)]
    pub fresh: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

impl CollectArgs {
    /// Apply command-line overrides on top of file and environment values
    fn apply(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.api.listing_path = endpoint.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.api.base_url = base_url.clone();
        }

        let c = &mut config.collection;
        if let Some(v) = self.page_size {
            c.page_size = v;
        }
        if let Some(v) = self.block_size {
            c.block_size = v;
        }
        if let Some(v) = self.concurrency {
            c.concurrency = v;
        }
        if let Some(v) = self.max_attempts {
            c.max_attempts = v;
        }
        if let Some(v) = self.max_rounds {
            c.max_rounds = v;
        }

        if let Some(dir) = &self.checkpoint_dir {
            config.checkpoint.dir = dir.clone();
        }
        if self.resume {
            config.checkpoint.resume = true;
        }
        if self.fresh {
            config.checkpoint.resume = false;
        }

        if let Some(path) = &self.output {
            config.output.dataset_path = path.clone();
        }
        if let Some(path) = &self.report {
            config.output.report_path = path.clone();
        }
    }
}

pub async fn collect(args: CollectArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if args.metrics {
        metrics::init_metrics().map_err(|e| anyhow::anyhow!("Failed to register metrics: {e}"))?;
    }

    let reconciler = Reconciler::from_config(&config).context("Failed to set up collection")?;

    if args.fresh {
        let removed = reconciler
            .checkpoints()
            .clear()
            .context("Failed to clear checkpoints")?;
        tracing::info!(removed, dir = %config.checkpoint.dir.display(), "Cleared checkpoints");
    }

    let endpoint = config.listing_url()?;

    println!("Collecting {endpoint}");
    println!("========================");

    let report = reconciler.run(&endpoint).await?;

    let writer = DatasetWriter::from_config(&config.output);
    writer
        .write_dataset(&report.details)
        .context("Failed to write dataset")?;
    writer
        .write_report(&report)
        .context("Failed to write report")?;

    print_summary(&report, &writer);

    if args.metrics {
        println!();
        print!("{}", metrics::gather_metrics());
    }

    Ok(())
}

fn print_summary(report: &CollectionReport, writer: &DatasetWriter) {
    println!("\nCollection Summary");
    println!("==================");
    println!("  Listed:        {}", report.summary.records);
    if report.summary.skipped > 0 || report.summary.duplicates > 0 {
        println!(
            "  Skipped:       {} (duplicates: {})",
            report.summary.skipped, report.summary.duplicates
        );
    }
    if let Some(fault) = &report.summary.fault {
        println!("  Listing ended early: {fault}");
    }
    println!("  Blocks:        {}", report.blocks.len());
    println!("  Rounds:        {}", report.rounds.len());
    println!("  Requests:      {}", report.total_requests());
    println!("  Obtained:      {}", report.obtained);
    if report.resumed > 0 {
        println!("  From checkpoints: {}", report.resumed);
    }
    if report.checkpoint_failures > 0 {
        println!("  Checkpoint failures: {}", report.checkpoint_failures);
    }

    match report.outcome {
        Outcome::Done => println!("  Outcome:       complete"),
        Outcome::DoneWithGaps => {
            println!("  Outcome:       {} records still missing", report.missing.len());
            let sample: Vec<&str> = report.missing.iter().take(20).map(|id| id.as_str()).collect();
            println!("  Missing ids:   {}", sample.join(", "));
        }
    }

    println!("\n  Dataset: {}", writer.dataset_path().display());
    println!("  Report:  {}", writer.report_path().display());
}
