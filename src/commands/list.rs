use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use gather::crawler::list::PageCollector;
use gather::crawler::ClientSettings;
use gather::storage::export::write_json;

use super::load_config;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listing endpoint, relative to the base URL or absolute
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Items per listing page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Output file for the raw objects
    #[arg(short, long)]
    pub output: PathBuf,
}

pub async fn list(args: ListArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(endpoint) = &args.endpoint {
        config.api.listing_path = endpoint.clone();
    }
    if let Some(page_size) = args.page_size {
        config.collection.page_size = page_size;
    }
    config.validate().context("Invalid configuration")?;

    let endpoint = config.listing_url()?;
    let client = ClientSettings::from_config(&config)
        .build_client()
        .context("Failed to build HTTP client")?;
    let collector = PageCollector::new(client, config.collection.schema.clone());

    let collection = collector
        .collect_objects(&endpoint, config.collection.page_size)
        .await;

    write_json(&args.output, &collection.objects)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "Listed {} objects in {} pages -> {}",
        collection.objects.len(),
        collection.pages_requested,
        args.output.display()
    );
    if let Some(fault) = &collection.fault {
        println!("Listing ended early: {fault}");
    }

    Ok(())
}
