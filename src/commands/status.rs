use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use gather::storage::CheckpointWriter;

use super::load_config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Checkpoint directory
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Checkpoint file prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

pub fn status(args: StatusArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.checkpoint_dir {
        config.checkpoint.dir = dir;
    }
    if let Some(prefix) = args.prefix {
        config.checkpoint.prefix = prefix;
    }

    let writer = CheckpointWriter::new(
        config.checkpoint.dir.clone(),
        config.checkpoint.prefix.as_str(),
        config.collection.schema.clone(),
    )
    .context("Failed to open checkpoint directory")?;

    let blocks = writer.list_blocks()?;

    println!("Checkpoints in {}", writer.dir().display());
    println!("========================");

    if blocks.is_empty() {
        println!("  (none)");
        return Ok(());
    }

    let mut stored = 0;
    for index in &blocks {
        match writer.load(*index) {
            Ok(Some(details)) => {
                stored += details.len();
                println!("  {}  {:>6} records", writer.key(*index), details.len());
            }
            Ok(None) => {}
            Err(e) => println!("  {}  unreadable: {e}", writer.key(*index)),
        }
    }

    let unique = writer.load_all().map(|all| all.len()).unwrap_or(stored);

    println!("\n  Blocks:         {}", blocks.len());
    println!("  Stored records: {stored}");
    println!("  Unique ids:     {unique}");

    Ok(())
}
