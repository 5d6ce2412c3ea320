use anyhow::Result;
use clap::{Parser, Subcommand};
use gather::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{CollectArgs, ListArgs, StatusArgs};

#[derive(Parser)]
#[command(
    name = "gather",
    version,
    about = "Resilient harvester for paginated listing/detail APIs",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to GATHER_LOG_FORMAT or text
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect every record behind a listing endpoint
    Collect(CollectArgs),

    /// Collect listing pages only and write the raw objects
    List(ListArgs),

    /// Inspect stored block checkpoints
    Status(StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = Config::from_env()?.logging;
    let format = cli.log_format.as_deref().unwrap_or(&logging.format);
    setup_tracing(format, &logging.level, cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gather starting");

    match cli.command {
        Commands::Collect(args) => {
            tracing::info!(
                endpoint = ?args.endpoint,
                resume = args.resume,
                fresh = args.fresh,
                "Starting collect command"
            );
            commands::collect(args).await?;
        }

        Commands::List(args) => {
            tracing::info!(
                endpoint = ?args.endpoint,
                output = %args.output.display(),
                "Starting list command"
            );
            commands::list(args).await?;
        }

        Commands::Status(args) => {
            commands::status(args)?;
        }
    }

    tracing::info!("gather completed");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("gather=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("gather={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
