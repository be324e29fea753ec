//! # groundqa
//!
//! Grounded question answering over a local document corpus.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `groundqa index` | Bring the index up to date with the corpus |
//! | `groundqa search <query>` | Print ranked hits as JSON |
//! | `groundqa ask <question>` | Print a grounded, cited answer as JSON |
//! | `groundqa status` | Print the state of the persisted index |
//! | `groundqa watch` | Keep the index fresh until interrupted |
//!
//! ## Configuration
//!
//! Reads `groundqa.toml` (override with `--config`); a missing file means
//! defaults. `.env` and environment variables override the file, see
//! [`groundqa_cli::config`]. Logs go to stderr and honour `RUST_LOG`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use groundqa_cli::{AppConfig, QaHandler};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "groundqa", version, about = "Grounded question answering over a document corpus")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "./groundqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index if the corpus changed.
    Index,

    /// Retrieve the documents most similar to a query.
    Search {
        /// Query text.
        query: String,

        /// Maximum number of hits.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Answer a question using only retrieved evidence.
    ///
    /// Prints `answer`, `citations` and `retrieved_context`. When the corpus
    /// holds no usable evidence the answer is the fallback message with no
    /// citations.
    Ask {
        /// Question text.
        question: String,

        /// Number of hits to retrieve before grounding.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Show the persisted index without rebuilding it.
    Status,

    /// Refresh the index periodically until Ctrl-C.
    Watch {
        /// Seconds between refreshes.
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let handler = QaHandler::new(&config)?;
    handler.warm_up().await?;

    match cli.command {
        Commands::Index => print_json(&handler.index().await?)?,
        Commands::Search { query, k } => print_json(&handler.search(&query, k).await?)?,
        Commands::Ask { question, k } => print_json(&handler.ask(&question, k).await?)?,
        Commands::Status => print_json(&handler.status())?,
        Commands::Watch { interval } => {
            let cancel = CancellationToken::new();
            let refresh = handler
                .indexing()
                .spawn_refresh_loop(Duration::from_secs(interval.max(1)), cancel.clone());

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            cancel.cancel();
            refresh.await.context("Refresh loop panicked")?;
            print_json(&handler.status())?;
        }
    }

    Ok(())
}
