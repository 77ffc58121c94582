//! # jobscope CLI
//!
//! ## Usage
//!
//! ```bash
//! jobscope --config ./config/jobscope.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jobscope ingest <path>` | Ingest rows from a file or directory |
//! | `jobscope search "<query>"` | Search postings |
//! | `jobscope get <id>` | Print one record |
//! | `jobscope dedup` | Merge near-duplicate postings |
//! | `jobscope rebuild` | Repair integrity and compact the index |
//! | `jobscope check` | List integrity violations |
//! | `jobscope purge <id>` | Remove one posting |
//! | `jobscope stats` | Show counts and breakdowns |
//! | `jobscope export` | Write records as CSV, JSON or JSONL |
//!
//! Every command loads the saved store first; commands that change it save
//! it again before exiting.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use jobscope::config::{self, Config};
use jobscope::export::{self, ExportFormat};
use jobscope::ingest::CancelToken;
use jobscope::persist::LoadOutcome;
use jobscope::search::{self, SearchMode};
use jobscope::stats;
use jobscope::JobStore;

/// jobscope: semantic search and deduplication for scraped job postings.
#[derive(Parser)]
#[command(
    name = "jobscope",
    version,
    about = "Semantic search and deduplication for scraped job postings"
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults are used when the
    /// default path does not exist.
    #[arg(long, global = true, default_value = "./config/jobscope.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest rows from a CSV, JSON or JSONL file, or a directory of them.
    ///
    /// Ctrl-C stops between rows; everything applied so far is saved.
    Ingest {
        path: PathBuf,
    },

    /// Search postings.
    Search {
        query: String,

        /// `similar`, `title`, `remote`, `country`, or `keywords`.
        #[arg(long, default_value = "similar")]
        mode: String,

        /// Number of results. Defaults to `query.default_k`.
        #[arg(short, long)]
        k: Option<usize>,

        /// Country codes for `--mode country` (comma separated).
        #[arg(long, value_delimiter = ',')]
        countries: Vec<String>,

        /// Require every keyword in `--mode keywords`.
        #[arg(long)]
        all: bool,
    },

    /// Print one record as JSON.
    Get {
        id: String,
    },

    /// Merge near-duplicate postings.
    Dedup {
        /// Override `dedup.similarity_threshold`.
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Repair integrity violations and compact tombstones.
    Rebuild,

    /// List ids present in only one of the index and the record store.
    Check,

    /// Remove one posting.
    Purge {
        id: String,
    },

    /// Show store statistics.
    Stats,

    /// Export records.
    Export {
        /// `csv`, `json`, or `jsonl`.
        #[arg(long, default_value = "json")]
        format: String,

        /// Output file. Writes to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(cli: &Cli) {
    let filter = match cli.verbose {
        0 => "warn,jobscope=info,jobscope_core=info",
        1 => "info,jobscope=debug,jobscope_core=debug",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn read_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new("./config/jobscope.toml") {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    config::load_config(path)
}

async fn open_store(config: Config) -> Result<JobStore> {
    let name = config.store.name.clone();
    let store = JobStore::from_config(config)?;
    match store.load(&name).await? {
        LoadOutcome::Loaded { records, .. } => info!(records, "opened store"),
        LoadOutcome::Empty { reason } => info!(reason = %reason, "starting with an empty store"),
    }
    Ok(store)
}

async fn save(store: &JobStore) -> Result<()> {
    let name = store.config().store.name.clone();
    store
        .save(&name)
        .await
        .with_context(|| format!("Failed to save store '{}'", name))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = read_config(&cli.config)?;
    let default_k = config.query.default_k;
    let store = open_store(config).await?;

    match cli.command {
        Commands::Ingest { path } => {
            let cancel = CancelToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current row");
                    on_signal.cancel();
                }
            });

            let report = store.ingest_path(&path, &cancel).await?;
            save(&store).await?;

            println!("ingest {}", path.display());
            println!("  inserted: {}", report.inserted);
            println!("  updated: {}", report.updated);
            println!("  skipped: {}", report.skipped);
            println!("  failed: {}", report.failed);
            if report.low_confidence > 0 {
                println!("  low confidence: {}", report.low_confidence);
            }
            for failure in &report.failures {
                let source = failure
                    .source
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!("    {}:{} {}", source, failure.row, failure.reason);
            }
            if report.cancelled {
                println!("cancelled");
            } else {
                println!("ok");
            }
        }
        Commands::Search {
            query,
            mode,
            k,
            countries,
            all,
        } => {
            let mode: SearchMode = mode.parse().map_err(anyhow::Error::msg)?;
            search::run_search(&store, mode, &query, k.unwrap_or(default_k), &countries, all)
                .await?;
        }
        Commands::Get { id } => {
            let record = store.get(&id)?;
            println!("{}", serde_json::to_string_pretty(record.as_ref())?);
        }
        Commands::Dedup { threshold } => {
            let mut options = store.config().dedup.options()?;
            if let Some(threshold) = threshold {
                anyhow::ensure!(
                    threshold > 0.0 && threshold <= 1.0,
                    "--threshold must be in (0.0, 1.0]"
                );
                options.similarity_threshold = threshold;
            }
            let report = store.deduplicate_with(&options).await?;
            save(&store).await?;
            println!("dedup");
            println!("  removed: {}", report.removed);
            println!("  repaired: {}", report.repaired);
            println!("  re-encoded: {}", report.reencode.len());
            println!("  records: {}", store.len());
        }
        Commands::Rebuild => {
            let report = store.rebuild().await?;
            save(&store).await?;
            println!("rebuild");
            println!("  reclaimed: {}", report.reclaimed);
            println!("  repaired: {}", report.repaired);
        }
        Commands::Check => {
            let issues = store.check_integrity();
            if issues.is_empty() {
                println!("ok");
            } else {
                for issue in &issues {
                    println!("{:?}\t{}", issue.gap, issue.id);
                }
                anyhow::bail!("{} integrity violation(s)", issues.len());
            }
        }
        Commands::Purge { id } => {
            store.purge(&id).await?;
            save(&store).await?;
            println!("purged {}", id);
        }
        Commands::Stats => stats::print_stats(&store),
        Commands::Export { format, output } => {
            let format: ExportFormat = format.parse().map_err(anyhow::Error::msg)?;
            export::run_export(&store, format, output.as_deref())?;
        }
    }

    Ok(())
}
