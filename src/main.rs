//! # Repo Scout CLI (`scout`)
//!
//! ## Usage
//!
//! ```bash
//! scout --config ./config/scout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scout init` | Create the cache database |
//! | `scout scan [--force]` | Crawl the repository, or load a valid cached scan |
//! | `scout search "<query>"` | Rank extracted knowledge for a query |
//! | `scout stats` | Entry totals by type |
//! | `scout diagnostics` | Paths attempted, processed and failed |
//! | `scout cache show\|clear` | Inspect or drop the cached scan |
//! | `scout clear` | Empty the store and drop the cached scan |
//!
//! Without a `[repository]` section every command works against the
//! built-in synthetic dataset. A missing config file is treated the same way.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use repo_scout::config::{self, Config};
use repo_scout::engine::{Engine, InitReport};
use repo_scout::logging::init_logging;
use repo_scout::progress::ProgressMode;
use repo_scout::repo_scout_core::search::ScoredEntry;
use repo_scout::{db, migrate, stats};

/// Repo Scout — budgeted knowledge crawler and keyword retrieval for remote
/// source repositories.
#[derive(Parser)]
#[command(name = "scout", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Keep the cache in memory for this run only.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the cache database. Idempotent.
    Init,

    /// Populate the knowledge store.
    ///
    /// Uses a valid cached scan unless `--force` is given or the repository
    /// changed. Prints where the data came from.
    Scan {
        /// Ignore the cache and crawl.
        #[arg(long)]
        force: bool,
    },

    /// Search extracted knowledge.
    Search {
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Show per-signal score contributions.
        #[arg(long)]
        explain: bool,

        /// Look up the last change of each result's file.
        #[arg(long)]
        history: bool,
    },

    /// Entry totals by type and processed-file count.
    Stats,

    /// Details of the last scan.
    Diagnostics,

    /// Inspect or drop the cached scan.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Empty the store and drop the cached scan.
    Clear,
}

#[derive(Subcommand)]
enum CacheAction {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::minimal()
    };
    init_logging(&cfg.logging.level);

    if let Commands::Init = cli.command {
        if cli.ephemeral {
            println!("Nothing to initialize for an ephemeral cache.");
            return Ok(());
        }
        let pool = db::connect(&cfg.cache.path).await?;
        migrate::run_migrations(&pool).await?;
        pool.close().await;
        println!("Cache database initialized at {}.", cfg.cache.path.display());
        return Ok(());
    }

    let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let engine = Engine::from_config(&cfg, cli.ephemeral)
        .await?
        .with_progress(Arc::from(mode.reporter()));

    let cancel = engine.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Init => {}
        Commands::Scan { force } => {
            let report = engine.initialize(force).await;
            print_report(&report);
        }
        Commands::Search {
            query,
            limit,
            explain,
            history,
        } => {
            engine.initialize(false).await;
            let mut results = engine.search_with(&query, limit, explain);
            if history {
                engine.annotate_history(&mut results).await;
            }
            print_results(&results, engine.is_using_mock_data());
        }
        Commands::Stats => {
            engine.initialize(false).await;
            stats::print_stats(&engine.stats(), &engine.state());
        }
        Commands::Diagnostics => {
            engine.initialize(false).await;
            stats::print_diagnostics(&engine.diagnostics());
        }
        Commands::Cache { action } => match action {
            CacheAction::Show => {
                let record = engine.cache().peek().await?;
                let bytes = engine.cache().stored_size().await?;
                stats::print_cache_record(record.as_ref(), bytes);
            }
            CacheAction::Clear => {
                engine.clear_cache().await?;
                println!("Cache cleared.");
            }
        },
        Commands::Clear => {
            engine.clear();
            engine.clear_cache().await?;
            println!("Store and cache cleared.");
        }
    }

    Ok(())
}

fn print_report(report: &InitReport) {
    println!("source:    {}", report.source);
    println!(
        "data:      {}",
        if report.using_mock_data {
            "synthetic (mock)"
        } else {
            "repository"
        }
    );
    println!("entries:   {}", report.entries);
    println!("files:     {}", report.files_processed);
    println!("failures:  {}", report.failures);
    if report.round_trips > 0 {
        println!("requests:  {}", report.round_trips);
    }
}

fn print_results(results: &[ScoredEntry], mock: bool) {
    if mock {
        println!("(synthetic data: no repository scan available)");
    }
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        let entry = &result.entry;
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            result.score,
            entry.entry_type,
            entry.file_path
        );
        if let Some(updated) = entry.last_updated {
            println!("    updated: {}", updated.format("%Y-%m-%d"));
        }
        let excerpt: String = entry.content.chars().take(200).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        if let Some(why) = &result.explain {
            println!(
                "    score: keyword {:.2} + content {:.2} + boundary {:.2} + path {:.2} + metadata {:.2}, x{:.2}",
                why.keyword, why.content, why.word_boundary, why.path, why.metadata, why.boost
            );
            println!("    matched: {}", why.matched_keywords.join(", "));
        }
        println!("    id: {}", entry.id);
        println!();
    }
}
