//! Board Resolver CLI entry point.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use board_resolver::{
    classify_url, BatchOrchestrator, BatchReport, MemoryCache, ResolutionCache, Resolver,
    ResolverConfig, SeedRecord, SqliteCache,
};

use crate::config::{load_seeds, resolve_db_path};

#[derive(Parser)]
#[command(
    name = "board-resolver",
    about = "Resolve claimed jobs-page URLs into canonical, classified job boards",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every seed in a JSON file and update the board registry.
    Discover {
        /// JSON array of {"organization_id", "claimed_jobs_url"} records.
        #[arg(short, long)]
        input: PathBuf,

        /// Write the report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only process the first N rows.
        #[arg(long)]
        limit: Option<usize>,

        /// SQLite store path. Also reads from DB_PATH.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Skip the persistent cache and board registry.
        #[arg(long)]
        no_cache: bool,
    },

    /// Resolve a single URL, bypassing the cache.
    Resolve {
        url: String,
    },

    /// Classify a URL by pattern only. No network access.
    Classify {
        url: String,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   board-resolver completions bash > ~/.local/share/bash-completion/completions/board-resolver
    ///   board-resolver completions zsh > ~/.zfunc/_board-resolver
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Discover {
            input,
            output,
            limit,
            db,
            no_cache,
        } => {
            let resolver_config = ResolverConfig::from_env()?;
            let seeds = load_seeds(&input)?;

            let store = if no_cache {
                None
            } else {
                let path = resolve_db_path(db.as_deref());
                tracing::info!("Store: {}", path.display());
                let store = SqliteCache::open(&path)
                    .with_context(|| format!("failed to open store: {}", path.display()))?;
                Some(Arc::new(store))
            };
            let cache: Arc<dyn ResolutionCache> = match &store {
                Some(store) => Arc::clone(store) as Arc<dyn ResolutionCache>,
                None => Arc::new(MemoryCache::new()),
            };

            let report = BatchOrchestrator::new(&resolver_config, cache)?
                .with_limit(limit)
                .run(&seeds)
                .await;

            let rows = &seeds[..report.input_rows];
            if let Some(store) = &store {
                register_boards(store, &report, rows)?;
            }

            let body = serde_json::json!({
                "input_rows": report.input_rows,
                "unique_seeds": report.unique_seeds,
                "output_rows": rows.len(),
                "stage_counts": report.stage_counts,
                "failures": report.failures,
                "assignments": report.assignments(rows),
            });
            let rendered = serde_json::to_string_pretty(&body)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write report: {}", path.display()))?;
                    println!("{}", serde_json::to_string_pretty(&report.stage_counts)?);
                }
                None => println!("{rendered}"),
            }
        }

        Commands::Resolve { url } => {
            let resolver_config = ResolverConfig::from_env()?;
            let resolver = Resolver::new(&resolver_config)?;
            let resolution = resolver.resolve(&url).await;
            let body = serde_json::json!({
                "stage": resolution.stage,
                "result": resolution.result,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Classify { url } => {
            let hit = classify_url(&url);
            println!("{}", serde_json::to_string_pretty(&hit)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "board-resolver", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Record each organization's board. Organizations sharing a canonical
/// board end up on a single `board` row.
fn register_boards(
    store: &SqliteCache,
    report: &BatchReport,
    rows: &[SeedRecord],
) -> anyhow::Result<()> {
    for seed in rows {
        let Some(result) = report.result_for(&seed.claimed_jobs_url) else {
            continue;
        };
        store
            .upsert_board(result)
            .with_context(|| format!("failed to register board {}", result.canonical_jobs_url))?;
        store.map_org_board(&seed.organization_id, &result.canonical_jobs_url)?;
    }
    tracing::info!("Registry now holds {} boards", store.board_count()?);
    Ok(())
}
