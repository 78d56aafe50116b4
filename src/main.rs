//! hitcount command line.
//!
//! - `import`: replay a CSV export or web-server access log into the store,
//!   optionally following the file as it grows
//! - `stats`: print stored rollups for a site
//! - `purge`: delete paths together with their hits and rollups
//! - `check`: verify the store and print component health

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{error, info};

use hitcount_store::health::check_connection;
use hitcount_store::{
    hit_counts_for, hit_stats_for, path_ids_for, ref_counts_for, stats_for, HitStore, SqliteStore,
    StatTable, StoreConfig,
};
use importer::{ImportConfig, Importer, LogFormat};
use pipeline::{Pipeline, PipelineConfig};
use telemetry::{health, init_tracing_from_env, metrics};
use worker::{Scheduler, SchedulerConfig};

#[derive(Parser)]
#[command(name = "hitcount", about = "Page-view ingestion, sessionization and rollups")]
#[command(version, propagate_version = true)]
struct Cli {
    /// Configuration file; defaults to config/default.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV export or an access log
    Import(ImportArgs),
    /// Print stored rollups for a site
    Stats {
        #[arg(long, default_value_t = 1)]
        site: i64,
    },
    /// Delete paths with their hits and rollups
    Purge {
        /// Path ids to delete
        #[arg(long = "path-id", required_unless_present = "site")]
        path_ids: Vec<i64>,
        /// Delete every path of this site
        #[arg(long, conflicts_with = "path_ids")]
        site: Option<i64>,
    },
    /// Check the store connection
    Check,
}

#[derive(Args)]
struct ImportArgs {
    /// Keep importing lines appended to the file until interrupted
    #[arg(short, long)]
    follow: bool,
    /// csv, combined, combined-vhost, common or common-vhost
    #[arg(long)]
    format: Option<LogFormat>,
    /// Site the imported lines belong to
    #[arg(long)]
    site: Option<i64>,
    file: PathBuf,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    pipeline: PipelineConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
    #[serde(default)]
    import: ImportConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing_from_env();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    config
        .pipeline
        .validate()
        .context("Invalid pipeline configuration")?;

    let store = SqliteStore::open(config.store.clone())
        .with_context(|| format!("Failed to open store at {}", config.store.path))?;
    if !check_connection(&store).await {
        bail!("store at {} is not usable", config.store.path);
    }

    match cli.command {
        Commands::Import(args) => run_import(config, store, args).await,
        Commands::Stats { site } => print_stats(&store, site).await,
        Commands::Purge { path_ids, site } => purge(&store, path_ids, site).await,
        Commands::Check => print_json(&health().report()),
    }
}

/// Load configuration from defaults, a TOML file and the environment.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name("config/default").required(false),
    };

    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(file.format(config::FileFormat::Toml))
        // HITCOUNT__STORE__PATH=/var/lib/hitcount.sqlite3
        .add_source(
            config::Environment::with_prefix("HITCOUNT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

async fn run_import(config: Config, store: SqliteStore, args: ImportArgs) -> Result<()> {
    let mut import = config.import;
    if let Some(format) = args.format {
        import.format = format;
    }
    if let Some(site) = args.site {
        import.site_id = site;
    }

    let pipeline = Arc::new(Pipeline::new(Arc::new(store), config.pipeline));
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&pipeline), config.scheduler));
    let importer =
        Importer::new(Arc::clone(&pipeline), import).context("Invalid import configuration")?;

    if !args.follow {
        let stats = importer
            .import_file(&args.file)
            .await
            .with_context(|| format!("Failed to import {}", args.file.display()))?;
        // The importer never flushes on its own.
        let flushed = scheduler
            .persist_and_stat()
            .await
            .context("Failed to persist imported hits")?;
        return print_json(&serde_json::json!({
            "import": stats,
            "flush": flushed,
        }));
    }

    let loop_handle = Arc::clone(&scheduler).start();
    let follow = importer
        .follow_file(&args.file)
        .await
        .with_context(|| format!("Failed to follow {}", args.file.display()))?;

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = follow.stopped() => error!("Follow ended unexpectedly"),
    }

    let stats = follow.stop().await;
    scheduler.shutdown();
    if let Err(e) = loop_handle.await {
        error!(error = %e, "Scheduler task failed");
    }
    let stats = stats.context("Follow failed")?;

    print_json(&serde_json::json!({
        "import": stats,
        "metrics": metrics().snapshot(),
    }))
}

async fn print_stats(store: &SqliteStore, site: i64) -> Result<()> {
    let report = serde_json::json!({
        "site": site,
        "hit_counts": hit_counts_for(store, site).await?,
        "hit_stats": hit_stats_for(store, site).await?,
        "ref_counts": ref_counts_for(store, site).await?,
        "browser_stats": stats_for(store, StatTable::Browser, site).await?,
        "system_stats": stats_for(store, StatTable::System, site).await?,
        "location_stats": stats_for(store, StatTable::Location, site).await?,
        "size_stats": stats_for(store, StatTable::Size, site).await?,
    });
    print_json(&report)
}

async fn purge(store: &SqliteStore, path_ids: Vec<i64>, site: Option<i64>) -> Result<()> {
    let path_ids = match site {
        Some(site) => path_ids_for(store, site).await?,
        None => path_ids,
    };
    let paths = path_ids.len();
    let hits = store.purge(path_ids).await.context("Failed to purge paths")?;
    info!(paths, hits, "Purged paths");
    print_json(&serde_json::json!({ "paths": paths, "hits": hits }))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
