//! insight-ai - Analysis worker daemon
//!
//! Opens the record database, reconciles unfinished work left by a previous
//! run, then ticks the analysis worker until Ctrl+C / SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use insight_common::config::{load_toml_config, resolve_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig};
use insight_common::events::EventBus;
use insight_common::time::millis_to_duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use insight_ai::workflow::{run_periodic, PeriodicTask};
use insight_ai::Pipeline;

/// Command-line arguments for insight-ai
#[derive(Parser, Debug)]
#[command(name = "insight-ai")]
#[command(about = "Asynchronous AI analysis worker for Insight")]
#[command(version)]
struct Args {
    /// Root folder holding the Insight database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Path to insight.toml
    #[arg(short, long, env = "INSIGHT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let toml_config = config_path
        .as_deref()
        .map(load_toml_config)
        .unwrap_or_default();

    // Initialize tracing (RUST_LOG wins over the TOML level)
    let default_filter = format!(
        "insight_ai={level},insight_common={level}",
        level = toml_config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting insight-ai (analysis worker)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) if path.exists() => info!("Config: {}", path.display()),
        Some(path) => info!("Config: {} (not found, using defaults)", path.display()),
        None => info!("Config: none (using defaults)"),
    }

    let pipeline = build_pipeline(args.root_folder, &toml_config).await?;

    // Rebuild the queue from persisted status before the first tick
    let report = pipeline.scheduler.recover().await;
    if report.errors > 0 {
        warn!(errors = report.errors, "Recovery scan finished with errors");
    }

    let cancel = CancellationToken::new();
    let interval = millis_to_duration(toml_config.worker.poll_interval_ms);
    let task: Arc<dyn PeriodicTask> = pipeline.scheduler.clone();
    let worker = tokio::spawn(run_periodic(task, interval, cancel.clone()));

    shutdown_signal().await;
    info!("Shutdown requested, waiting for the current analysis to finish");
    cancel.cancel();

    worker.await.context("Worker task panicked")?;
    pipeline.db.close().await;

    info!("Shutdown complete");
    Ok(())
}

async fn build_pipeline(root_folder: Option<PathBuf>, toml_config: &TomlConfig) -> Result<Pipeline> {
    // Step 1: Resolve root folder (CLI → ENV → TOML → OS default)
    let root_folder = RootFolderResolver::new(root_folder, toml_config).resolve();

    // Step 2: Create root folder directory if missing
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    // Step 3: Open or create database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = insight_ai::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    // Store lock wait: database setting wins over TOML
    insight_common::db::ensure_setting(
        &db_pool,
        "store_max_lock_wait_ms",
        &toml_config.worker.store_max_lock_wait_ms.to_string(),
    )
    .await
    .context("Failed to seed settings")?;
    let lock_wait_ms = insight_ai::db::settings::get_store_max_lock_wait_ms(&db_pool)
        .await
        .context("Failed to read store_max_lock_wait_ms")?;

    let api_key = insight_ai::config::resolve_inference_api_key(&db_pool, toml_config)
        .await
        .context("Failed to resolve inference API key")?;

    info!(
        endpoint = %toml_config.inference.endpoint,
        model = %toml_config.inference.model,
        timeout_secs = toml_config.inference.timeout_secs,
        "Inference backend configured"
    );

    let event_bus = EventBus::new(100);
    Pipeline::new(db_pool, event_bus, toml_config, api_key, lock_wait_ms)
        .context("Failed to create inference backend")
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
