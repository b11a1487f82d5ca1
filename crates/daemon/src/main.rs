use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use claimfetch_core::{
    load_config, maintenance, metrics, validate_config, ClaimStore, CycleController, Environment,
    Fetcher, FsArtifactStore, HttpFetcher, RateLimiter, SanitizedConfig, Scheduler,
    SqliteClaimStore,
};
use claimfetch_core::processor::ClaimProcessor;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "claimfetch", version = VERSION, about = "Claim artifact download service")]
struct Cli {
    /// Path to the configuration file (also CLAIMFETCH_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Environment profile supplying database and storage paths.
    #[arg(long, global = true, default_value = "local")]
    env: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the download service on its schedule (default).
    Run {
        /// Run exactly one cycle and exit.
        #[arg(long)]
        once: bool,
    },
    /// Show aggregate download statistics.
    Status {
        /// Trailing window in hours (0 = all time).
        #[arg(long, default_value_t = 24)]
        window_hours: u32,
    },
    /// Show recent download activity.
    Recent {
        #[arg(long, default_value_t = 24)]
        hours: u32,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Reset failed downloads below the attempt ceiling back to pending.
    ResetFailed {
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
    },
    /// Delete failure records older than the retention window.
    Cleanup {
        /// Override the configured retention in days.
        #[arg(long)]
        days: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let environment: Environment = cli
        .env
        .parse()
        .map_err(anyhow::Error::msg)
        .context("Invalid --env value")?;

    // Determine config path
    let config_path = cli
        .config
        .or_else(|| std::env::var("CLAIMFETCH_CONFIG").map(PathBuf::from).ok())
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;
    info!(
        environment = %environment,
        config = %serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default(),
        "Configuration loaded"
    );

    let Some(profile) = config.profile(environment).cloned() else {
        bail!(
            "No [profiles.{}] section in {:?}",
            environment,
            config_path
        );
    };

    let store: Arc<dyn ClaimStore> = Arc::new(
        SqliteClaimStore::new(&profile.database_path).context("Failed to open claim store")?,
    );
    info!("Claim store initialized at {:?}", profile.database_path);

    match cli.command.unwrap_or(Command::Run { once: false }) {
        Command::Run { once } => run_service(config, profile.storage_root, store, once).await,
        Command::Status { window_hours } => {
            let stats = maintenance::log_statistics(store.as_ref(), window_hours)
                .context("Failed to query statistics")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Recent { hours, limit } => {
            let recent = store
                .recent_outcomes(hours, limit)
                .context("Failed to query recent outcomes")?;
            if recent.is_empty() {
                println!("No activity in the last {} hours", hours);
                return Ok(());
            }
            for outcome in recent {
                println!(
                    "{}  {:<12} {:<12} {:<18} attempts={} {}",
                    outcome.finished_at.format("%Y-%m-%d %H:%M:%S"),
                    outcome.claim_no,
                    outcome.file_id,
                    outcome.status.as_str(),
                    outcome.attempts,
                    outcome.error.unwrap_or_default(),
                );
            }
            Ok(())
        }
        Command::ResetFailed { max_attempts } => {
            let reset = store
                .reset_failed_for_retry(max_attempts)
                .context("Failed to reset failed downloads")?;
            println!("Reset {} failed downloads for retry", reset);
            Ok(())
        }
        Command::Cleanup { days } => {
            let retention = days.unwrap_or(config.cleanup.retention_days);
            let deleted = maintenance::run_cleanup_once(store.as_ref(), retention)
                .context("Cleanup failed")?;
            println!(
                "Deleted {} failure records older than {} days",
                deleted, retention
            );
            Ok(())
        }
    }
}

async fn run_service(
    config: claimfetch_core::Config,
    storage_root: PathBuf,
    store: Arc<dyn ClaimStore>,
    once: bool,
) -> Result<()> {
    let fetcher: Arc<dyn Fetcher> = Arc::new(
        HttpFetcher::new(&config.download).context("Failed to build HTTP fetcher")?,
    );
    let limiter = Arc::new(RateLimiter::new(config.download.rate_limit_rpm));

    let storage = FsArtifactStore::new(&storage_root);
    storage
        .ensure_root()
        .await
        .context("Failed to create storage root")?;
    info!("Storage root confirmed at {:?}", storage_root);

    let processor = ClaimProcessor::new(&config.download, fetcher, limiter, storage);
    let controller = Arc::new(CycleController::new(
        Arc::clone(&store),
        processor,
        config.cycle.clone(),
        config.download.inter_claim_delay(),
    ));
    let scheduler = Arc::new(Scheduler::new(controller, config.scheduler.period()));

    if once {
        info!("Running a single cycle");
        let report = scheduler.run_once().await.context("Cycle failed")?;
        info!(
            termination = report.termination.as_str(),
            claims = report.stats.claims_processed,
            succeeded = report.stats.files_succeeded,
            failed = report.stats.files_failed,
            "Single cycle finished"
        );
        return Ok(());
    }

    let registry = metrics::build_registry();

    // Maintenance jobs run on their own intervals, stopped via this channel.
    let (maintenance_shutdown, _) = broadcast::channel(1);
    let cleanup_task = maintenance::spawn_cleanup_loop(
        Arc::clone(&store),
        config.cleanup.clone(),
        &maintenance_shutdown,
    );
    let statistics_task = maintenance::spawn_statistics_loop(
        Arc::clone(&store),
        config.statistics.clone(),
        &maintenance_shutdown,
    );

    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    shutdown_signal().await;
    info!("Shutting down...");

    // Let the in-flight cycle finish its current claim.
    scheduler.stop();
    let _ = maintenance_shutdown.send(());

    scheduler_task.await.ok();
    if let Some(task) = cleanup_task {
        task.await.ok();
    }
    if let Some(task) = statistics_task {
        task.await.ok();
    }

    debug!(
        "Final metrics:\n{}",
        metrics::encode_text(&registry)
    );
    info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
