use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use warden_core::domain::DispatchBatch;
use warden_core::impls::InMemoryLockCoordinator;
use warden_core::ports::LockCoordinator;
use warden_core::{App, AppBuilder, CoordinatorBackend, WardenConfig};

/// Lock-guarded task dispatch demo
#[derive(Parser)]
#[command(name = "warden-cli")]
#[command(about = "Dispatch keyed tasks through a lock coordinator and worker pool", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file; WARDEN_* environment variables override it
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a simulated email to each key and print one outcome per key
    Send {
        /// Task keys, e.g. recipient addresses
        #[arg(required = true)]
        keys: Vec<String>,

        /// Simulated work per task
        #[arg(long, default_value_t = 2000)]
        work_ms: u64,

        /// Submit the same batch this many times concurrently (shows dedup)
        #[arg(long, default_value_t = 1)]
        repeat: usize,

        /// Print outcomes as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = WardenConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Send {
            keys,
            work_ms,
            repeat,
            json,
        } => send(&config, keys, Duration::from_millis(work_ms), repeat.max(1), json).await,
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn send(
    config: &WardenConfig,
    keys: Vec<String>,
    work: Duration,
    repeat: usize,
    json: bool,
) -> Result<()> {
    let coordinator = connect_coordinator(config).await?;
    let app = Arc::new(
        AppBuilder::from_config(config)
            .coordinator(coordinator)
            .build()
            .context("failed to build app")?,
    );

    let mut rounds = JoinSet::new();
    for round in 0..repeat {
        let app = Arc::clone(&app);
        let keys = keys.clone();
        rounds.spawn(async move { (round, submit(&app, keys, work).await) });
    }

    let mut results: Vec<(usize, DispatchBatch)> = Vec::with_capacity(repeat);
    while let Some(joined) = rounds.join_next().await {
        let (round, batch) = joined.context("submission task panicked")?;
        results.push((round, batch?));
    }
    results.sort_by_key(|(round, _)| *round);

    for (round, batch) in &results {
        if json {
            println!("{}", serde_json::to_string(batch)?);
            continue;
        }
        if repeat > 1 {
            println!("round {}:", round + 1);
        }
        for message in batch.messages() {
            println!("  {message}");
        }
    }

    app.shutdown().await;
    tracing::debug!(status = ?app.pool_status(), "pool drained");
    Ok(())
}

async fn submit(app: &App, keys: Vec<String>, work: Duration) -> Result<DispatchBatch> {
    let batch = app
        .submit_batch(keys, move |key| {
            let key = key.clone();
            async move {
                sleep(work).await;
                Ok(format!("email sent: {key}"))
            }
        })
        .await?;
    Ok(batch)
}

async fn connect_coordinator(config: &WardenConfig) -> Result<Arc<dyn LockCoordinator>> {
    match config.coordinator.backend {
        CoordinatorBackend::Memory => Ok(Arc::new(InMemoryLockCoordinator::new())),
        CoordinatorBackend::Redis => redis_coordinator(&config.coordinator.redis_url).await,
    }
}

#[cfg(feature = "redis")]
async fn redis_coordinator(url: &str) -> Result<Arc<dyn LockCoordinator>> {
    let coordinator = warden_core::impls::RedisLockCoordinator::connect(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    Ok(Arc::new(coordinator))
}

#[cfg(not(feature = "redis"))]
async fn redis_coordinator(_url: &str) -> Result<Arc<dyn LockCoordinator>> {
    anyhow::bail!("redis backend requested but warden-cli was built without the `redis` feature")
}
