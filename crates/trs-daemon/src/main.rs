//! trsync Daemon - Background synchronization service
//!
//! This binary runs as a long-lived service and handles:
//! - One synchronization loop per configured TRS feed
//! - Durable cursors in a SQLite database
//! - Applied changes appended to a JSON Lines file
//! - Immediate polling of every feed on SIGUSR1
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon loads and validates the YAML configuration, wires the HTTP
//! feed readers, the cursor store and the sink into a `SyncSupervisor`,
//! then waits for a shutdown signal. Shutdown is propagated to every feed
//! through a `CancellationToken`.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use trs_cache::{DatabasePool, SqliteCursorStore};
use trs_core::{
    config::Config,
    domain::FeedStatus,
    ports::{ICursorStore, IFeedReader},
};
use trs_feed::HttpFeedReader;
use trs_sync::{FeedReport, JsonLinesSink, SyncSettings, SyncSupervisor};
use url::Url;

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "trsyncd",
    version,
    about = "Tracked Resource Set synchronization daemon"
)]
struct Cli {
    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Synchronize every configured feed until stopped (default)
    Run,
    /// Show the stored cursor of every feed
    Cursors {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Drop a feed's cursor; its next run starts again from the base
    Forget {
        /// Feed URI as configured
        feed_uri: String,
    },
}

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the configuration, the cursor database and the shutdown token
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the cursor database named in the configuration
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_pool = DatabasePool::new(&config.state.database)
            .await
            .with_context(|| {
                format!(
                    "Failed to open cursor database {}",
                    config.state.database.display()
                )
            })?;

        Ok(Self {
            config,
            db_pool,
            shutdown,
        })
    }

    fn store(&self) -> Arc<SqliteCursorStore> {
        Arc::new(SqliteCursorStore::new(self.db_pool.pool().clone()))
    }

    /// Runs every feed until shutdown or until no feed is left running
    ///
    /// Fails when every feed ended in `Failed`.
    async fn run(&self) -> Result<()> {
        let sink = JsonLinesSink::open(&self.config.sink.output)
            .await
            .with_context(|| {
                format!(
                    "Failed to open sink output {}",
                    self.config.sink.output.display()
                )
            })?;
        info!(output = %sink.path().display(), "Writing applied changes");

        let readers = build_readers(&self.config)?;
        let mut supervisor = SyncSupervisor::spawn(
            readers,
            self.store(),
            Arc::new(sink),
            SyncSettings::from_config(&self.config),
        )
        .context("Failed to start feeds")?;

        let mut nudges = NudgeSignal::install();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = nudges.recv() => {
                    let feeds: Vec<Url> = supervisor.feeds().cloned().collect();
                    info!(feeds = feeds.len(), "Nudging all feeds");
                    for feed in &feeds {
                        supervisor.nudge(feed);
                    }
                }
                report = supervisor.next_report() => match report {
                    Some(report) => log_report(&report),
                    None => {
                        warn!("No feed left running");
                        break;
                    }
                }
            }
        }

        let reports = supervisor.shutdown().await;
        for report in &reports {
            log_report(report);
        }
        self.db_pool.close().await;

        let failed = reports
            .iter()
            .filter(|r| matches!(r.status, FeedStatus::Failed(_)))
            .count();
        if !reports.is_empty() && failed == reports.len() {
            anyhow::bail!("All {failed} feed(s) failed");
        }
        Ok(())
    }

    /// Prints the stored cursors
    async fn list_cursors(&self, json: bool) -> Result<()> {
        let cursors = self
            .store()
            .list()
            .await
            .context("Failed to read cursors")?;

        if json {
            let rows: Vec<_> = cursors
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "feed_uri": c.feed_uri().as_str(),
                        "last_applied": c.last_applied().map(|s| s.value()),
                        "updated_at": c.updated_at().to_rfc3339(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else if cursors.is_empty() {
            println!("No cursors stored");
        } else {
            for c in &cursors {
                let position = c
                    .last_applied()
                    .map_or_else(|| "-".to_string(), |s| s.to_string());
                println!(
                    "{}\t{}\t{}",
                    c.feed_uri(),
                    position,
                    c.updated_at().to_rfc3339()
                );
            }
        }
        Ok(())
    }

    /// Removes one feed's cursor; returns whether one was stored
    async fn forget(&self, feed_uri: &str) -> Result<bool> {
        let uri = Url::parse(feed_uri).with_context(|| format!("Invalid feed URI {feed_uri}"))?;
        let removed = self
            .store()
            .remove(&uri)
            .await
            .context("Failed to remove cursor")?;

        if removed {
            info!(feed = %uri, "Cursor removed; the feed restarts from its base");
        } else {
            warn!(feed = %uri, "No cursor stored for feed");
        }
        Ok(removed)
    }
}

/// One HTTP reader per configured feed
fn build_readers(config: &Config) -> Result<Vec<Arc<dyn IFeedReader>>> {
    let timeout = config.sync.request_timeout();
    config
        .endpoints()
        .context("Invalid feed configuration")?
        .into_iter()
        .map(|endpoint| {
            info!(feed = %endpoint, "Configured feed");
            let reader = HttpFeedReader::new(endpoint, timeout)
                .context("Failed to create HTTP client")?;
            Ok(Arc::new(reader) as Arc<dyn IFeedReader>)
        })
        .collect()
}

fn log_report(report: &FeedReport) {
    match &report.status {
        FeedStatus::Failed(reason) => error!(
            feed = %report.feed_uri,
            %reason,
            cursor = ?report.cursor,
            cycles = report.cycles,
            "Feed stopped with failure"
        ),
        status => info!(
            feed = %report.feed_uri,
            %status,
            cursor = ?report.cursor,
            cycles = report.cycles,
            "Feed finished"
        ),
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Loads the configuration file
///
/// An explicitly requested file must exist; a missing default file means
/// built-in defaults.
fn load_config(path: &Path, explicit: bool) -> Result<Config> {
    if explicit || path.exists() {
        Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

/// Fails with every validation problem logged
fn ensure_valid(config: &Config) -> Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        return Ok(());
    }
    for e in &errors {
        error!(field = %e.field, "{}", e.message);
    }
    anyhow::bail!("Configuration has {} error(s)", errors.len())
}

// ============================================================================
// Signals
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

/// SIGUSR1 asks every feed to poll now
struct NudgeSignal {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl NudgeSignal {
    fn install() -> Self {
        #[cfg(unix)]
        {
            let signal =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
                    .map_err(|e| warn!(error = %e, "SIGUSR1 nudges unavailable"))
                    .ok();
            Self { signal }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(signal) = self.signal.as_mut() {
            if signal.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

// ============================================================================
// Main entry point
// ============================================================================

fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = load_config(&config_path, cli.config.is_some())?;

    init_tracing(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        cli.json_logs,
    );
    info!(config_path = %config_path.display(), "trsync daemon starting (trsyncd)");

    let shutdown_token = CancellationToken::new();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            ensure_valid(&config)?;

            let signal_token = shutdown_token.clone();
            tokio::spawn(async move {
                shutdown_signal(signal_token).await;
            });

            let service = DaemonService::new(config, shutdown_token).await?;
            let result = service.run().await;

            match &result {
                Ok(()) => info!("trsync daemon shut down gracefully"),
                Err(e) => error!(error = %e, "trsync daemon exiting with error"),
            }
            result
        }
        Command::Cursors { json } => {
            DaemonService::new(config, shutdown_token)
                .await?
                .list_cursors(json)
                .await
        }
        Command::Forget { feed_uri } => {
            DaemonService::new(config, shutdown_token)
                .await?
                .forget(&feed_uri)
                .await
                .map(|_| ())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
