//! Metric Store Binary Entry Point
//!
//! Runs the agent on the stdio transport: bus deliveries arrive as JSON lines
//! on stdin and mailbox replies leave as JSON lines on stdout. Logs go to
//! stderr.

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use metric_store::{
    AgentBuilder, AppConfig, ControlCommand, MetricPoller, StdioTransport, Store,
    agent::FileSource,
    bus::stdio::forward_lines,
    config::parse_duration,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Metric Store - time-series metric ingestion and aggregation agent
#[derive(Parser, Debug)]
#[command(name = "metric-store", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "METRIC_STORE_CONFIG"
    )]
    config: String,

    /// Database path (overrides config file)
    #[arg(long, env = "METRIC_STORE_DB")]
    db: Option<String>,

    /// Pending rows that trigger a flush (overrides config file)
    #[arg(long, env = "METRIC_STORE_MAX_ROW")]
    max_row: Option<usize>,

    /// Age of the oldest pending row that triggers a flush, e.g. `1s`
    #[arg(long, env = "METRIC_STORE_MAX_DELAY", value_parser = parse_duration)]
    max_delay: Option<Duration>,

    /// Log filter (overrides RUST_LOG), e.g. `debug` or `info,metric_store=trace`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,metric_store=debug".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Metric Store - time-series metric agent");

    // CLI > ENV > config file > defaults
    let mut config = load_config(&cli.config)?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    if let Some(max_row) = cli.max_row {
        config.cache.max_row = max_row;
    }
    if let Some(max_delay) = cli.max_delay {
        config.cache.max_delay = max_delay;
    }
    config.validate()?;

    tracing::info!(
        database = %config.database.path,
        max_row = config.cache.max_row,
        max_delay = ?config.cache.max_delay,
        "Configuration loaded"
    );

    let store = Store::open(&config.database.path, config.database.pool_size)?;
    let handles = AgentBuilder::new(store)
        .max_row(config.cache.max_row)
        .max_delay(config.cache.max_delay)
        .poll_interval(config.agent.poll_interval)
        .channel_capacity(config.agent.channel_capacity)
        .retention(config.retention_policy())
        .build(StdioTransport::stdout())?;
    let inbox = handles.inbox.clone();

    inbox.control(ControlCommand::Connect {
        endpoint: config.agent.endpoint.clone(),
        address: config.agent.name.clone(),
    })?;
    for stream in &config.agent.streams {
        inbox.control(ControlCommand::Consumer {
            stream: stream.stream.clone(),
            pattern: stream.pattern.clone(),
        })?;
    }

    let poller = if config.sources.files.is_empty() {
        None
    } else {
        let poller = config
            .sources
            .files
            .iter()
            .fold(
                MetricPoller::new(inbox.clone(), config.sources.poll_interval),
                |poller, path| poller.add_source(FileSource::new(path)),
            );
        tracing::info!(sources = poller.source_count(), "Starting metric poller");
        Some(poller.spawn())
    };

    // Stdin is read on a plain thread: a blocking read must not keep the
    // runtime alive at shutdown.
    let (eof_tx, eof_rx) = tokio::sync::oneshot::channel();
    let reader_inbox = inbox.clone();
    std::thread::spawn(move || {
        let result = forward_lines(std::io::stdin().lock(), &reader_inbox);
        let _ = eof_tx.send(result);
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = eof_rx => match result {
            Ok(Ok(forwarded)) => tracing::info!(forwarded, "Input closed"),
            Ok(Err(e)) => tracing::error!(error = %e, "Input reader failed"),
            Err(_) => tracing::error!("Input reader exited unexpectedly"),
        },
    }

    if let Some(poller) = poller {
        poller.abort();
    }

    tracing::info!("Shutting down agent...");
    tokio::task::spawn_blocking(move || handles.shutdown()).await??;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load the config file, or fall back to defaults when it does not exist.
fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    if Path::new(path).exists() {
        tracing::info!("Loading configuration from: {}", path);
        return Ok(AppConfig::load(path)?);
    }
    tracing::warn!("Configuration file {} not found, using defaults", path);
    let mut config = AppConfig::default();
    config.apply_age_overrides(std::env::vars())?;
    Ok(config)
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
