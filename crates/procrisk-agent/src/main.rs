//! procrisk-agent - per-process risk telemetry daemon
//!
//! Samples every live process on a fixed interval, scores it against fixed
//! resource thresholds and publishes one read-only report per process.
//! Use `--once` to take two samples, print the reports and exit.

use std::sync::Arc;

use anyhow::{Context, Result};
use procrisk_agent::config::{print_help, CliArgs, MonitorConfig};
use procrisk_agent::{RiskMonitor, Scheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::from_env()?;
    if args.help {
        print_help();
        return Ok(());
    }

    let config = MonitorConfig::load(&args).context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("procrisk_agent={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting procrisk-agent");
    tracing::info!("Platform: {}", std::env::consts::OS);
    tracing::info!("Sampling interval: {:?}", config.interval());

    let enumerator = config
        .enumerator
        .build()
        .context("Failed to initialize process enumerator")?;

    let endpoint_dir = config.endpoint_dir();
    let sink = config.publisher.open(&endpoint_dir).with_context(|| {
        format!("Failed to open endpoint namespace at {}", endpoint_dir.display())
    })?;
    if config.publisher == procrisk_agent::PublisherKind::Directory {
        tracing::info!("Publishing endpoints under {}", endpoint_dir.display());
    }

    let monitor = Arc::new(RiskMonitor::new(enumerator, sink));

    if args.once {
        run_once(monitor.clone(), &config, args.json).await?;
    } else {
        run_daemon(monitor.clone(), &config).await?;
    }

    let metrics = serde_json::to_string(&monitor.metrics()).context("Failed to encode metrics")?;
    tracing::info!("Final metrics: {}", metrics);

    Ok(())
}

/// Take two samples one interval apart, print every report, tear down
async fn run_once(monitor: Arc<RiskMonitor>, config: &MonitorConfig, json: bool) -> Result<()> {
    let interval = config.interval();

    let reports = tokio::task::spawn_blocking(move || -> Result<_> {
        monitor.run_cycle().context("First sampling cycle failed")?;
        std::thread::sleep(interval);
        monitor.run_cycle().context("Second sampling cycle failed")?;

        let snapshots = monitor.snapshots();
        monitor.teardown().context("Teardown failed")?;
        Ok(snapshots)
    })
    .await
    .context("Sampling task panicked")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", report);
        }
    }

    Ok(())
}

/// Run cycles until Ctrl-C, then tear everything down
async fn run_daemon(monitor: Arc<RiskMonitor>, config: &MonitorConfig) -> Result<()> {
    let scheduler = Scheduler::spawn(monitor, config.scheduler());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    let removed = scheduler.shutdown().await.context("Teardown failed")?;
    tracing::info!("Removed {} endpoints, exiting", removed);

    Ok(())
}
