//! Periodic cycle scheduler
//!
//! One tokio task drives the monitor: wait `initial_delay`, run a cycle on
//! the blocking pool, wait `interval`, repeat. The next timer is armed only
//! after the previous cycle returns, so cycles never overlap. Shutdown is
//! observed only while sleeping, which makes `stop` wait for a cycle that is
//! already running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{MonitorError, MonitorResult, RiskMonitor};

/// Timing for the cycle loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Running cycle loop
pub struct Scheduler {
    monitor: Arc<RiskMonitor>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Start the cycle loop on the current runtime
    pub fn spawn(monitor: Arc<RiskMonitor>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(monitor.clone(), config, shutdown_rx));

        info!(
            "Scheduler started: first cycle in {:?}, then every {:?}",
            config.initial_delay, config.interval
        );

        Self {
            monitor,
            shutdown_tx,
            handle,
        }
    }

    /// Stop the loop, waiting for an in-flight cycle to finish
    pub async fn stop(self) {
        self.stop_loop().await;
    }

    /// Stop the loop, then tear the monitor down.
    ///
    /// Returns how many entities were destroyed.
    pub async fn shutdown(self) -> MonitorResult<usize> {
        let monitor = self.stop_loop().await;
        tokio::task::spawn_blocking(move || monitor.teardown())
            .await
            .map_err(|e| {
                error!("Teardown task panicked: {}", e);
                MonitorError::TaskFailed(e.to_string())
            })?
    }

    async fn stop_loop(self) -> Arc<RiskMonitor> {
        // The loop may already be gone if the monitor was closed underneath it
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
        info!("Scheduler stopped");
        self.monitor
    }
}

async fn run_loop(
    monitor: Arc<RiskMonitor>,
    config: SchedulerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut delay = config.initial_delay;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
        delay = config.interval;

        let cycle_monitor = monitor.clone();
        match tokio::task::spawn_blocking(move || cycle_monitor.run_cycle()).await {
            Ok(Ok(report)) => {
                debug!("Cycle tracked {} processes", report.tracked);
            }
            Ok(Err(MonitorError::Closed)) => {
                info!("Monitor closed, scheduler exiting");
                break;
            }
            Ok(Err(e)) => {
                error!("Cycle failed: {}", e);
            }
            Err(e) => {
                error!("Cycle task panicked: {}", e);
            }
        }
    }
}
