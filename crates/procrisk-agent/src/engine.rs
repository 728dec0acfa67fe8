//! Risk monitor context
//!
//! [`RiskMonitor`] owns the enumerator, the entity registry and the endpoint
//! sink. A single mutex serializes sampling cycles, endpoint reads and
//! teardown, so a reader always sees one entity's fields from the same cycle.

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use procrisk_common::{EntitySnapshot, PlatformError};
use thiserror::Error;
use tracing::{debug, info};

use crate::endpoint::{EndpointError, EndpointSink};
use crate::monitor::ProcessEnumerator;
use crate::observability::{MetricsSnapshot, MonitorMetrics};
use crate::registry::{CycleReport, Registry};

/// Errors surfaced by the monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("No such process: {0}")]
    NoSuchProcess(u32),

    #[error("Process enumeration failed: {0}")]
    Enumeration(#[from] PlatformError),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Monitor is shut down")]
    Closed,

    #[error("Monitor task failed: {0}")]
    TaskFailed(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;

struct MonitorState {
    registry: Registry,
    sink: Box<dyn EndpointSink>,
    closed: bool,
}

/// Shared monitor state plus the operations that act on it
pub struct RiskMonitor {
    enumerator: Box<dyn ProcessEnumerator>,
    state: Mutex<MonitorState>,
    metrics: MonitorMetrics,
}

impl RiskMonitor {
    pub fn new(enumerator: Box<dyn ProcessEnumerator>, sink: Box<dyn EndpointSink>) -> Self {
        info!(
            "Risk monitor using {} enumerator and {} endpoints",
            enumerator.name(),
            sink.kind()
        );

        Self {
            enumerator,
            state: Mutex::new(MonitorState {
                registry: Registry::new(),
                sink,
                closed: false,
            }),
            metrics: MonitorMetrics::new(),
        }
    }

    /// Run one sampling cycle.
    ///
    /// The lock is held from the process snapshot until the last stale
    /// entity is gone. On enumeration failure the registry is left exactly
    /// as it was.
    pub fn run_cycle(&self) -> MonitorResult<CycleReport> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(MonitorError::Closed);
        }

        let started = Instant::now();
        let table = match self.enumerator.snapshot() {
            Ok(table) => table,
            Err(e) => {
                // Logged once by whoever drives the cycle
                self.metrics.record_failure();
                return Err(e.into());
            }
        };

        let state = &mut *state;
        let report = state.registry.reconcile(&table, state.sink.as_mut());
        let elapsed = started.elapsed();
        self.metrics.record_cycle(&report, elapsed);

        debug!(
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            publish_failures = report.publish_failures,
            tracked = report.tracked,
            elapsed_ms = elapsed.as_millis() as u64,
            "Cycle complete"
        );

        Ok(report)
    }

    /// Current report for `pid`, formatted under the lock
    pub fn read_endpoint(&self, pid: u32) -> MonitorResult<String> {
        self.snapshot(pid).map(|snapshot| snapshot.render())
    }

    /// Consistent copy of one entity
    pub fn snapshot(&self, pid: u32) -> MonitorResult<EntitySnapshot> {
        let state = self.state.lock();
        state
            .registry
            .get(pid)
            .map(|entity| entity.snapshot())
            .ok_or(MonitorError::NoSuchProcess(pid))
    }

    /// Open a handle to the endpoint of `pid`
    pub fn open_endpoint(self: &Arc<Self>, pid: u32) -> MonitorResult<EndpointHandle> {
        let generation = self
            .state
            .lock()
            .registry
            .get(pid)
            .map(|entity| entity.generation())
            .ok_or(MonitorError::NoSuchProcess(pid))?;

        Ok(EndpointHandle {
            pid,
            generation,
            monitor: Arc::downgrade(self),
        })
    }

    /// Report for `pid`, only if it is still the entity the handle was opened on
    fn read_generation(&self, pid: u32, generation: u64) -> MonitorResult<String> {
        let state = self.state.lock();
        state
            .registry
            .get(pid)
            .filter(|entity| entity.generation() == generation)
            .map(|entity| entity.snapshot().render())
            .ok_or(MonitorError::NoSuchProcess(pid))
    }

    /// Tracked pids, ascending
    pub fn tracked_pids(&self) -> Vec<u32> {
        self.state.lock().registry.pids()
    }

    /// Published endpoint names, ascending
    pub fn endpoint_names(&self) -> Vec<u32> {
        self.state.lock().sink.names()
    }

    /// Snapshots of every tracked entity, in enumeration order
    pub fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.state
            .lock()
            .registry
            .iter()
            .map(|entity| entity.snapshot())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Destroy every entity and endpoint, then release the namespace.
    ///
    /// Returns how many entities were destroyed. Calling it again is a no-op.
    pub fn teardown(&self) -> MonitorResult<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(0);
        }

        let state = &mut *state;
        let removed = state.registry.clear(state.sink.as_mut());
        state.closed = true;
        state.sink.close()?;

        info!("Risk monitor torn down, {} endpoints removed", removed);
        Ok(removed)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn cycles(&self) -> u64 {
        self.metrics.cycles()
    }
}

/// Open endpoint of one process
///
/// Holds no strong reference, so an open handle never keeps the monitor
/// alive. Every read reflects the latest completed cycle. Once the process
/// exits the handle stays dead, even if a new process reuses the pid.
#[derive(Debug, Clone)]
pub struct EndpointHandle {
    pid: u32,
    generation: u64,
    monitor: Weak<RiskMonitor>,
}

impl EndpointHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn read(&self) -> MonitorResult<String> {
        match self.monitor.upgrade() {
            Some(monitor) => monitor.read_generation(self.pid, self.generation),
            None => Err(MonitorError::NoSuchProcess(self.pid)),
        }
    }
}
