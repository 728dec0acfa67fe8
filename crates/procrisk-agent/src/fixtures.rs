//! Shared test fixtures: deterministic enumerator, failure-injecting sink,
//! log capture

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use procrisk_common::{
    EntitySnapshot, PlatformError, PlatformResult, ProcessSample, ProcessTable, RawCounters,
    RiskLevel,
};

use crate::endpoint::{EndpointError, EndpointResult, EndpointSink, MemorySink};
use crate::monitor::ProcessEnumerator;

pub const PAGE_SIZE: u64 = 4096;

/// Sample with CPU time in milliseconds, faults split as all-minor, I/O as all-read
pub fn sample(pid: u32, name: &str, cpu_ms: u64, faults: u64, io_bytes: u64) -> ProcessSample {
    ProcessSample::new(
        pid,
        name,
        RawCounters {
            utime_ns: cpu_ms * 1_000_000,
            stime_ns: 0,
            read_bytes: io_bytes,
            write_bytes: 0,
            minor_faults: faults,
            major_faults: 0,
        },
    )
}

/// Idle process sample
pub fn idle(pid: u32) -> ProcessSample {
    sample(pid, &format!("proc{}", pid), 0, 0, 0)
}

pub fn table(processes: Vec<ProcessSample>) -> ProcessTable {
    ProcessTable::new(PAGE_SIZE, processes)
}

pub fn snapshot(pid: u32) -> EntitySnapshot {
    EntitySnapshot {
        pid,
        name: format!("proc{}", pid),
        cpu_delta_ms: 0,
        syscalls_delta: 0,
        io_delta_kb: 0,
        mem_rss_mb: 0,
        risk: RiskLevel::Low,
        sampled_at: Utc::now(),
    }
}

// ============================================================================
// Mock Process Enumerator
// ============================================================================

/// Enumerator whose process table is replaced by the test between cycles
pub struct MockEnumerator {
    processes: RwLock<Vec<ProcessSample>>,
    fail_next: AtomicBool,
    snapshots: AtomicU64,
    in_flight: AtomicBool,
    delay: Duration,
}

impl MockEnumerator {
    pub fn new(processes: Vec<ProcessSample>) -> Self {
        Self {
            processes: RwLock::new(processes),
            fail_next: AtomicBool::new(false),
            snapshots: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
            delay: Duration::ZERO,
        }
    }

    /// Make every snapshot take `delay`, simulating a slow process table walk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, processes: Vec<ProcessSample>) {
        *self.processes.write() = processes;
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn snapshot_count(&self) -> u64 {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl ProcessEnumerator for MockEnumerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn snapshot(&self) -> PlatformResult<ProcessTable> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PlatformError::CollectionFailed("injected failure".to_string()));
        }

        self.in_flight.store(true, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let processes = self.processes.read().clone();
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);

        Ok(table(processes))
    }
}

// ============================================================================
// Failure-injecting sink
// ============================================================================

/// Memory sink that refuses to publish selected pids
#[derive(Default)]
pub struct FailingSink {
    inner: MemorySink,
    refuse: HashSet<u32>,
    panic_on_close: bool,
    pub create_attempts: u64,
}

impl FailingSink {
    pub fn refusing(pids: &[u32]) -> Self {
        Self {
            inner: MemorySink::new(),
            refuse: pids.iter().copied().collect(),
            panic_on_close: false,
            create_attempts: 0,
        }
    }

    /// Sink that publishes everything but panics when released
    pub fn panicking_on_close() -> Self {
        Self {
            panic_on_close: true,
            ..Self::default()
        }
    }

    pub fn allow(&mut self, pid: u32) {
        self.refuse.remove(&pid);
    }
}

impl EndpointSink for FailingSink {
    fn kind(&self) -> &'static str {
        "failing"
    }

    fn create(&mut self, snapshot: &EntitySnapshot) -> EndpointResult<()> {
        self.create_attempts += 1;
        if self.refuse.contains(&snapshot.pid) {
            return Err(EndpointError::Io {
                path: format!("/endpoints/{}", snapshot.pid).into(),
                source: std::io::Error::new(std::io::ErrorKind::OutOfMemory, "injected"),
            });
        }
        self.inner.create(snapshot)
    }

    fn remove(&mut self, pid: u32) {
        self.inner.remove(pid)
    }

    fn contains(&self, pid: u32) -> bool {
        self.inner.contains(pid)
    }

    fn names(&self) -> Vec<u32> {
        self.inner.names()
    }

    fn close(&mut self) -> EndpointResult<()> {
        if self.panic_on_close {
            panic!("injected close panic");
        }
        self.inner.close()
    }
}

// ============================================================================
// Log capture
// ============================================================================

/// Collects formatted log output from a scoped subscriber
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let capture = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Number of captured lines at ERROR level
    pub fn errors(&self) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains("ERROR"))
            .count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
