//! Raw per-process samples as supplied by a process enumerator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest display name kept for a process (kernel `comm` is 16 bytes with NUL)
pub const MAX_DISPLAY_NAME: usize = 15;

/// Cumulative counters read from one process at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCounters {
    /// CPU time spent in user mode, in nanoseconds
    pub utime_ns: u64,
    /// CPU time spent in kernel mode, in nanoseconds
    pub stime_ns: u64,
    /// Bytes fetched from the storage layer
    pub read_bytes: u64,
    /// Bytes sent to the storage layer
    pub write_bytes: u64,
    /// Minor page faults
    pub minor_faults: u64,
    /// Major page faults
    pub major_faults: u64,
}

impl RawCounters {
    pub fn cpu_ns(&self) -> u64 {
        self.utime_ns.saturating_add(self.stime_ns)
    }

    pub fn io_bytes(&self) -> u64 {
        self.read_bytes.saturating_add(self.write_bytes)
    }

    pub fn faults(&self) -> u64 {
        self.minor_faults.saturating_add(self.major_faults)
    }
}

/// One live process as seen by an enumerator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSample {
    /// Operating system process ID
    pub pid: u32,
    /// Short process name
    pub name: String,
    /// Cumulative counters at sampling time
    pub counters: RawCounters,
    /// Resident pages, `None` when the process has no address space (kernel threads)
    pub resident_pages: Option<u64>,
}

impl ProcessSample {
    /// Create a sample, truncating the name to [`MAX_DISPLAY_NAME`] characters
    pub fn new(pid: u32, name: impl AsRef<str>, counters: RawCounters) -> Self {
        Self {
            pid,
            name: truncate_name(name.as_ref()),
            counters,
            resident_pages: None,
        }
    }

    pub fn with_resident_pages(mut self, pages: u64) -> Self {
        self.resident_pages = Some(pages);
        self
    }
}

/// Immutable point-in-time view of the process table, taken once per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTable {
    /// Page size in bytes used to convert resident pages
    pub page_size: u64,
    /// When the enumeration finished
    pub taken_at: DateTime<Utc>,
    /// Live processes in enumeration order
    pub processes: Vec<ProcessSample>,
}

impl ProcessTable {
    pub fn new(page_size: u64, processes: Vec<ProcessSample>) -> Self {
        Self {
            page_size,
            taken_at: Utc::now(),
            processes,
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_DISPLAY_NAME).collect()
}
