//! Interval delta computation between two counter samples
//!
//! Cumulative counters are converted into per-interval deltas. Every delta is
//! clamped at zero: a counter that appears to go backwards (reset, PID reuse,
//! wraparound) yields 0 for that metric rather than underflowing.

use serde::{Deserialize, Serialize};

use crate::sample::RawCounters;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Per-interval metrics derived from two consecutive samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDeltas {
    /// User + system CPU time consumed during the interval, in milliseconds
    pub cpu_delta_ms: u64,
    /// Approximate system call activity: the page fault delta (minor +
    /// major), not a syscall count.
    pub syscalls_delta: u64,
    /// Bytes read + written during the interval, in KiB
    pub io_delta_kb: u64,
}

impl MetricDeltas {
    /// Deltas for an entity with no history yet
    pub const ZERO: MetricDeltas = MetricDeltas {
        cpu_delta_ms: 0,
        syscalls_delta: 0,
        io_delta_kb: 0,
    };

    /// Compute deltas from `previous` to `current`
    pub fn between(previous: &RawCounters, current: &RawCounters) -> Self {
        let cpu_delta_ns = current.cpu_ns().saturating_sub(previous.cpu_ns());
        let faults = current.faults().saturating_sub(previous.faults());
        let io_bytes = current.io_bytes().saturating_sub(previous.io_bytes());

        Self {
            cpu_delta_ms: cpu_delta_ns / NANOS_PER_MILLI,
            syscalls_delta: faults,
            io_delta_kb: io_bytes >> 10,
        }
    }
}

/// Resident memory in MiB; `None` pages (no address space) reads as 0
pub fn rss_megabytes(resident_pages: Option<u64>, page_size: u64) -> u64 {
    resident_pages
        .map(|pages| pages.saturating_mul(page_size) >> 20)
        .unwrap_or(0)
}
