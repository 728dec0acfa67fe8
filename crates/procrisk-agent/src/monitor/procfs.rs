//! Linux /proc based process enumerator
//!
//! Reads `/proc/<pid>/stat` for CPU times, fault counts and resident pages,
//! and `/proc/<pid>/io` for storage I/O byte counters.

use std::fs;
use std::path::{Path, PathBuf};

use procrisk_common::{PlatformError, PlatformResult, ProcessSample, ProcessTable, RawCounters};
use tracing::trace;

use super::{system_page_size, ProcessEnumerator};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Kernel thread flag in the `flags` field of /proc/<pid>/stat
const PF_KTHREAD: u64 = 0x0020_0000;

/// Process enumerator using /proc (Linux)
pub struct ProcfsEnumerator {
    proc_root: PathBuf,
    clock_ticks: u64,
    page_size: u64,
}

/// Fields of interest from /proc/<pid>/stat
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatFields {
    pub pid: u32,
    pub comm: String,
    pub flags: u64,
    pub minflt: u64,
    pub majflt: u64,
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub rss_pages: u64,
}

impl ProcfsEnumerator {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Enumerate a procfs mounted (or mirrored) somewhere other than /proc
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self::with_params(root, clock_ticks_per_sec(), system_page_size())
    }

    pub fn with_params(root: impl Into<PathBuf>, clock_ticks: u64, page_size: u64) -> Self {
        Self {
            proc_root: root.into(),
            clock_ticks: clock_ticks.max(1),
            page_size,
        }
    }

    fn ticks_to_ns(&self, ticks: u64) -> u64 {
        let ns = ticks as u128 * NANOS_PER_SEC / self.clock_ticks as u128;
        u64::try_from(ns).unwrap_or(u64::MAX)
    }

    /// Read one process; an error usually means it exited mid-read
    fn read_process(&self, pid_dir: &Path) -> PlatformResult<ProcessSample> {
        let stat_path = pid_dir.join("stat");
        let stat = fs::read_to_string(&stat_path).map_err(|e| {
            PlatformError::CollectionFailed(format!("Failed to read {}: {}", stat_path.display(), e))
        })?;
        let fields = parse_stat(&stat)?;

        // Other users' io files are unreadable without privileges
        let (read_bytes, write_bytes) = fs::read_to_string(pid_dir.join("io"))
            .map(|content| parse_io(&content))
            .unwrap_or((0, 0));

        let counters = RawCounters {
            utime_ns: self.ticks_to_ns(fields.utime_ticks),
            stime_ns: self.ticks_to_ns(fields.stime_ticks),
            read_bytes,
            write_bytes,
            minor_faults: fields.minflt,
            major_faults: fields.majflt,
        };

        let sample = ProcessSample::new(fields.pid, &fields.comm, counters);
        if fields.flags & PF_KTHREAD != 0 {
            Ok(sample)
        } else {
            Ok(sample.with_resident_pages(fields.rss_pages))
        }
    }
}

impl Default for ProcfsEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEnumerator for ProcfsEnumerator {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn snapshot(&self) -> PlatformResult<ProcessTable> {
        let proc_dir = match fs::read_dir(&self.proc_root) {
            Ok(dir) => dir,
            Err(e) => {
                return Err(PlatformError::CollectionFailed(format!(
                    "Failed to read {}: {}",
                    self.proc_root.display(),
                    e
                )))
            }
        };

        let mut processes = Vec::new();

        for entry in proc_dir.flatten() {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            // Only numeric directories are processes
            if name_str.is_empty() || !name_str.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            match self.read_process(&entry.path()) {
                Ok(sample) => processes.push(sample),
                Err(e) => trace!("Skipping /proc/{}: {}", name_str, e),
            }
        }

        processes.sort_by_key(|p| p.pid);
        Ok(ProcessTable::new(self.page_size, processes))
    }
}

/// Parse the contents of /proc/<pid>/stat
///
/// `comm` is wrapped in parentheses and may itself contain spaces or `)`,
/// so fields are located relative to the last `)`.
pub(crate) fn parse_stat(content: &str) -> PlatformResult<StatFields> {
    let open = content
        .find('(')
        .ok_or_else(|| PlatformError::Malformed("missing '(' in stat".to_string()))?;
    let close = content
        .rfind(')')
        .ok_or_else(|| PlatformError::Malformed("missing ')' in stat".to_string()))?;
    if close < open {
        return Err(PlatformError::Malformed("unbalanced comm in stat".to_string()));
    }

    let pid = content[..open]
        .trim()
        .parse::<u32>()
        .map_err(|_| PlatformError::Malformed("invalid pid in stat".to_string()))?;
    let comm = content[open + 1..close].to_string();

    // Field 3 (state) is index 0 here
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if rest.len() < 22 {
        return Err(PlatformError::Malformed(format!(
            "stat for pid {} has {} fields after comm",
            pid,
            rest.len()
        )));
    }

    let field = |idx: usize, label: &str| -> PlatformResult<u64> {
        rest[idx]
            .parse::<u64>()
            .map_err(|_| PlatformError::Malformed(format!("invalid {} in stat", label)))
    };

    // rss is a signed long in the kernel
    let rss_pages = rest[21]
        .parse::<i64>()
        .map_err(|_| PlatformError::Malformed("invalid rss in stat".to_string()))?
        .max(0) as u64;

    Ok(StatFields {
        pid,
        comm,
        flags: field(6, "flags")?,
        minflt: field(7, "minflt")?,
        majflt: field(9, "majflt")?,
        utime_ticks: field(11, "utime")?,
        stime_ticks: field(12, "stime")?,
        rss_pages,
    })
}

/// Parse `read_bytes` and `write_bytes` from /proc/<pid>/io
pub(crate) fn parse_io(content: &str) -> (u64, u64) {
    let mut read_bytes = 0;
    let mut write_bytes = 0;

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().parse::<u64>().unwrap_or(0);
            match key.trim() {
                "read_bytes" => read_bytes = value,
                "write_bytes" => write_bytes = value,
                _ => {}
            }
        }
    }

    (read_bytes, write_bytes)
}

#[cfg(unix)]
fn clock_ticks_per_sec() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        100
    }
}

#[cfg(not(unix))]
fn clock_ticks_per_sec() -> u64 {
    100
}
