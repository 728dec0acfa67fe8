//! Sysinfo-based process enumerator (cross-platform fallback)
//!
//! Uses the sysinfo crate to poll process information. Fault counters are not
//! exposed by sysinfo, so the page-fault based syscall approximation always
//! reads 0 with this backend.

use parking_lot::RwLock;
use procrisk_common::{PlatformResult, ProcessSample, ProcessTable, RawCounters};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use super::{system_page_size, ProcessEnumerator};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Process enumerator using the sysinfo crate
pub struct SysinfoEnumerator {
    system: RwLock<System>,
    page_size: u64,
}

impl SysinfoEnumerator {
    pub fn new() -> Self {
        Self {
            system: RwLock::new(System::new()),
            page_size: system_page_size(),
        }
    }

    /// Convert a sysinfo process into a raw sample
    fn convert_process(pid: u32, proc: &sysinfo::Process, page_size: u64) -> ProcessSample {
        let disk = proc.disk_usage();
        let counters = RawCounters {
            // sysinfo does not split user and system time
            utime_ns: proc.accumulated_cpu_time().saturating_mul(NANOS_PER_MILLI),
            stime_ns: 0,
            read_bytes: disk.total_read_bytes,
            write_bytes: disk.total_written_bytes,
            minor_faults: 0,
            major_faults: 0,
        };

        ProcessSample::new(pid, proc.name().to_string_lossy(), counters)
            .with_resident_pages(proc.memory() / page_size.max(1))
    }
}

impl Default for SysinfoEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEnumerator for SysinfoEnumerator {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    fn snapshot(&self) -> PlatformResult<ProcessTable> {
        let mut system = self.system.write();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_disk_usage(),
        );

        let mut processes: Vec<ProcessSample> = system
            .processes()
            .iter()
            .map(|(pid, proc)| Self::convert_process(pid.as_u32(), proc, self.page_size))
            .collect();
        processes.sort_by_key(|p| p.pid);

        Ok(ProcessTable::new(self.page_size, processes))
    }
}
