//! Process enumeration backends
//!
//! A backend produces one immutable [`ProcessTable`] per call: every live
//! process with its raw cumulative counters. The snapshot is best-effort;
//! processes born or reaped during enumeration may be missed.

mod procfs;
mod sysinfo_monitor;

pub use procfs::ProcfsEnumerator;
pub use sysinfo_monitor::SysinfoEnumerator;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use procrisk_common::{PlatformError, PlatformResult, ProcessTable};
use serde::{Deserialize, Serialize};

/// Trait for process enumeration backends
pub trait ProcessEnumerator: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Take a snapshot of every live process
    fn snapshot(&self) -> PlatformResult<ProcessTable>;
}

impl<T: ProcessEnumerator + ?Sized> ProcessEnumerator for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn snapshot(&self) -> PlatformResult<ProcessTable> {
        (**self).snapshot()
    }
}

/// Which enumeration backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumeratorKind {
    /// procfs on Linux, sysinfo elsewhere
    #[default]
    Auto,
    Procfs,
    Sysinfo,
}

impl EnumeratorKind {
    /// Instantiate the selected backend
    pub fn build(self) -> PlatformResult<Box<dyn ProcessEnumerator>> {
        match self {
            EnumeratorKind::Auto => Ok(default_enumerator()),
            EnumeratorKind::Procfs => {
                if cfg!(target_os = "linux") {
                    Ok(Box::new(ProcfsEnumerator::new()))
                } else {
                    Err(PlatformError::NotSupported(
                        "procfs enumeration is only available on Linux".to_string(),
                    ))
                }
            }
            EnumeratorKind::Sysinfo => Ok(Box::new(SysinfoEnumerator::new())),
        }
    }
}

impl FromStr for EnumeratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(EnumeratorKind::Auto),
            "procfs" => Ok(EnumeratorKind::Procfs),
            "sysinfo" => Ok(EnumeratorKind::Sysinfo),
            other => Err(format!("unknown enumerator '{}'", other)),
        }
    }
}

impl fmt::Display for EnumeratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnumeratorKind::Auto => "auto",
            EnumeratorKind::Procfs => "procfs",
            EnumeratorKind::Sysinfo => "sysinfo",
        };
        f.write_str(name)
    }
}

/// Best backend for the current platform
#[cfg(target_os = "linux")]
pub fn default_enumerator() -> Box<dyn ProcessEnumerator> {
    Box::new(ProcfsEnumerator::new())
}

/// Best backend for the current platform
#[cfg(not(target_os = "linux"))]
pub fn default_enumerator() -> Box<dyn ProcessEnumerator> {
    Box::new(SysinfoEnumerator::new())
}

/// System page size in bytes
#[cfg(unix)]
pub(crate) fn system_page_size() -> u64 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

#[cfg(not(unix))]
pub(crate) fn system_page_size() -> u64 {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerator_kind_parse() {
        assert_eq!("auto".parse::<EnumeratorKind>(), Ok(EnumeratorKind::Auto));
        assert_eq!(" ProcFS ".parse::<EnumeratorKind>(), Ok(EnumeratorKind::Procfs));
        assert_eq!("sysinfo".parse::<EnumeratorKind>(), Ok(EnumeratorKind::Sysinfo));
        assert!("ebpf".parse::<EnumeratorKind>().is_err());
    }

    #[test]
    fn test_page_size_is_sane() {
        let size = system_page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_default_enumerator_sees_self() {
        let enumerator = default_enumerator();
        let table = enumerator.snapshot().unwrap();
        let me = std::process::id();
        assert!(table.processes.iter().any(|p| p.pid == me));
    }
}
