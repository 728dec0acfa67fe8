//! Filesystem endpoint namespace
//!
//! Each endpoint is a read-only file `<root>/<pid>` holding the rendered
//! report. Reports are replaced by write-then-rename so a reader opening the
//! file sees either the previous or the next report, never a partial one.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use procrisk_common::EntitySnapshot;
use tracing::{debug, info, warn};

use super::{EndpointError, EndpointResult, EndpointSink};

/// Endpoint sink that mirrors reports into a directory
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    published: BTreeSet<u32>,
    closed: bool,
}

impl DirectorySink {
    /// Create (or reuse) `root`, purging report files left by an earlier run
    pub fn open(root: impl Into<PathBuf>) -> EndpointResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| EndpointError::Io {
            path: root.clone(),
            source,
        })?;

        let sink = Self {
            root,
            published: BTreeSet::new(),
            closed: false,
        };
        let purged = sink.purge_stale()?;
        if purged > 0 {
            info!("Purged {} stale endpoint files from {}", purged, sink.root.display());
        }

        Ok(sink)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn temp_path_for(&self, pid: u32) -> PathBuf {
        self.root.join(format!(".{}.tmp", pid))
    }

    fn purge_stale(&self) -> EndpointResult<usize> {
        let entries = fs::read_dir(&self.root).map_err(|source| EndpointError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut purged = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if is_endpoint_file_name(&name.to_string_lossy()) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("Failed to purge {}: {}", entry.path().display(), e);
                } else {
                    purged += 1;
                }
            }
        }

        Ok(purged)
    }

    fn write_report(&self, snapshot: &EntitySnapshot) -> EndpointResult<()> {
        let tmp = self.temp_path_for(snapshot.pid);
        fs::write(&tmp, snapshot.render())
            .and_then(|_| set_read_only(&tmp))
            .map_err(|source| EndpointError::Io {
                path: tmp.clone(),
                source,
            })?;

        let target = self.path_for(snapshot.pid);
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(EndpointError::Io {
                path: target,
                source: e,
            });
        }
        Ok(())
    }
}

impl EndpointSink for DirectorySink {
    fn kind(&self) -> &'static str {
        "directory"
    }

    fn create(&mut self, snapshot: &EntitySnapshot) -> EndpointResult<()> {
        if self.closed {
            return Err(EndpointError::Closed);
        }
        if self.published.contains(&snapshot.pid) {
            return Err(EndpointError::AlreadyPublished(snapshot.pid));
        }

        self.write_report(snapshot)?;
        self.published.insert(snapshot.pid);
        Ok(())
    }

    fn refresh(&mut self, snapshot: &EntitySnapshot) -> EndpointResult<()> {
        if !self.published.contains(&snapshot.pid) {
            return Ok(());
        }
        self.write_report(snapshot)
    }

    fn remove(&mut self, pid: u32) {
        if !self.published.remove(&pid) {
            return;
        }
        let path = self.path_for(pid);
        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to remove endpoint {}: {}", path.display(), e);
        }
    }

    fn contains(&self, pid: u32) -> bool {
        self.published.contains(&pid)
    }

    fn names(&self) -> Vec<u32> {
        self.published.iter().copied().collect()
    }

    fn close(&mut self) -> EndpointResult<()> {
        if self.closed {
            return Ok(());
        }

        let remaining: Vec<u32> = self.names();
        for pid in remaining {
            self.remove(pid);
        }
        self.closed = true;

        fs::remove_dir(&self.root).map_err(|source| EndpointError::Io {
            path: self.root.clone(),
            source,
        })?;
        debug!("Removed endpoint directory {}", self.root.display());
        Ok(())
    }
}

/// `<pid>` report files and `.<pid>.tmp` leftovers
fn is_endpoint_file_name(name: &str) -> bool {
    let digits = name
        .strip_prefix('.')
        .and_then(|n| n.strip_suffix(".tmp"))
        .unwrap_or(name);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(unix)]
fn set_read_only(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o444))
}

#[cfg(not(unix))]
fn set_read_only(path: &Path) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)
}
