//! Per-process inspection endpoints
//!
//! One read-only endpoint is published per tracked process, named by its
//! PID. Sinks only manage the endpoint namespace; the registry drives every
//! create and remove.

mod directory;

pub use directory::DirectorySink;

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use procrisk_common::EntitySnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while publishing or removing endpoints
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Endpoint for pid {0} is already published")]
    AlreadyPublished(u32),

    #[error("Endpoint namespace is closed")]
    Closed,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type EndpointResult<T> = Result<T, EndpointError>;

/// Backend that owns the set of published endpoint names
pub trait EndpointSink: Send {
    /// Short backend name for logs
    fn kind(&self) -> &'static str;

    /// Publish a new endpoint for `snapshot.pid`
    fn create(&mut self, snapshot: &EntitySnapshot) -> EndpointResult<()>;

    /// Called after every update of an already published entity
    fn refresh(&mut self, _snapshot: &EntitySnapshot) -> EndpointResult<()> {
        Ok(())
    }

    /// Remove the endpoint for `pid`, if published
    fn remove(&mut self, pid: u32);

    fn contains(&self, pid: u32) -> bool;

    /// Published endpoint names, ascending
    fn names(&self) -> Vec<u32>;

    /// Release the namespace itself. Remaining endpoints are dropped.
    fn close(&mut self) -> EndpointResult<()>;
}

/// Which sink the daemon publishes into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    /// In-process only, readable through the monitor API
    Memory,
    /// One report file per process under a root directory
    #[default]
    Directory,
}

impl PublisherKind {
    /// Open the selected sink. `root` is only used by the directory sink.
    pub fn open(self, root: &Path) -> EndpointResult<Box<dyn EndpointSink>> {
        match self {
            PublisherKind::Memory => Ok(Box::new(MemorySink::new())),
            PublisherKind::Directory => Ok(Box::new(DirectorySink::open(root)?)),
        }
    }
}

impl FromStr for PublisherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(PublisherKind::Memory),
            "directory" | "dir" => Ok(PublisherKind::Directory),
            other => Err(format!("unknown publisher '{}'", other)),
        }
    }
}

impl fmt::Display for PublisherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherKind::Memory => f.write_str("memory"),
            PublisherKind::Directory => f.write_str("directory"),
        }
    }
}

/// In-memory endpoint namespace
#[derive(Debug, Default)]
pub struct MemorySink {
    published: BTreeSet<u32>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.is_empty()
    }
}

impl EndpointSink for MemorySink {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn create(&mut self, snapshot: &EntitySnapshot) -> EndpointResult<()> {
        if self.closed {
            return Err(EndpointError::Closed);
        }
        if !self.published.insert(snapshot.pid) {
            return Err(EndpointError::AlreadyPublished(snapshot.pid));
        }
        Ok(())
    }

    fn remove(&mut self, pid: u32) {
        self.published.remove(&pid);
    }

    fn contains(&self, pid: u32) -> bool {
        self.published.contains(&pid)
    }

    fn names(&self) -> Vec<u32> {
        self.published.iter().copied().collect()
    }

    fn close(&mut self) -> EndpointResult<()> {
        self.published.clear();
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::snapshot;

    #[test]
    fn test_memory_sink_create_and_remove() {
        let mut sink = MemorySink::new();
        sink.create(&snapshot(30)).unwrap();
        sink.create(&snapshot(10)).unwrap();

        assert!(sink.contains(10));
        assert_eq!(sink.names(), vec![10, 30]);

        sink.remove(10);
        assert!(!sink.contains(10));
        assert_eq!(sink.len(), 1);

        // Removing twice is harmless
        sink.remove(10);
        assert_eq!(sink.names(), vec![30]);
    }

    #[test]
    fn test_memory_sink_rejects_duplicate() {
        let mut sink = MemorySink::new();
        sink.create(&snapshot(5)).unwrap();
        assert!(matches!(
            sink.create(&snapshot(5)),
            Err(EndpointError::AlreadyPublished(5))
        ));
    }

    #[test]
    fn test_memory_sink_closed() {
        let mut sink = MemorySink::new();
        sink.create(&snapshot(5)).unwrap();
        sink.close().unwrap();

        assert!(sink.is_empty());
        assert!(matches!(sink.create(&snapshot(6)), Err(EndpointError::Closed)));
    }

    #[test]
    fn test_publisher_kind_parse() {
        assert_eq!("memory".parse::<PublisherKind>(), Ok(PublisherKind::Memory));
        assert_eq!("Dir".parse::<PublisherKind>(), Ok(PublisherKind::Directory));
        assert!("proc".parse::<PublisherKind>().is_err());
    }

    #[test]
    fn test_publisher_kind_open() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("process_risk");

        let memory = PublisherKind::Memory.open(&root).unwrap();
        assert_eq!(memory.kind(), "memory");
        assert!(!root.exists());

        let directory = PublisherKind::Directory.open(&root).unwrap();
        assert_eq!(directory.kind(), "directory");
        assert!(root.is_dir());
    }
}
