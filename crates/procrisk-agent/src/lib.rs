//! procrisk-agent library
//!
//! Core components of the per-process risk telemetry daemon: process
//! enumeration, the entity registry, endpoint publishing and the cycle
//! scheduler.

pub mod config;
pub mod endpoint;
pub mod engine;
pub mod monitor;
pub mod observability;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod fixtures;

pub use config::{CliArgs, MonitorConfig};
pub use endpoint::{DirectorySink, EndpointError, EndpointSink, MemorySink, PublisherKind};
pub use engine::{EndpointHandle, MonitorError, MonitorResult, RiskMonitor};
pub use monitor::{default_enumerator, EnumeratorKind, ProcessEnumerator};
pub use registry::{CycleReport, Registry};
pub use scheduler::{Scheduler, SchedulerConfig};
