//! Observability for the risk monitor
//!
//! Metrics collection for cycle throughput, entity churn and latency.

mod metrics;

pub use metrics::*;
