//! Fixed-schema endpoint report for one tracked process

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;

/// Consistent copy of one entity's externally visible fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub pid: u32,
    pub name: String,
    pub cpu_delta_ms: u64,
    /// Page-fault based approximation, see [`crate::MetricDeltas::syscalls_delta`]
    pub syscalls_delta: u64,
    pub io_delta_kb: u64,
    pub mem_rss_mb: u64,
    pub risk: RiskLevel,
    pub sampled_at: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Render the plain-text report served by an endpoint.
    ///
    /// Labels and field order are part of the external contract.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EntitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PID: {}", self.pid)?;
        writeln!(f, "Nome: {}", self.name)?;
        writeln!(f, "Uso de CPU (delta ms/5s): {}", self.cpu_delta_ms)?;
        writeln!(f, "Chamadas de Sistema (delta aprox/5s): {}", self.syscalls_delta)?;
        writeln!(f, "E/S Total (delta KB/5s): {}", self.io_delta_kb)?;
        writeln!(f, "Memória (MB): {}", self.mem_rss_mb)?;
        writeln!(f, "Risco: {}", self.risk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_layout() {
        let snapshot = EntitySnapshot {
            pid: 4242,
            name: "postgres".to_string(),
            cpu_delta_ms: 912,
            syscalls_delta: 37,
            io_delta_kb: 1024,
            mem_rss_mb: 410,
            risk: RiskLevel::High,
            sampled_at: Utc::now(),
        };

        let expected = "PID: 4242\n\
                        Nome: postgres\n\
                        Uso de CPU (delta ms/5s): 912\n\
                        Chamadas de Sistema (delta aprox/5s): 37\n\
                        E/S Total (delta KB/5s): 1024\n\
                        Memória (MB): 410\n\
                        Risco: Alto\n";
        assert_eq!(snapshot.render(), expected);
    }
}
