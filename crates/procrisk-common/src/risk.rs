//! Weighted-threshold risk scoring
//!
//! Each metric earns 0, 1 or 2 points against a (medium, high) threshold pair.
//! Comparisons are strict: a value equal to a threshold does not cross it.
//! Total score 0 is Low, 1..=3 Medium, 4 and above High.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sampling::MetricDeltas;

/// Medium/high threshold pair for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub medium: u64,
    pub high: u64,
}

impl Thresholds {
    const fn new(medium: u64, high: u64) -> Self {
        Self { medium, high }
    }

    /// Points earned by `value`: 2 above `high`, 1 above `medium`, else 0
    pub fn points(&self, value: u64) -> u8 {
        if value > self.high {
            2
        } else if value > self.medium {
            1
        } else {
            0
        }
    }
}

pub const CPU_DELTA_MS_THRESHOLDS: Thresholds = Thresholds::new(200, 800);
pub const SYSCALLS_DELTA_THRESHOLDS: Thresholds = Thresholds::new(500, 3000);
pub const IO_DELTA_KB_THRESHOLDS: Thresholds = Thresholds::new(500, 2000);
pub const MEM_RSS_MB_THRESHOLDS: Thresholds = Thresholds::new(350, 600);

const MEDIUM_RISK_SCORE: u8 = 1;
const HIGH_RISK_SCORE: u8 = 4;

/// Risk tier of a process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Map a total score (0..=8) to a tier
    pub fn from_score(score: u8) -> Self {
        if score >= HIGH_RISK_SCORE {
            RiskLevel::High
        } else if score >= MEDIUM_RISK_SCORE {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Label used in endpoint reports
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Baixo",
            RiskLevel::Medium => "Médio",
            RiskLevel::High => "Alto",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sum of the per-metric points, in the range 0..=8
pub fn risk_score(deltas: &MetricDeltas, mem_rss_mb: u64) -> u8 {
    CPU_DELTA_MS_THRESHOLDS.points(deltas.cpu_delta_ms)
        + SYSCALLS_DELTA_THRESHOLDS.points(deltas.syscalls_delta)
        + IO_DELTA_KB_THRESHOLDS.points(deltas.io_delta_kb)
        + MEM_RSS_MB_THRESHOLDS.points(mem_rss_mb)
}

/// Score the four metrics and map the result to a tier
pub fn assess_risk(deltas: &MetricDeltas, mem_rss_mb: u64) -> RiskLevel {
    RiskLevel::from_score(risk_score(deltas, mem_rss_mb))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deltas(cpu: u64, syscalls: u64, io: u64) -> MetricDeltas {
        MetricDeltas {
            cpu_delta_ms: cpu,
            syscalls_delta: syscalls,
            io_delta_kb: io,
        }
    }

    fn check_points(thresholds: &Thresholds, cases: &[(u64, u8)]) {
        for &(value, expected) in cases {
            assert_eq!(
                thresholds.points(value),
                expected,
                "value {} against {:?}",
                value,
                thresholds
            );
        }
    }

    #[test]
    fn test_cpu_points() {
        check_points(
            &CPU_DELTA_MS_THRESHOLDS,
            &[(0, 0), (200, 0), (201, 1), (800, 1), (801, 2)],
        );
    }

    #[test]
    fn test_syscall_points() {
        check_points(
            &SYSCALLS_DELTA_THRESHOLDS,
            &[(500, 0), (501, 1), (3000, 1), (3001, 2)],
        );
    }

    #[test]
    fn test_io_points() {
        check_points(&IO_DELTA_KB_THRESHOLDS, &[(500, 0), (2000, 1), (2001, 2)]);
    }

    #[test]
    fn test_memory_points() {
        check_points(
            &MEM_RSS_MB_THRESHOLDS,
            &[(350, 0), (351, 1), (600, 1), (601, 2)],
        );
    }

    #[test]
    fn test_single_high_metric_is_medium() {
        let d = deltas(900, 0, 0);
        assert_eq!(risk_score(&d, 0), 2);
        assert_eq!(assess_risk(&d, 0), RiskLevel::Medium);
    }

    #[test]
    fn test_everything_high_is_max_score() {
        let d = deltas(801, 3001, 2001);
        assert_eq!(risk_score(&d, 601), 8);
        assert_eq!(assess_risk(&d, 601), RiskLevel::High);
    }

    #[test]
    fn test_idle_is_low() {
        assert_eq!(risk_score(&MetricDeltas::ZERO, 0), 0);
        assert_eq!(assess_risk(&MetricDeltas::ZERO, 0), RiskLevel::Low);
    }

    #[test]
    fn test_score_mapping() {
        let cases = [
            (0, RiskLevel::Low),
            (1, RiskLevel::Medium),
            (3, RiskLevel::Medium),
            (4, RiskLevel::High),
            (8, RiskLevel::High),
        ];
        for (score, expected) in cases {
            assert_eq!(RiskLevel::from_score(score), expected, "score {}", score);
        }
    }

    #[test]
    fn test_four_medium_metrics_are_high() {
        let d = deltas(201, 501, 501);
        assert_eq!(risk_score(&d, 351), 4);
        assert_eq!(assess_risk(&d, 351), RiskLevel::High);
    }

    #[test]
    fn test_labels() {
        assert_eq!(RiskLevel::Low.to_string(), "Baixo");
        assert_eq!(RiskLevel::Medium.to_string(), "Médio");
        assert_eq!(RiskLevel::High.to_string(), "Alto");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&RiskLevel::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }
}
