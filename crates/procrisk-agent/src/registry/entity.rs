//! Tracked record for one monitored process

use chrono::{DateTime, Utc};
use procrisk_common::{
    assess_risk, rss_megabytes, EntitySnapshot, MetricDeltas, ProcessSample, RawCounters,
    RiskLevel,
};

/// One monitored process and its counter history
#[derive(Debug, Clone)]
pub struct Entity {
    pid: u32,
    generation: u64,
    name: String,
    current: RawCounters,
    previous: RawCounters,
    deltas: MetricDeltas,
    mem_rss_mb: u64,
    risk: RiskLevel,
    sampled_at: DateTime<Utc>,
}

impl Entity {
    /// Start tracking a process from its first sample.
    ///
    /// With no history, `previous` equals `current` and every delta is zero.
    pub fn observe(sample: &ProcessSample, page_size: u64, at: DateTime<Utc>) -> Self {
        let mem_rss_mb = rss_megabytes(sample.resident_pages, page_size);
        let deltas = MetricDeltas::ZERO;

        Self {
            pid: sample.pid,
            generation: 0,
            name: sample.name.clone(),
            current: sample.counters,
            previous: sample.counters,
            deltas,
            mem_rss_mb,
            risk: assess_risk(&deltas, mem_rss_mb),
            sampled_at: at,
        }
    }

    /// Tag the entity with the registry generation it was created in
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Shift `current` into `previous`, take the new sample and rescore.
    ///
    /// Returns the former risk level when the tier changed.
    pub fn advance(
        &mut self,
        sample: &ProcessSample,
        page_size: u64,
        at: DateTime<Utc>,
    ) -> Option<RiskLevel> {
        self.previous = self.current;
        self.current = sample.counters;
        self.deltas = MetricDeltas::between(&self.previous, &self.current);
        self.mem_rss_mb = rss_megabytes(sample.resident_pages, page_size);
        self.sampled_at = at;

        let former = self.risk;
        self.risk = assess_risk(&self.deltas, self.mem_rss_mb);
        (former != self.risk).then_some(former)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Distinguishes this entity from earlier ones that had the same pid
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> &RawCounters {
        &self.current
    }

    pub fn previous(&self) -> &RawCounters {
        &self.previous
    }

    pub fn deltas(&self) -> &MetricDeltas {
        &self.deltas
    }

    pub fn mem_rss_mb(&self) -> u64 {
        self.mem_rss_mb
    }

    pub fn risk(&self) -> RiskLevel {
        self.risk
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            pid: self.pid,
            name: self.name.clone(),
            cpu_delta_ms: self.deltas.cpu_delta_ms,
            syscalls_delta: self.deltas.syscalls_delta,
            io_delta_kb: self.deltas.io_delta_kb,
            mem_rss_mb: self.mem_rss_mb,
            risk: self.risk,
            sampled_at: self.sampled_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample, PAGE_SIZE};

    #[test]
    fn test_first_observation_has_no_deltas() {
        let s = sample(10, "worker", 5_000, 900, 1 << 20).with_resident_pages(1000);
        let entity = Entity::observe(&s, PAGE_SIZE, Utc::now());

        assert_eq!(entity.previous(), entity.current());
        assert_eq!(*entity.deltas(), MetricDeltas::ZERO);
        assert_eq!(entity.mem_rss_mb(), 3);
        assert_eq!(entity.risk(), RiskLevel::Low);
    }

    #[test]
    fn test_first_observation_scores_memory() {
        // 200_000 pages of 4 KiB is 781 MiB
        let s = sample(10, "java", 0, 0, 0).with_resident_pages(200_000);
        let entity = Entity::observe(&s, PAGE_SIZE, Utc::now());

        assert_eq!(entity.mem_rss_mb(), 781);
        assert_eq!(entity.risk(), RiskLevel::Medium);
    }

    #[test]
    fn test_advance_shifts_and_rescores() {
        let first = sample(10, "worker", 1_000, 100, 0);
        let mut entity = Entity::observe(&first, PAGE_SIZE, Utc::now());

        // +900ms cpu, +3500 faults, +3 MiB io
        let second = sample(10, "worker", 1_900, 3_600, 3 << 20);
        let former = entity.advance(&second, PAGE_SIZE, Utc::now());

        assert_eq!(*entity.previous(), first.counters);
        assert_eq!(*entity.current(), second.counters);
        assert_eq!(entity.deltas().cpu_delta_ms, 900);
        assert_eq!(entity.deltas().syscalls_delta, 3_500);
        assert_eq!(entity.deltas().io_delta_kb, 3_072);
        assert_eq!(entity.risk(), RiskLevel::High);
        assert_eq!(former, Some(RiskLevel::Low));
    }

    #[test]
    fn test_advance_without_tier_change() {
        let first = sample(10, "idle", 0, 0, 0);
        let mut entity = Entity::observe(&first, PAGE_SIZE, Utc::now());
        assert_eq!(entity.advance(&first, PAGE_SIZE, Utc::now()), None);
    }

    #[test]
    fn test_advance_with_counter_reset_clamps() {
        let first = sample(10, "reused", 50_000, 90_000, 1 << 30);
        let mut entity = Entity::observe(&first, PAGE_SIZE, Utc::now());

        let reset = sample(10, "reused", 10, 5, 0);
        entity.advance(&reset, PAGE_SIZE, Utc::now());
        assert_eq!(*entity.deltas(), MetricDeltas::ZERO);
        assert_eq!(entity.risk(), RiskLevel::Low);
    }

    #[test]
    fn test_snapshot_copies_fields() {
        let s = sample(77, "nginx", 0, 0, 0).with_resident_pages(256);
        let entity = Entity::observe(&s, PAGE_SIZE, Utc::now());
        let snap = entity.snapshot();

        assert_eq!(snap.pid, 77);
        assert_eq!(snap.name, "nginx");
        assert_eq!(snap.mem_rss_mb, 1);
        assert_eq!(snap.risk, RiskLevel::Low);
    }
}
