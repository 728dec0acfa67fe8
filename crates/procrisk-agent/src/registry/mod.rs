//! Entity registry and the per-cycle reconciliation pass
//!
//! The registry is the single source of truth for what is monitored. Each
//! cycle the previous entities are moved into a working set, every live
//! process is matched against it (update) or added (create + publish), and
//! whatever is left in the working set afterwards is stale and destroyed.

mod entity;


pub use entity::Entity;

use std::collections::HashMap;

use procrisk_common::{ProcessTable, RiskLevel};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::endpoint::EndpointSink;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// New entities tracked and published this cycle
    pub created: usize,
    /// Existing entities resampled this cycle
    pub updated: usize,
    /// Stale entities destroyed this cycle
    pub removed: usize,
    /// New processes left untracked because their endpoint could not be created
    pub publish_failures: usize,
    /// Repeated pids inside one snapshot, ignored after the first
    pub duplicates: usize,
    /// Entities tracked after the cycle
    pub tracked: usize,
}

/// Ordered pid -> entity mapping, in enumeration order
#[derive(Debug, Default)]
pub struct Registry {
    entities: Vec<Entity>,
    index: HashMap<u32, usize>,
    next_generation: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, pid: u32) -> Option<&Entity> {
        self.index.get(&pid).map(|&i| &self.entities[i])
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.index.contains_key(&pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Tracked pids, ascending
    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.index.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    fn push(&mut self, entity: Entity) {
        self.index.insert(entity.pid(), self.entities.len());
        self.entities.push(entity);
    }

    /// Bring the registry and the published endpoints in line with `table`.
    ///
    /// All live processes are handled before any stale entity is destroyed,
    /// so no entity is both updated and removed in the same pass.
    pub fn reconcile(&mut self, table: &ProcessTable, sink: &mut dyn EndpointSink) -> CycleReport {
        let mut working: HashMap<u32, Entity> = self
            .entities
            .drain(..)
            .map(|entity| (entity.pid(), entity))
            .collect();
        self.index.clear();

        let mut report = CycleReport::default();

        for sample in &table.processes {
            if self.contains(sample.pid) {
                report.duplicates += 1;
                continue;
            }

            match working.remove(&sample.pid) {
                Some(mut entity) => {
                    if let Some(former) = entity.advance(sample, table.page_size, table.taken_at) {
                        log_transition(&entity, former);
                    }
                    if let Err(e) = sink.refresh(&entity.snapshot()) {
                        warn!("Failed to refresh endpoint for pid {}: {}", entity.pid(), e);
                    }
                    self.push(entity);
                    report.updated += 1;
                }
                None => {
                    self.next_generation += 1;
                    let entity = Entity::observe(sample, table.page_size, table.taken_at)
                        .with_generation(self.next_generation);
                    match sink.create(&entity.snapshot()) {
                        Ok(()) => {
                            debug!("Tracking process {} ({})", entity.pid(), entity.name());
                            self.push(entity);
                            report.created += 1;
                        }
                        Err(e) => {
                            // Still unmatched next cycle, so creation is retried
                            warn!(
                                "Failed to create endpoint for pid {} ({}): {}. Not tracking it this cycle.",
                                entity.pid(),
                                entity.name(),
                                e
                            );
                            report.publish_failures += 1;
                        }
                    }
                }
            }
        }

        for (pid, entity) in working {
            info!("Process {} ({}) terminated, removing endpoint", pid, entity.name());
            sink.remove(pid);
            drop(entity);
            report.removed += 1;
        }

        report.tracked = self.len();
        report
    }

    /// Destroy every entity and its endpoint. Returns how many were removed.
    pub fn clear(&mut self, sink: &mut dyn EndpointSink) -> usize {
        let removed = self.entities.len();
        for entity in self.entities.drain(..) {
            debug!("Removing endpoint for pid {}", entity.pid());
            sink.remove(entity.pid());
        }
        self.index.clear();
        removed
    }
}

fn log_transition(entity: &Entity, former: RiskLevel) {
    if entity.risk() == RiskLevel::High {
        info!(
            pid = entity.pid(),
            process = entity.name(),
            cpu_delta_ms = entity.deltas().cpu_delta_ms,
            syscalls_delta = entity.deltas().syscalls_delta,
            io_delta_kb = entity.deltas().io_delta_kb,
            mem_rss_mb = entity.mem_rss_mb(),
            "Process risk raised from {:?} to {:?}",
            former,
            entity.risk()
        );
    } else {
        debug!(
            pid = entity.pid(),
            "Process risk changed from {:?} to {:?}",
            former,
            entity.risk()
        );
    }
}
