//! Per-mode results and the aggregate run summary.

use atlas_core::{Entity, EntityId};
use atlas_storage::{InsertReport, UpdateReport};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// MODE OUTCOME
// ============================================================================

/// Knowledge gained by one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityGain {
    #[serde(rename = "agentId")]
    pub entity_id: EntityId,
    pub name: String,
    #[serde(rename = "knowledgeGained")]
    pub gain: f64,
}

/// What one executor did in one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeOutcome {
    /// Every entity the executor touched, zero gain included.
    pub gains: BTreeMap<EntityId, EntityGain>,
    pub knowledge_gained: f64,
    pub competitions: usize,
    pub crystallizations: usize,
    pub tasks_discovered: usize,
    pub tasks_seeded: usize,
    pub inserts: InsertReport,
    pub updates: UpdateReport,
}

impl ModeOutcome {
    /// Record `gain` for `entity`, adding to any earlier gain.
    pub fn record(&mut self, entity: &Entity, gain: f64) {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.gains
            .entry(entity.entity_id)
            .and_modify(|g| g.gain += gain)
            .or_insert_with(|| EntityGain {
                entity_id: entity.entity_id,
                name: entity.name.clone(),
                gain,
            });
        self.knowledge_gained += gain;
    }

    pub fn touched(&self) -> usize {
        self.gains.len()
    }

    /// Fold `other` into this outcome.
    pub fn merge(&mut self, other: ModeOutcome) {
        for (id, entry) in other.gains {
            self.gains
                .entry(id)
                .and_modify(|g| g.gain += entry.gain)
                .or_insert(entry);
        }
        self.knowledge_gained += other.knowledge_gained;
        self.competitions += other.competitions;
        self.crystallizations += other.crystallizations;
        self.tasks_discovered += other.tasks_discovered;
        self.tasks_seeded += other.tasks_seeded;
        self.inserts.merge(other.inserts);
        self.updates.merge(other.updates);
    }
}

// ============================================================================
// RUN SUMMARY
// ============================================================================

/// Write statistics across the whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStats {
    pub records_written: usize,
    pub chunks_failed: usize,
    pub updates_applied: usize,
    pub updates_skipped: usize,
}

impl WriteStats {
    pub fn from_reports(inserts: &InsertReport, updates: &UpdateReport) -> Self {
        Self {
            records_written: inserts.records_written,
            chunks_failed: inserts.chunks_failed,
            updates_applied: updates.applied(),
            updates_skipped: updates.skipped(),
        }
    }
}

/// Response body of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionSummary {
    pub request_id: String,
    pub mode: String,
    pub user_id: Option<Uuid>,
    pub total_agents_evolved: usize,
    pub cycles_requested: u32,
    pub cycles_run: u32,
    pub intensity: f64,
    pub total_knowledge_gained: f64,
    pub total_competitions: usize,
    pub total_crystallizations: usize,
    pub total_tasks_discovered: usize,
    pub total_tasks_seeded: usize,
    pub average_gain_per_agent: f64,
    pub duration_ms: u64,
    pub agents_per_second: f64,
    pub top_results: Vec<EntityGain>,
    pub writes: WriteStats,
}

/// Number of entities listed in `top_results`.
pub const TOP_RESULTS: usize = 10;

/// Top entities by gain, highest first. Ties keep id order.
pub fn top_gains(outcome: &ModeOutcome, n: usize) -> Vec<EntityGain> {
    let mut gains: Vec<EntityGain> = outcome.gains.values().cloned().collect();
    gains.sort_by(|a, b| b.gain.total_cmp(&a.gain));
    gains.truncate(n);
    gains
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates_per_entity() {
        let entity = Entity::new("a");
        let mut outcome = ModeOutcome::default();
        outcome.record(&entity, 0.1);
        outcome.record(&entity, 0.2);
        assert_eq!(outcome.touched(), 1);
        assert!((outcome.gains[&entity.entity_id].gain - 0.3).abs() < 1e-12);
        assert!((outcome.knowledge_gained - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_record_ignores_nan_and_negative() {
        let entity = Entity::new("a");
        let mut outcome = ModeOutcome::default();
        outcome.record(&entity, f64::NAN);
        outcome.record(&entity, -1.0);
        assert_eq!(outcome.touched(), 1);
        assert_eq!(outcome.knowledge_gained, 0.0);
    }

    #[test]
    fn test_merge_counts_distinct_entities() {
        let a = Entity::new("a");
        let b = Entity::new("b");
        let mut first = ModeOutcome::default();
        first.record(&a, 0.5);
        first.competitions = 1;
        let mut second = ModeOutcome::default();
        second.record(&a, 0.25);
        second.record(&b, 0.0);
        second.competitions = 2;

        first.merge(second);
        assert_eq!(first.touched(), 2);
        assert_eq!(first.competitions, 3);
        assert!((first.gains[&a.entity_id].gain - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_top_gains_sorted_descending() {
        let mut outcome = ModeOutcome::default();
        for i in 0..15 {
            outcome.record(&Entity::new(format!("e{i}")), i as f64 / 100.0);
        }
        let top = top_gains(&outcome, TOP_RESULTS);
        assert_eq!(top.len(), 10);
        assert!(top.windows(2).all(|w| w[0].gain >= w[1].gain));
        assert_eq!(top[0].name, "e14");
    }
}
