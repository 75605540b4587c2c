//! Core record structures

use crate::scoring::clamp_unit;
use crate::{
    new_entity_id, EntityId, LearningEventType, MemoryType, RelationshipType, TaskPriority,
    TaskStatus, Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Segment label used when an entity has none.
pub const DEFAULT_SECTOR: &str = "GENERAL";

// ============================================================================
// SPECIALIZATIONS
// ============================================================================

/// Skill-type key to score in [0, 1].
///
/// Keys are normally `SkillType::as_str()` values but ad hoc keys are
/// permitted. Every write path clamps; the map has no fixed cardinality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Specializations(BTreeMap<String, f64>);

impl Specializations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Score for `key`, zero when absent.
    pub fn score(&self, key: &str) -> f64 {
        self.get(key).unwrap_or(0.0)
    }

    /// Set a score, clamped to [0, 1].
    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), clamp_unit(value));
    }

    /// Add `delta` to a score (absent counts as zero) and return the change
    /// actually applied after clamping.
    pub fn raise(&mut self, key: &str, delta: f64) -> f64 {
        let current = self.score(key);
        let next = clamp_unit(current + delta);
        self.0.insert(key.to_string(), next);
        next - current
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Clamp every value in place. Used on rows loaded from the store.
    pub fn clamp_all(&mut self) {
        for value in self.0.values_mut() {
            *value = clamp_unit(*value);
        }
    }
}

impl FromIterator<(String, f64)> for Specializations {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut specs = Specializations::new();
        for (key, value) in iter {
            specs.set(key, value);
        }
        specs
    }
}

// ============================================================================
// ENTITY
// ============================================================================

/// A scored population member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    pub name: String,
    /// Segment label; `None` is grouped under [`DEFAULT_SECTOR`].
    pub sector: Option<String>,
    /// Owning user. Shared entities have none.
    pub owner_id: Option<Uuid>,
    pub status: String,
    pub learning_velocity: f64,
    pub success_rate: f64,
    pub avg_confidence: f64,
    pub total_tasks_completed: u64,
    pub task_specializations: Specializations,
    /// Staleness cursor for population selection.
    pub last_performance_update: Option<Timestamp>,
}

impl Entity {
    /// A fresh entity with neutral scores.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            entity_id: new_entity_id(),
            name: name.into(),
            sector: None,
            owner_id: None,
            status: "active".to_string(),
            learning_velocity: 0.0,
            success_rate: 0.0,
            avg_confidence: 0.0,
            total_tasks_completed: 0,
            task_specializations: Specializations::new(),
            last_performance_update: None,
        }
    }

    /// Segment label with the default bucket applied.
    pub fn sector_label(&self) -> &str {
        match self.sector.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => DEFAULT_SECTOR,
        }
    }

    /// Raise learning velocity; returns the applied change.
    pub fn raise_velocity(&mut self, delta: f64) -> f64 {
        let before = self.learning_velocity;
        self.learning_velocity = clamp_unit(before + delta);
        self.learning_velocity - before
    }

    /// Raise success rate; returns the applied change.
    pub fn raise_success_rate(&mut self, delta: f64) -> f64 {
        let before = self.success_rate;
        self.success_rate = clamp_unit(before + delta);
        self.success_rate - before
    }

    /// Clamp every numeric score into [0, 1].
    pub fn sanitize(&mut self) {
        self.learning_velocity = clamp_unit(self.learning_velocity);
        self.success_rate = clamp_unit(self.success_rate);
        self.avg_confidence = clamp_unit(self.avg_confidence);
        self.task_specializations.clamp_all();
    }

    /// Full scoring-state update for this entity, stamping the staleness cursor.
    pub fn to_update(&self, touched_at: Timestamp) -> EntityUpdate {
        EntityUpdate {
            entity_id: self.entity_id,
            learning_velocity: Some(self.learning_velocity),
            success_rate: Some(self.success_rate),
            task_specializations: Some(self.task_specializations.clone()),
            last_performance_update: Some(touched_at),
        }
    }
}

/// Partial update of an entity's scoring state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub entity_id: EntityId,
    pub learning_velocity: Option<f64>,
    pub success_rate: Option<f64>,
    pub task_specializations: Option<Specializations>,
    pub last_performance_update: Option<Timestamp>,
}

impl EntityUpdate {
    /// Apply to an entity, clamping every value written.
    pub fn apply_to(&self, entity: &mut Entity) {
        if let Some(v) = self.learning_velocity {
            entity.learning_velocity = clamp_unit(v);
        }
        if let Some(v) = self.success_rate {
            entity.success_rate = clamp_unit(v);
        }
        if let Some(specs) = &self.task_specializations {
            let mut specs = specs.clone();
            specs.clamp_all();
            entity.task_specializations = specs;
        }
        if let Some(ts) = self.last_performance_update {
            entity.last_performance_update = Some(ts);
        }
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// Append-only note attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub memory_id: Uuid,
    pub entity_id: EntityId,
    pub owner_id: Option<Uuid>,
    pub memory_type: MemoryType,
    pub content: String,
    pub importance_score: f64,
    pub context: serde_json::Value,
    pub created_at: Timestamp,
}

impl MemoryRecord {
    pub fn new(
        entity_id: EntityId,
        memory_type: MemoryType,
        content: impl Into<String>,
        importance_score: f64,
    ) -> Self {
        Self {
            memory_id: new_entity_id(),
            entity_id,
            owner_id: None,
            memory_type,
            content: content.into(),
            importance_score: clamp_unit(importance_score),
            context: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn with_owner(mut self, owner_id: Option<Uuid>) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

// ============================================================================
// LEARNING EVENT
// ============================================================================

/// Write-once audit record of one algorithmic effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEvent {
    pub event_id: Uuid,
    /// Entity the effect applied to, or `POPULATION_SENTINEL_ID`.
    pub entity_id: EntityId,
    pub event_type: LearningEventType,
    pub event_data: serde_json::Value,
    pub impact_score: f64,
    pub created_at: Timestamp,
}

impl LearningEvent {
    pub fn new(
        entity_id: EntityId,
        event_type: LearningEventType,
        event_data: serde_json::Value,
        impact_score: f64,
    ) -> Self {
        Self {
            event_id: new_entity_id(),
            entity_id,
            event_type,
            event_data,
            impact_score: clamp_unit(impact_score),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// RELATIONSHIP
// ============================================================================

/// Pair record between two entities, unique per unordered pair and type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Smaller id of the pair.
    pub entity_a: EntityId,
    /// Larger id of the pair.
    pub entity_b: EntityId,
    pub relationship_type: RelationshipType,
    pub synergy_score: f64,
    pub metadata: serde_json::Value,
}

impl Relationship {
    /// Competitive relationship; the pair is normalised so that
    /// `(x, y)` and `(y, x)` produce the same key.
    pub fn competitive(
        x: EntityId,
        y: EntityId,
        synergy_score: f64,
        metadata: serde_json::Value,
    ) -> Self {
        let (entity_a, entity_b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            entity_a,
            entity_b,
            relationship_type: RelationshipType::Competitive,
            synergy_score: clamp_unit(synergy_score),
            metadata,
        }
    }

    /// Upsert key.
    pub fn key(&self) -> (EntityId, EntityId, RelationshipType) {
        (self.entity_a, self.entity_b, self.relationship_type)
    }
}

// ============================================================================
// TASK QUEUE ITEM
// ============================================================================

/// Work item seeded for downstream consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueueItem {
    pub task_id: Uuid,
    pub title: String,
    pub task_type: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub assigned_entities: Vec<EntityId>,
    pub input_data: serde_json::Value,
    pub assignment_rationale: String,
    pub owner_id: Option<Uuid>,
    pub created_at: Timestamp,
}

impl TaskQueueItem {
    pub fn new(
        title: impl Into<String>,
        task_type: impl Into<String>,
        description: impl Into<String>,
        priority: TaskPriority,
    ) -> Self {
        Self {
            task_id: new_entity_id(),
            title: title.into(),
            task_type: task_type.into(),
            description: description.into(),
            priority,
            status: TaskStatus::Pending,
            assigned_entities: Vec::new(),
            input_data: serde_json::Value::Object(Default::default()),
            assignment_rationale: String::new(),
            owner_id: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specializations_raise_clamps() {
        let mut specs = Specializations::new();
        specs.set("research", 0.95);
        let applied = specs.raise("research", 0.2);
        assert!((applied - 0.05).abs() < 1e-9);
        assert_eq!(specs.score("research"), 1.0);
    }

    #[test]
    fn test_specializations_raise_absent_key() {
        let mut specs = Specializations::new();
        let applied = specs.raise("visual_design", 0.1);
        assert!((applied - 0.1).abs() < 1e-9);
        assert!(specs.contains("visual_design"));
    }

    #[test]
    fn test_specializations_from_iter_clamps() {
        let specs: Specializations = vec![("a".to_string(), 1.7), ("b".to_string(), -0.3)]
            .into_iter()
            .collect();
        assert_eq!(specs.score("a"), 1.0);
        assert_eq!(specs.score("b"), 0.0);
    }

    #[test]
    fn test_sector_label_default() {
        let mut entity = Entity::new("e");
        assert_eq!(entity.sector_label(), DEFAULT_SECTOR);
        entity.sector = Some("  ".to_string());
        assert_eq!(entity.sector_label(), DEFAULT_SECTOR);
        entity.sector = Some("FINANCE".to_string());
        assert_eq!(entity.sector_label(), "FINANCE");
    }

    #[test]
    fn test_entity_update_apply_clamps() {
        let mut entity = Entity::new("e");
        let mut specs = Specializations::new();
        specs.set("research", 0.5);
        let update = EntityUpdate {
            entity_id: entity.entity_id,
            learning_velocity: Some(3.0),
            success_rate: Some(-1.0),
            task_specializations: Some(specs),
            last_performance_update: Some(Utc::now()),
        };
        update.apply_to(&mut entity);
        assert_eq!(entity.learning_velocity, 1.0);
        assert_eq!(entity.success_rate, 0.0);
        assert_eq!(entity.task_specializations.score("research"), 0.5);
        assert!(entity.last_performance_update.is_some());
    }

    #[test]
    fn test_relationship_pair_is_normalized() {
        let x = new_entity_id();
        let y = new_entity_id();
        let r1 = Relationship::competitive(x, y, 0.4, serde_json::json!({}));
        let r2 = Relationship::competitive(y, x, 0.9, serde_json::json!({}));
        assert_eq!(r1.key(), r2.key());
    }

    #[test]
    fn test_memory_record_clamps_importance() {
        let m = MemoryRecord::new(new_entity_id(), MemoryType::Insight, "x", 4.2);
        assert_eq!(m.importance_score, 1.0);
    }
}
