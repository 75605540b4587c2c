//! Atlas Storage - Store Trait, In-Memory Store and Batch Layer
//!
//! Defines the storage abstraction the evolution engine reads and writes
//! through. The PostgreSQL implementation lives in atlas-api.

pub mod batch;
pub mod memory;

pub use batch::{
    BatchWriter, ChunkFailure, InsertReport, Insertable, RowOutcome, RowStatus, UpdateReport,
};
pub use memory::{InMemoryStore, InsertCall};

use async_trait::async_trait;
use atlas_core::{
    AtlasResult, Entity, EntityId, EntityUpdate, LearningEvent, MemoryRecord, MemoryType,
    Relationship, TaskQueueItem,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// QUERY TYPES
// ============================================================================

/// Optional narrowing of the population.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationFilter {
    /// Exact sector label.
    pub sector: Option<String>,
    pub owner_id: Option<Uuid>,
}

impl PopulationFilter {
    /// Whether `entity` passes this filter.
    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(sector) = &self.sector {
            if entity.sector.as_deref() != Some(sector.as_str()) {
                return false;
            }
        }
        if let Some(owner) = self.owner_id {
            if entity.owner_id != Some(owner) {
                return false;
            }
        }
        true
    }
}

/// Ordering for entity fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityOrder {
    /// `last_performance_update` ascending, never-touched entities first.
    StalestFirst,
    /// `success_rate` descending.
    SuccessRateDesc,
}

/// Entity fetch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    pub filter: PopulationFilter,
    pub order: EntityOrder,
    /// Keep only entities whose success rate is strictly greater.
    pub min_success_rate: Option<f64>,
    pub limit: usize,
}

impl EntityQuery {
    /// Least-recently-touched slice of the population.
    pub fn stalest(filter: PopulationFilter, limit: usize) -> Self {
        Self {
            filter,
            order: EntityOrder::StalestFirst,
            min_success_rate: None,
            limit,
        }
    }

    /// Best performers first.
    pub fn top_performers(filter: PopulationFilter, min_success_rate: Option<f64>, limit: usize) -> Self {
        Self {
            filter,
            order: EntityOrder::SuccessRateDesc,
            min_success_rate,
            limit,
        }
    }
}

/// Ordering for memory fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryOrder {
    ImportanceDesc,
    NewestFirst,
}

/// Memory fetch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Owning entities. Empty means no entity restriction.
    pub entity_ids: Vec<EntityId>,
    /// Keep only memories at or above this importance.
    pub min_importance: Option<f64>,
    /// Memory types to leave out.
    #[serde(default)]
    pub exclude_types: Vec<MemoryType>,
    pub order: MemoryOrder,
    pub limit: usize,
}

impl MemoryQuery {
    /// Most important memories of `entity_ids` at or above `min_importance`.
    pub fn most_important(entity_ids: Vec<EntityId>, min_importance: Option<f64>, limit: usize) -> Self {
        Self {
            entity_ids,
            min_importance,
            exclude_types: Vec::new(),
            order: MemoryOrder::ImportanceDesc,
            limit,
        }
    }

    /// Most recent memories of `entity_ids`.
    pub fn newest(entity_ids: Vec<EntityId>, limit: usize) -> Self {
        Self {
            entity_ids,
            min_importance: None,
            exclude_types: Vec::new(),
            order: MemoryOrder::NewestFirst,
            limit,
        }
    }

    pub fn excluding(mut self, types: &[MemoryType]) -> Self {
        self.exclude_types = types.to_vec();
        self
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Backing store for the evolution engine.
///
/// Implementations must not retry internally; callers wrap every call in
/// the retry utility.
#[async_trait]
pub trait EvolutionStore: Send + Sync {
    /// Fetch entities matching `query`.
    async fn fetch_entities(&self, query: &EntityQuery) -> AtlasResult<Vec<Entity>>;

    /// Fetch memory records matching `query`.
    async fn fetch_memories(&self, query: &MemoryQuery) -> AtlasResult<Vec<MemoryRecord>>;

    /// Insert one chunk of memories. Returns rows written.
    async fn insert_memories(&self, records: &[MemoryRecord]) -> AtlasResult<usize>;

    /// Insert one chunk of learning events. Returns rows written.
    async fn insert_learning_events(&self, events: &[LearningEvent]) -> AtlasResult<usize>;

    /// Insert one chunk of task-queue items. Returns rows written.
    async fn insert_tasks(&self, tasks: &[TaskQueueItem]) -> AtlasResult<usize>;

    /// Apply a partial scoring update to one entity.
    async fn update_entity(&self, update: &EntityUpdate) -> AtlasResult<()>;

    /// Insert or overwrite the relationship for its (pair, type) key.
    async fn upsert_relationship(&self, relationship: &Relationship) -> AtlasResult<()>;

    /// Cheap reachability check for the health endpoint.
    async fn ping(&self) -> AtlasResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_sector_and_owner() {
        let owner = Uuid::now_v7();
        let mut entity = Entity::new("e");
        entity.sector = Some("FINANCE".to_string());
        entity.owner_id = Some(owner);

        assert!(PopulationFilter::default().matches(&entity));
        assert!(PopulationFilter {
            sector: Some("FINANCE".to_string()),
            owner_id: Some(owner),
        }
        .matches(&entity));
        assert!(!PopulationFilter {
            sector: Some("HEALTH".to_string()),
            owner_id: None,
        }
        .matches(&entity));
        assert!(!PopulationFilter {
            sector: None,
            owner_id: Some(Uuid::now_v7()),
        }
        .matches(&entity));
    }

    #[test]
    fn test_filter_owner_excludes_shared_entities() {
        let shared = Entity::new("shared");
        let filter = PopulationFilter {
            sector: None,
            owner_id: Some(Uuid::now_v7()),
        };
        assert!(!filter.matches(&shared));
    }
}
