//! In-memory store for tests and local runs.
//!
//! Records live in maps behind an `RwLock`. Faults can be injected per
//! insert call, per entity update and per entity or memory fetch so the
//! batch layer and the engine's degraded paths can be exercised. Every call
//! is logged.

use crate::{EntityOrder, EntityQuery, EvolutionStore, MemoryOrder, MemoryQuery};
use async_trait::async_trait;
use atlas_core::{
    AtlasError, AtlasResult, Entity, EntityId, EntityUpdate, LearningEvent, MemoryRecord,
    RecordKind, Relationship, RelationshipType, StorageError, TaskQueueItem,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One insert call as seen by the store, failed or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertCall {
    pub kind: RecordKind,
    pub records: usize,
    pub succeeded: bool,
}

#[derive(Default)]
struct Faults {
    /// Insert call number (1-based, across all kinds) to the error it fails with.
    insert_calls: HashMap<usize, StorageError>,
    /// Errors returned by the next updates of an entity, in order.
    updates: HashMap<EntityId, VecDeque<StorageError>>,
    /// Errors returned by the next entity fetches, in order.
    fetches: VecDeque<StorageError>,
    memory_fetches: VecDeque<StorageError>,
    relationship_upserts: VecDeque<StorageError>,
}

#[derive(Default)]
struct State {
    entities: BTreeMap<EntityId, Entity>,
    memories: Vec<MemoryRecord>,
    learning_events: Vec<LearningEvent>,
    relationships: BTreeMap<(EntityId, EntityId, RelationshipType), Relationship>,
    tasks: Vec<TaskQueueItem>,
    faults: Faults,
    insert_calls: Vec<InsertCall>,
    entity_fetches: Vec<Vec<EntityId>>,
    update_calls: usize,
}

/// In-memory [`EvolutionStore`].
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `entities`.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> AtlasResult<Self> {
        let store = Self::new();
        store.seed_entities(entities)?;
        Ok(store)
    }

    fn read(&self) -> AtlasResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| AtlasError::Storage(StorageError::LockPoisoned))
    }

    fn write(&self) -> AtlasResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| AtlasError::Storage(StorageError::LockPoisoned))
    }

    // ========================================================================
    // SEEDING
    // ========================================================================

    pub fn seed_entities(&self, entities: impl IntoIterator<Item = Entity>) -> AtlasResult<()> {
        let mut state = self.write()?;
        for entity in entities {
            state.entities.insert(entity.entity_id, entity);
        }
        Ok(())
    }

    pub fn seed_memories(&self, memories: impl IntoIterator<Item = MemoryRecord>) -> AtlasResult<()> {
        self.write()?.memories.extend(memories);
        Ok(())
    }

    // ========================================================================
    // FAULT INJECTION
    // ========================================================================

    /// Fail the `call`-th insert call (1-based, counted across all record kinds).
    pub fn fail_insert_call(&self, call: usize, error: StorageError) -> AtlasResult<()> {
        self.write()?.faults.insert_calls.insert(call, error);
        Ok(())
    }

    /// Fail the next `times` updates of `entity_id` with `error`.
    pub fn fail_updates(&self, entity_id: EntityId, error: StorageError, times: usize) -> AtlasResult<()> {
        let mut state = self.write()?;
        let queue = state.faults.updates.entry(entity_id).or_default();
        queue.extend((0..times).map(|_| error.clone()));
        Ok(())
    }

    /// Fail the next `times` entity fetches with `error`.
    pub fn fail_fetches(&self, error: StorageError, times: usize) -> AtlasResult<()> {
        self.write()?
            .faults
            .fetches
            .extend((0..times).map(|_| error.clone()));
        Ok(())
    }

    /// Fail the next `times` memory fetches with `error`.
    pub fn fail_memory_fetches(&self, error: StorageError, times: usize) -> AtlasResult<()> {
        self.write()?
            .faults
            .memory_fetches
            .extend((0..times).map(|_| error.clone()));
        Ok(())
    }

    /// Fail the next `times` relationship upserts with `error`.
    pub fn fail_relationship_upserts(&self, error: StorageError, times: usize) -> AtlasResult<()> {
        self.write()?
            .faults
            .relationship_upserts
            .extend((0..times).map(|_| error.clone()));
        Ok(())
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    pub fn entity(&self, entity_id: EntityId) -> AtlasResult<Option<Entity>> {
        Ok(self.read()?.entities.get(&entity_id).cloned())
    }

    pub fn entities(&self) -> AtlasResult<Vec<Entity>> {
        Ok(self.read()?.entities.values().cloned().collect())
    }

    pub fn memories(&self) -> AtlasResult<Vec<MemoryRecord>> {
        Ok(self.read()?.memories.clone())
    }

    pub fn learning_events(&self) -> AtlasResult<Vec<LearningEvent>> {
        Ok(self.read()?.learning_events.clone())
    }

    pub fn relationships(&self) -> AtlasResult<Vec<Relationship>> {
        Ok(self.read()?.relationships.values().cloned().collect())
    }

    pub fn tasks(&self) -> AtlasResult<Vec<TaskQueueItem>> {
        Ok(self.read()?.tasks.clone())
    }

    /// Every insert call in order, including failed ones.
    pub fn insert_calls(&self) -> AtlasResult<Vec<InsertCall>> {
        Ok(self.read()?.insert_calls.clone())
    }

    /// Ids returned by each successful stalest-first entity fetch, in order.
    pub fn entity_fetches(&self) -> AtlasResult<Vec<Vec<EntityId>>> {
        Ok(self.read()?.entity_fetches.clone())
    }

    /// Number of update calls received, failed ones included.
    pub fn update_calls(&self) -> AtlasResult<usize> {
        Ok(self.read()?.update_calls)
    }

    fn record_insert<T: Clone>(
        &self,
        kind: RecordKind,
        records: &[T],
        target: impl FnOnce(&mut State) -> &mut Vec<T>,
    ) -> AtlasResult<usize> {
        let mut state = self.write()?;
        let call_number = state.insert_calls.len() + 1;
        let fault = state.faults.insert_calls.remove(&call_number);
        state.insert_calls.push(InsertCall {
            kind,
            records: records.len(),
            succeeded: fault.is_none(),
        });
        if let Some(error) = fault {
            return Err(error.into());
        }
        target(&mut *state).extend_from_slice(records);
        Ok(records.len())
    }
}

fn stalest_first(a: &Entity, b: &Entity) -> std::cmp::Ordering {
    // None sorts before Some, which puts never-touched entities first.
    a.last_performance_update
        .cmp(&b.last_performance_update)
        .then(a.entity_id.cmp(&b.entity_id))
}

fn success_rate_desc(a: &Entity, b: &Entity) -> std::cmp::Ordering {
    b.success_rate
        .total_cmp(&a.success_rate)
        .then(a.entity_id.cmp(&b.entity_id))
}

#[async_trait]
impl EvolutionStore for InMemoryStore {
    async fn fetch_entities(&self, query: &EntityQuery) -> AtlasResult<Vec<Entity>> {
        let mut state = self.write()?;
        if let Some(error) = state.faults.fetches.pop_front() {
            return Err(error.into());
        }

        let mut rows: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| query.filter.matches(e))
            .filter(|e| match query.min_success_rate {
                Some(min) => e.success_rate > min,
                None => true,
            })
            .cloned()
            .collect();

        match query.order {
            EntityOrder::StalestFirst => rows.sort_by(stalest_first),
            EntityOrder::SuccessRateDesc => rows.sort_by(success_rate_desc),
        }
        rows.truncate(query.limit);

        if query.order == EntityOrder::StalestFirst {
            state
                .entity_fetches
                .push(rows.iter().map(|e| e.entity_id).collect());
        }
        Ok(rows)
    }

    async fn fetch_memories(&self, query: &MemoryQuery) -> AtlasResult<Vec<MemoryRecord>> {
        let mut state = self.write()?;
        if let Some(error) = state.faults.memory_fetches.pop_front() {
            return Err(error.into());
        }
        let mut rows: Vec<MemoryRecord> = state
            .memories
            .iter()
            .filter(|m| query.entity_ids.is_empty() || query.entity_ids.contains(&m.entity_id))
            .filter(|m| match query.min_importance {
                Some(min) => m.importance_score >= min,
                None => true,
            })
            .filter(|m| !query.exclude_types.contains(&m.memory_type))
            .cloned()
            .collect();

        match query.order {
            MemoryOrder::ImportanceDesc => {
                rows.sort_by(|a, b| b.importance_score.total_cmp(&a.importance_score))
            }
            MemoryOrder::NewestFirst => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn insert_memories(&self, records: &[MemoryRecord]) -> AtlasResult<usize> {
        self.record_insert(RecordKind::Memory, records, |s| &mut s.memories)
    }

    async fn insert_learning_events(&self, events: &[LearningEvent]) -> AtlasResult<usize> {
        self.record_insert(RecordKind::LearningEvent, events, |s| &mut s.learning_events)
    }

    async fn insert_tasks(&self, tasks: &[TaskQueueItem]) -> AtlasResult<usize> {
        self.record_insert(RecordKind::Task, tasks, |s| &mut s.tasks)
    }

    async fn update_entity(&self, update: &EntityUpdate) -> AtlasResult<()> {
        let mut state = self.write()?;
        state.update_calls += 1;

        if let Some(queue) = state.faults.updates.get_mut(&update.entity_id) {
            if let Some(error) = queue.pop_front() {
                return Err(error.into());
            }
        }

        let entity = state
            .entities
            .get_mut(&update.entity_id)
            .ok_or(StorageError::NotFound {
                kind: RecordKind::Entity,
                id: update.entity_id,
            })?;
        update.apply_to(entity);
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> AtlasResult<()> {
        let mut state = self.write()?;
        if let Some(error) = state.faults.relationship_upserts.pop_front() {
            return Err(error.into());
        }
        state
            .relationships
            .insert(relationship.key(), relationship.clone());
        Ok(())
    }
}
