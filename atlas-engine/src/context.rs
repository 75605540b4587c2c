//! Shared inputs for mode executors and their write path.

use crate::outcome::ModeOutcome;
use atlas_core::{
    with_retry, AtlasResult, Entity, EntityUpdate, EvolutionConfig, LearningEvent, MemoryRecord,
};
use atlas_llm::ProviderRegistry;
use atlas_storage::{BatchWriter, EntityQuery, MemoryQuery, PopulationFilter};
use chrono::Utc;

/// Everything an executor needs besides the population and the RNG.
#[derive(Clone, Copy)]
pub struct ModeContext<'a> {
    pub writer: &'a BatchWriter,
    pub providers: &'a ProviderRegistry,
    pub config: &'a EvolutionConfig,
    pub intensity: f64,
    pub filter: &'a PopulationFilter,
    pub request_id: &'a str,
}

impl ModeContext<'_> {
    /// Fetch entities through the store retry policy.
    pub async fn fetch_entities(&self, query: &EntityQuery) -> AtlasResult<Vec<Entity>> {
        let store = self.writer.store();
        with_retry(self.writer.retry_policy(), "fetch_entities", move || {
            store.fetch_entities(query)
        })
        .await
    }

    /// Fetch memories through the store retry policy.
    pub async fn fetch_memories(&self, query: &MemoryQuery) -> AtlasResult<Vec<MemoryRecord>> {
        let store = self.writer.store();
        with_retry(self.writer.retry_policy(), "fetch_memories", move || {
            store.fetch_memories(query)
        })
        .await
    }

    /// Write memories, then events, then one update per touched entity.
    ///
    /// Failures are folded into `outcome` and never abort the mode.
    pub async fn persist(
        &self,
        outcome: &mut ModeOutcome,
        memories: &[MemoryRecord],
        events: &[LearningEvent],
        touched: &[&Entity],
    ) {
        if !memories.is_empty() {
            outcome.inserts.merge(self.writer.insert(memories).await);
        }
        if !events.is_empty() {
            outcome.inserts.merge(self.writer.insert(events).await);
        }
        if !touched.is_empty() {
            let now = Utc::now();
            let updates: Vec<EntityUpdate> = touched.iter().map(|e| e.to_update(now)).collect();
            outcome.updates.merge(self.writer.update(&updates).await);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::{LearningEventType, MemoryType, RecordKind};
    use atlas_test_utils::fixtures::{fast_config, fast_writer, store_with, uniform_population};
    use serde_json::json;

    #[tokio::test]
    async fn test_persist_writes_memories_then_events_then_updates() {
        let entities = uniform_population(2, 0.5);
        let store = store_with(entities.clone());
        let writer = fast_writer(&store);
        let providers = ProviderRegistry::new();
        let config = fast_config();
        let filter = PopulationFilter::default();
        let ctx = ModeContext {
            writer: &writer,
            providers: &providers,
            config: &config,
            intensity: 1.0,
            filter: &filter,
            request_id: "req-persist",
        };

        let owner = entities[0].entity_id;
        let memories = vec![MemoryRecord::new(owner, MemoryType::Insight, "note", 0.6)];
        let events = vec![LearningEvent::new(
            owner,
            LearningEventType::ParallelLearning,
            json!({}),
            0.1,
        )];
        let touched: Vec<&Entity> = entities.iter().collect();
        let mut outcome = ModeOutcome::default();
        ctx.persist(&mut outcome, &memories, &events, &touched).await;

        let kinds: Vec<RecordKind> = store.insert_calls().unwrap().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![RecordKind::Memory, RecordKind::LearningEvent]);
        assert_eq!(outcome.inserts.records_written, 2);
        assert_eq!(outcome.updates.applied(), 2);
        assert!(store
            .entities()
            .unwrap()
            .iter()
            .all(|e| e.last_performance_update.is_some()));
    }
}
