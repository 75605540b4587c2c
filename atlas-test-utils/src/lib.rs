//! Atlas Test Utilities
//!
//! Centralized test infrastructure for the Atlas workspace:
//! - Scripted mock knowledge provider
//! - Proptest generators for entities and specialisations
//! - Population and store fixtures
//! - Assertions for score invariants

// Re-export the in-memory store from its source crate
pub use atlas_storage::InMemoryStore;

// Re-export core types for convenience
pub use atlas_core::{
    AtlasError, AtlasResult, Entity, EntityId, EvolutionConfig, LlmError, MemoryRecord,
    MemoryType, SkillType, Specializations, StorageError,
};
pub use atlas_llm::{KnowledgeProvider, KnowledgeRequest, KnowledgeResponse, ProviderRegistry};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

/// Knowledge provider returning scripted answers.
///
/// Scripted results are consumed in order; once exhausted every call
/// returns the fallback response. Every request is recorded.
#[derive(Debug, Clone)]
pub struct MockKnowledgeProvider {
    script: Arc<Mutex<VecDeque<AtlasResult<KnowledgeResponse>>>>,
    fallback: KnowledgeResponse,
    requests: Arc<Mutex<Vec<KnowledgeRequest>>>,
}

impl MockKnowledgeProvider {
    /// Provider answering every call with `content` and no citations.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: KnowledgeResponse {
                content: content.into(),
                citations: Vec::new(),
            },
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Attach citations to the fallback response.
    pub fn with_citations(mut self, citations: Vec<String>) -> Self {
        self.fallback.citations = citations;
        self
    }

    /// Queue one result ahead of the fallback.
    pub fn push(&self, result: AtlasResult<KnowledgeResponse>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    /// Queue `times` copies of `error`.
    pub fn push_errors(&self, error: AtlasError, times: usize) {
        for _ in 0..times {
            self.push(Err(error.clone()));
        }
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<KnowledgeRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Registry with this provider registered.
    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::with_knowledge(Arc::new(self.clone()))
    }
}

#[async_trait]
impl KnowledgeProvider for MockKnowledgeProvider {
    async fn query(&self, request: &KnowledgeRequest) -> AtlasResult<KnowledgeResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Atlas records.

    use super::*;
    use proptest::prelude::*;

    /// A specialisation key: mostly core skill types, sometimes ad hoc.
    pub fn arb_skill_key() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => prop::sample::select(SkillType::ALL.to_vec()).prop_map(|s| s.as_str().to_string()),
            1 => "[a-z]{3,10}_[a-z]{3,8}",
        ]
    }

    /// Score in [0, 1].
    pub fn arb_score() -> impl Strategy<Value = f64> {
        0.0f64..=1.0
    }

    pub fn arb_specializations() -> impl Strategy<Value = Specializations> {
        prop::collection::vec((arb_skill_key(), arb_score()), 0..8)
            .prop_map(|pairs| pairs.into_iter().collect())
    }

    pub fn arb_sector() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("FINANCE".to_string())),
            Just(Some("HEALTHCARE".to_string())),
            Just(Some("RETAIL".to_string())),
        ]
    }

    pub fn arb_entity() -> impl Strategy<Value = Entity> {
        (
            "[A-Z][a-z]{2,8}",
            arb_sector(),
            arb_score(),
            arb_score(),
            arb_score(),
            0u64..500,
            arb_specializations(),
        )
            .prop_map(|(name, sector, vel, sr, conf, tasks, specs)| {
                let mut entity = Entity::new(name);
                entity.sector = sector;
                entity.learning_velocity = vel;
                entity.success_rate = sr;
                entity.avg_confidence = conf;
                entity.total_tasks_completed = tasks;
                entity.task_specializations = specs;
                entity
            })
    }

    pub fn arb_population(max: usize) -> impl Strategy<Value = Vec<Entity>> {
        prop::collection::vec(arb_entity(), 1..=max.max(1))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made populations, stores and configs.

    use super::*;
    use atlas_core::BatchConfig;
    use atlas_storage::BatchWriter;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Entity with the given success rate and specialisations.
    pub fn entity_with(name: &str, success_rate: f64, specs: &[(&str, f64)]) -> Entity {
        let mut entity = Entity::new(name);
        entity.success_rate = success_rate;
        entity.avg_confidence = 0.5;
        for (key, score) in specs {
            entity.task_specializations.set(*key, *score);
        }
        entity
    }

    /// `n` entities with empty specialisations and equal, middling scores.
    pub fn uniform_population(n: usize, success_rate: f64) -> Vec<Entity> {
        (0..n)
            .map(|i| entity_with(&format!("entity-{i:03}"), success_rate, &[]))
            .collect()
    }

    /// `n` entities with spread success rates, a few specialisations each,
    /// and sectors cycling through a small set.
    pub fn population(n: usize) -> Vec<Entity> {
        let sectors = [Some("FINANCE"), Some("HEALTHCARE"), None];
        (0..n)
            .map(|i| {
                let sr = (i as f64 + 1.0) / (n as f64 + 1.0);
                let a = SkillType::ALL[i % SkillType::COUNT].as_str();
                let b = SkillType::ALL[(i + 3) % SkillType::COUNT].as_str();
                let mut entity = entity_with(&format!("entity-{i:03}"), sr, &[(a, 0.4), (b, sr)]);
                entity.sector = sectors[i % sectors.len()].map(str::to_string);
                entity.total_tasks_completed = (i as u64) * 7;
                entity.learning_velocity = 0.1;
                entity
            })
            .collect()
    }

    /// Memory with a given importance owned by `entity_id`.
    pub fn memory(entity_id: EntityId, content: &str, importance: f64) -> MemoryRecord {
        MemoryRecord::new(entity_id, MemoryType::Experience, content, importance)
    }

    /// Store seeded with `entities`.
    pub fn store_with(entities: Vec<Entity>) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .seed_entities(entities)
            .unwrap_or_else(|e| panic!("seeding store failed: {e}"));
        store
    }

    /// Config with every sleep removed.
    pub fn fast_config() -> EvolutionConfig {
        EvolutionConfig::without_delays()
    }

    /// Batch writer over `store` with no pacing and immediate retries.
    pub fn fast_writer(store: &InMemoryStore) -> BatchWriter {
        let config = fast_config();
        BatchWriter::new(
            Arc::new(store.clone()),
            BatchConfig {
                pacing_ms: 0,
                ..config.batch
            },
            config.store_retry,
        )
    }

    pub fn seeded_rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Atlas score invariants.

    use super::*;

    /// Assert that every numeric score of `entity` lies in [0, 1].
    #[track_caller]
    pub fn assert_scores_in_unit_interval(entity: &Entity) {
        for (label, value) in [
            ("learning_velocity", entity.learning_velocity),
            ("success_rate", entity.success_rate),
            ("avg_confidence", entity.avg_confidence),
        ] {
            assert!(
                (0.0..=1.0).contains(&value),
                "{} of {} out of range: {}",
                label,
                entity.name,
                value
            );
        }
        for (key, value) in entity.task_specializations.iter() {
            assert!(
                (0.0..=1.0).contains(&value),
                "specialisation {} of {} out of range: {}",
                key,
                entity.name,
                value
            );
        }
    }

    /// Assert that an AtlasResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &AtlasResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that an AtlasResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &AtlasResult<T>) {
        match result {
            Err(AtlasError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }
}
