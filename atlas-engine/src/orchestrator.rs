//! Cycle orchestrator.
//!
//! Validates a request, then per cycle fetches the stalest slice of the
//! population, runs the selected executor(s) over it and accumulates the
//! outcome. A final summary event is written once every cycle is done.

use crate::context::ModeContext;
use crate::modes::run_mode;
use crate::outcome::{top_gains, EvolutionSummary, ModeOutcome, WriteStats, TOP_RESULTS};
use crate::request::{EvolutionRequest, ValidatedRequest};
use atlas_core::{
    clamp_unit, with_retry, AtlasResult, EvolutionConfig, LearningEvent, LearningEventType,
    POPULATION_SENTINEL_ID,
};
use atlas_llm::ProviderRegistry;
use atlas_storage::{BatchWriter, EntityQuery, EvolutionStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Runs evolution requests against a store.
///
/// Holds no per-run state; concurrent runs share nothing but the store.
#[derive(Clone)]
pub struct EvolutionEngine {
    writer: BatchWriter,
    providers: ProviderRegistry,
    config: EvolutionConfig,
}

impl EvolutionEngine {
    /// Create an engine. Fails if `config` is out of range.
    pub fn new(
        store: Arc<dyn EvolutionStore>,
        providers: ProviderRegistry,
        config: EvolutionConfig,
    ) -> AtlasResult<Self> {
        config.validate()?;
        let writer = BatchWriter::new(store, config.batch.clone(), config.store_retry.clone());
        Ok(Self {
            writer,
            providers,
            config,
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Run `request` with an OS-seeded RNG.
    pub async fn run(
        &self,
        request: &EvolutionRequest,
        request_id: &str,
    ) -> AtlasResult<EvolutionSummary> {
        let mut rng = StdRng::from_os_rng();
        self.run_with_rng(request, request_id, &mut rng).await
    }

    /// Run `request` drawing every random choice from `rng`.
    pub async fn run_with_rng(
        &self,
        request: &EvolutionRequest,
        request_id: &str,
        rng: &mut StdRng,
    ) -> AtlasResult<EvolutionSummary> {
        let validated = request.validate();
        let span = tracing::info_span!(
            "evolution",
            request_id = %request_id,
            user_id = ?validated.user_id,
            mode = %validated.mode,
        );
        self.run_validated(&validated, request_id, rng)
            .instrument(span)
            .await
    }

    async fn run_validated(
        &self,
        request: &ValidatedRequest,
        request_id: &str,
        rng: &mut StdRng,
    ) -> AtlasResult<EvolutionSummary> {
        let started = Instant::now();
        tracing::info!(
            batch_size = request.batch_size,
            intensity = request.intensity,
            cycles = request.cycles,
            sector = ?request.filter.sector,
            "Evolution run started"
        );

        let ctx = ModeContext {
            writer: &self.writer,
            providers: &self.providers,
            config: &self.config,
            intensity: request.intensity,
            filter: &request.filter,
            request_id,
        };
        let query = EntityQuery::stalest(request.filter.clone(), request.batch_size);
        let store = self.writer.store();

        let mut total = ModeOutcome::default();
        let mut cycles_run = 0u32;

        for cycle in 1..=request.cycles {
            let mut population = with_retry(&self.config.store_retry, "fetch_population", || {
                store.fetch_entities(&query)
            })
            .await?;

            if population.is_empty() {
                tracing::info!(cycle, "Empty population, cycle skipped");
                continue;
            }
            for entity in population.iter_mut() {
                entity.sanitize();
            }

            let outcome = run_mode(request.mode, &ctx, &mut population, rng).await?;
            tracing::info!(
                cycle,
                population = population.len(),
                touched = outcome.touched(),
                knowledge_gained = outcome.knowledge_gained,
                "Cycle finished"
            );
            total.merge(outcome);
            cycles_run += 1;
        }

        let summary = summarize(request, request_id, &total, cycles_run, started.elapsed());
        self.record_summary(&summary).await;

        tracing::info!(
            agents_evolved = summary.total_agents_evolved,
            cycles_run = summary.cycles_run,
            knowledge_gained = summary.total_knowledge_gained,
            duration_ms = summary.duration_ms,
            "Evolution run finished"
        );
        Ok(summary)
    }

    async fn record_summary(&self, summary: &EvolutionSummary) {
        let event = LearningEvent::new(
            POPULATION_SENTINEL_ID,
            LearningEventType::EvolutionSummary,
            json!(summary),
            clamp_unit(summary.average_gain_per_agent),
        );
        let report = self.writer.insert(&[event]).await;
        if !report.is_clean() {
            tracing::warn!(request_id = %summary.request_id, "Summary event not recorded");
        }
    }
}

/// Aggregate summary of a finished run.
pub fn summarize(
    request: &ValidatedRequest,
    request_id: &str,
    total: &ModeOutcome,
    cycles_run: u32,
    elapsed: Duration,
) -> EvolutionSummary {
    let evolved = total.touched();
    let secs = elapsed.as_secs_f64();
    EvolutionSummary {
        request_id: request_id.to_string(),
        mode: request.mode.as_str().to_string(),
        user_id: request.user_id,
        total_agents_evolved: evolved,
        cycles_requested: request.cycles,
        cycles_run,
        intensity: request.intensity,
        total_knowledge_gained: total.knowledge_gained,
        total_competitions: total.competitions,
        total_crystallizations: total.crystallizations,
        total_tasks_discovered: total.tasks_discovered,
        total_tasks_seeded: total.tasks_seeded,
        average_gain_per_agent: if evolved > 0 {
            total.knowledge_gained / evolved as f64
        } else {
            0.0
        },
        duration_ms: elapsed.as_millis() as u64,
        agents_per_second: if secs > 0.0 { evolved as f64 / secs } else { 0.0 },
        top_results: top_gains(total, TOP_RESULTS),
        writes: WriteStats::from_reports(&total.inserts, &total.updates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::{Entity, StorageError};
    use atlas_test_utils::assertions::assert_storage_error;
    use atlas_test_utils::fixtures::{fast_config, seeded_rng, store_with, uniform_population};
    use atlas_test_utils::InMemoryStore;

    fn engine(store: &InMemoryStore) -> EvolutionEngine {
        EvolutionEngine::new(Arc::new(store.clone()), ProviderRegistry::new(), fast_config()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = fast_config();
        config.collective.top_fraction = 2.0;
        let result = EvolutionEngine::new(
            Arc::new(InMemoryStore::new()),
            ProviderRegistry::new(),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_population_skips_cycles() {
        let store = InMemoryStore::new();
        let request = EvolutionRequest {
            evolution_cycles: Some(3),
            ..Default::default()
        };
        let summary = engine(&store)
            .run_with_rng(&request, "req-empty", &mut seeded_rng(1))
            .await
            .unwrap();
        assert_eq!(summary.cycles_requested, 3);
        assert_eq!(summary.cycles_run, 0);
        assert_eq!(summary.total_agents_evolved, 0);
        assert_eq!(summary.average_gain_per_agent, 0.0);
        assert_eq!(store.learning_events().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let store = store_with(uniform_population(4, 0.5));
        store
            .fail_fetches(
                StorageError::Query {
                    message: "permission denied for table agents".to_string(),
                },
                1,
            )
            .unwrap();
        let result = engine(&store)
            .run_with_rng(&EvolutionRequest::default(), "req-fatal", &mut seeded_rng(1))
            .await;
        assert_storage_error(&result);
        assert!(store.learning_events().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_fetch_failure_is_retried() {
        let store = store_with(uniform_population(4, 0.5));
        store
            .fail_fetches(
                StorageError::Remote {
                    status: 503,
                    message: "upstream unavailable".to_string(),
                },
                2,
            )
            .unwrap();
        let request = EvolutionRequest {
            mode: Some("collective_intelligence".to_string()),
            evolution_cycles: Some(1),
            ..Default::default()
        };
        let summary = engine(&store)
            .run_with_rng(&request, "req-retry", &mut seeded_rng(1))
            .await
            .unwrap();
        assert_eq!(summary.total_agents_evolved, 4);
    }

    #[tokio::test]
    async fn test_summary_event_written_with_sentinel() {
        let store = store_with(vec![Entity::new("solo")]);
        let request = EvolutionRequest {
            mode: Some("hyper_parallel".to_string()),
            evolution_cycles: Some(1),
            ..Default::default()
        };
        engine(&store)
            .run_with_rng(&request, "req-summary", &mut seeded_rng(2))
            .await
            .unwrap();
        let events = store.learning_events().unwrap();
        let summary = events
            .iter()
            .find(|e| e.event_type == LearningEventType::EvolutionSummary)
            .unwrap();
        assert_eq!(summary.entity_id, POPULATION_SENTINEL_ID);
        assert_eq!(summary.event_data["requestId"], "req-summary");
    }
}
