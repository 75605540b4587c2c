//! Hyper-parallel learning: independent random skill exploration per entity.

use crate::context::ModeContext;
use crate::outcome::ModeOutcome;
use atlas_core::{
    shuffled_sample, AtlasResult, Entity, LearningEvent, LearningEventType, MemoryRecord,
    MemoryType, ParallelConfig, SkillType,
};
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::json;

/// Number of skills each entity explores at `intensity`.
pub fn skills_per_entity(cfg: &ParallelConfig, intensity: f64) -> usize {
    let raw = (cfg.base_skill_count as f64 + intensity * cfg.skills_per_intensity).floor();
    (raw.max(0.0) as usize).min(SkillType::COUNT)
}

pub async fn run(
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    rng: &mut StdRng,
) -> AtlasResult<ModeOutcome> {
    let cfg = &ctx.config.parallel;
    let k = skills_per_entity(cfg, ctx.intensity);
    let mut outcome = ModeOutcome::default();
    let mut memories = Vec::new();
    let mut events = Vec::new();

    tracing::info!(population = population.len(), skills_per_entity = k, "Hyper-parallel learning started");

    for entity in population.iter_mut() {
        let selected = shuffled_sample(&SkillType::ALL, k, rng);
        let mut gain = 0.0;
        let mut learned = Vec::with_capacity(selected.len());
        for skill in &selected {
            let boost = ctx.intensity * (cfg.base_boost + rng.random::<f64>() * cfg.variance);
            let applied = entity.task_specializations.raise(skill.as_str(), boost);
            gain += applied;
            learned.push(skill.as_str());
        }
        entity.raise_velocity(cfg.velocity_increment * ctx.intensity);

        if gain > cfg.materiality_threshold {
            memories.push(
                MemoryRecord::new(
                    entity.entity_id,
                    MemoryType::Skill,
                    format!("Parallel practice across {}", learned.join(", ")),
                    gain,
                )
                .with_owner(entity.owner_id)
                .with_context(json!({
                    "requestId": ctx.request_id,
                    "skills": learned,
                })),
            );
            events.push(LearningEvent::new(
                entity.entity_id,
                LearningEventType::ParallelLearning,
                json!({
                    "skills": learned,
                    "knowledgeGained": gain,
                    "intensity": ctx.intensity,
                }),
                gain,
            ));
        }
        outcome.record(entity, gain);
    }

    let touched: Vec<&Entity> = population.iter().collect();
    ctx.persist(&mut outcome, &memories, &events, &touched).await;

    tracing::info!(
        touched = outcome.touched(),
        knowledge_gained = outcome.knowledge_gained,
        "Hyper-parallel learning finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skills_per_entity_scales_and_caps() {
        let cfg = ParallelConfig::default();
        assert_eq!(skills_per_entity(&cfg, 1.0), 3);
        assert_eq!(skills_per_entity(&cfg, 2.5), 4);
        assert_eq!(skills_per_entity(&cfg, 10.0), SkillType::COUNT);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use atlas_llm::ProviderRegistry;
    use atlas_storage::PopulationFilter;
    use atlas_test_utils::assertions::assert_scores_in_unit_interval;
    use atlas_test_utils::fixtures::{fast_config, fast_writer, seeded_rng, store_with};
    use atlas_test_utils::generators::arb_population;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_scores_stay_in_unit_interval(
            population in arb_population(8),
            intensity in 0.1f64..10.0,
            seed in any::<u64>(),
        ) {
            let store = store_with(population.clone());
            let writer = fast_writer(&store);
            let providers = ProviderRegistry::new();
            let config = fast_config();
            let filter = PopulationFilter::default();
            let ctx = ModeContext {
                writer: &writer,
                providers: &providers,
                config: &config,
                intensity,
                filter: &filter,
                request_id: "req-prop",
            };

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let mut population = population;
            let mut rng = seeded_rng(seed);
            let outcome = runtime
                .block_on(run(&ctx, &mut population, &mut rng))
                .unwrap();

            prop_assert_eq!(outcome.touched(), population.len());
            for entity in &population {
                assert_scores_in_unit_interval(entity);
            }
            for entity in store.entities().unwrap() {
                assert_scores_in_unit_interval(&entity);
            }
        }
    }
}
