//! Collective intelligence: top performers' skills flow to everyone.

use crate::context::ModeContext;
use crate::outcome::ModeOutcome;
use atlas_core::{AtlasResult, Entity, LearningEvent, LearningEventType, MemoryRecord, MemoryType};
use rand::rngs::StdRng;
use serde_json::json;
use std::collections::BTreeMap;

/// Holders and summed score of one skill among the top performers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillPool {
    pub holders: usize,
    pub total_score: f64,
}

impl SkillPool {
    pub fn average(&self) -> f64 {
        if self.holders == 0 {
            0.0
        } else {
            self.total_score / self.holders as f64
        }
    }
}

/// Indices of the top performers: above the floor, best first, capped at
/// `ceil(len * fraction)`.
pub fn top_performers(population: &[Entity], floor: f64, fraction: f64) -> Vec<usize> {
    let mut qualified: Vec<usize> = (0..population.len())
        .filter(|&i| population[i].success_rate > floor)
        .collect();
    qualified.sort_by(|&a, &b| {
        population[b]
            .success_rate
            .total_cmp(&population[a].success_rate)
    });
    let cap = (population.len() as f64 * fraction).ceil() as usize;
    qualified.truncate(cap);
    qualified
}

/// Skills held (score above zero) by the given entities.
pub fn aggregate_skills(population: &[Entity], indices: &[usize]) -> BTreeMap<String, SkillPool> {
    let mut pools: BTreeMap<String, SkillPool> = BTreeMap::new();
    for &i in indices {
        for (key, score) in population[i].task_specializations.iter() {
            if score > 0.0 {
                let pool = pools.entry(key.to_string()).or_default();
                pool.holders += 1;
                pool.total_score += score;
            }
        }
    }
    pools
}

pub async fn run(
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    _rng: &mut StdRng,
) -> AtlasResult<ModeOutcome> {
    let cfg = &ctx.config.collective;
    let mut outcome = ModeOutcome::default();

    let top = top_performers(population, cfg.top_performer_floor, cfg.top_fraction);
    let pools = aggregate_skills(population, &top);
    tracing::info!(
        population = population.len(),
        top_performers = top.len(),
        skills = pools.len(),
        "Collective intelligence started"
    );

    let mut memories = Vec::new();
    let mut events = Vec::new();

    for entity in population.iter_mut() {
        let mut gain = 0.0;
        let mut transferred = 0usize;
        for (key, pool) in &pools {
            let boost = (ctx.intensity * cfg.base_boost * pool.holders as f64).min(cfg.max_boost);
            let applied = entity.task_specializations.raise(key, boost);
            if applied > 0.0 {
                transferred += 1;
                gain += applied;
            }
        }
        entity.raise_velocity(cfg.velocity_increment * ctx.intensity);

        if gain > cfg.materiality_threshold {
            memories.push(
                MemoryRecord::new(
                    entity.entity_id,
                    MemoryType::CollectiveLearning,
                    format!(
                        "Absorbed {} skill transfers from {} top performers",
                        transferred,
                        top.len()
                    ),
                    gain,
                )
                .with_owner(entity.owner_id)
                .with_context(json!({
                    "requestId": ctx.request_id,
                    "skillsTransferred": transferred,
                    "knowledgeGained": gain,
                })),
            );
            events.push(LearningEvent::new(
                entity.entity_id,
                LearningEventType::CollectiveTransfer,
                json!({
                    "skillsTransferred": transferred,
                    "topPerformers": top.len(),
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
        material = memories.len(),
        "Collective intelligence finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_test_utils::fixtures::entity_with;

    #[test]
    fn test_top_performers_floor_and_cap() {
        let population = vec![
            entity_with("a", 0.95, &[]),
            entity_with("b", 0.8, &[]),
            entity_with("c", 0.75, &[]),
            entity_with("d", 0.5, &[]),
            entity_with("e", 0.7, &[]),
        ];
        // ceil(5 * 0.2) = 1
        assert_eq!(top_performers(&population, 0.7, 0.2), vec![0]);
        // 0.7 is not strictly above the floor
        assert_eq!(top_performers(&population, 0.7, 1.0), vec![0, 1, 2]);
    }

    #[test]
    fn test_aggregate_ignores_zero_scores() {
        let population = vec![
            entity_with("a", 0.9, &[("research", 0.8), ("planning", 0.0)]),
            entity_with("b", 0.9, &[("research", 0.4)]),
        ];
        let pools = aggregate_skills(&population, &[0, 1]);
        assert_eq!(pools.len(), 1);
        assert_eq!(pools["research"].holders, 2);
        assert!((pools["research"].average() - 0.6).abs() < 1e-12);
    }
}
