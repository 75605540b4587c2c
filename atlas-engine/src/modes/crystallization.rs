//! Memory crystallization and propagation.
//!
//! High-importance memories of the best performers are deduplicated,
//! promoted to crystals, and copied out to the current population with a
//! decayed importance. Both the source query and the memory query have a
//! fallback so the mode produces output whenever anything exists.

use crate::context::ModeContext;
use crate::outcome::ModeOutcome;
use atlas_core::{
    clamp_unit, content_prefix_hash, shuffled_sample, AtlasResult, CrystallizationConfig, Entity,
    EntityId, LearningEvent, LearningEventType, MemoryRecord, MemoryType,
};
use atlas_storage::{EntityQuery, MemoryQuery};
use rand::rngs::StdRng;
use serde_json::json;
use std::collections::HashSet;

/// Memory types produced by this mode, never fed back in as sources.
const DERIVED_TYPES: [MemoryType; 2] = [MemoryType::Crystallized, MemoryType::ReceivedCrystal];

/// Drop memories whose first `prefix_chars` characters repeat an earlier one.
pub fn dedup_by_prefix(memories: Vec<MemoryRecord>, prefix_chars: usize) -> Vec<MemoryRecord> {
    let mut seen = HashSet::new();
    memories
        .into_iter()
        .filter(|m| seen.insert(content_prefix_hash(&m.content, prefix_chars)))
        .collect()
}

/// Promote a source memory to a crystal owned by the same entity.
pub fn crystallize(source: &MemoryRecord, intensity: f64, cfg: &CrystallizationConfig) -> MemoryRecord {
    let importance =
        clamp_unit(source.importance_score.max(cfg.importance_floor) + intensity * cfg.importance_boost);
    MemoryRecord::new(source.entity_id, MemoryType::Crystallized, source.content.clone(), importance)
        .with_owner(source.owner_id)
        .with_context(json!({
            "sourceMemoryId": source.memory_id,
            "sourceType": source.memory_type.as_db_str(),
        }))
}

/// Crystals copied to each entity.
pub fn copies_per_entity(intensity: f64, cfg: &CrystallizationConfig) -> usize {
    (intensity * cfg.copies_per_intensity).ceil().max(0.0) as usize
}

/// Best performers above the threshold, or the best overall when none
/// qualify.
async fn fetch_sources(ctx: &ModeContext<'_>, cfg: &CrystallizationConfig) -> AtlasResult<Vec<Entity>> {
    let sources = ctx
        .fetch_entities(&EntityQuery::top_performers(
            ctx.filter.clone(),
            Some(cfg.min_success_rate),
            cfg.max_sources,
        ))
        .await?;
    if !sources.is_empty() {
        return Ok(sources);
    }
    tracing::info!(
        min_success_rate = cfg.min_success_rate,
        "No entity above crystallization threshold, using best performers"
    );
    ctx.fetch_entities(&EntityQuery::top_performers(
        ctx.filter.clone(),
        None,
        cfg.fallback_sources,
    ))
    .await
}

/// Important memories of `source_ids`, or their newest when none clear the
/// importance floor.
async fn fetch_source_memories(
    ctx: &ModeContext<'_>,
    cfg: &CrystallizationConfig,
    source_ids: Vec<EntityId>,
) -> AtlasResult<Vec<MemoryRecord>> {
    let memories = ctx
        .fetch_memories(
            &MemoryQuery::most_important(source_ids.clone(), Some(cfg.min_importance), cfg.max_memories)
                .excluding(&DERIVED_TYPES),
        )
        .await?;
    if !memories.is_empty() {
        return Ok(memories);
    }
    tracing::info!(
        min_importance = cfg.min_importance,
        "No memory above importance floor, using most recent"
    );
    ctx.fetch_memories(&MemoryQuery::newest(source_ids, cfg.fallback_memories).excluding(&DERIVED_TYPES))
        .await
}

/// Store read failures skip the mode for this cycle.
pub async fn run(
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    rng: &mut StdRng,
) -> AtlasResult<ModeOutcome> {
    let cfg = &ctx.config.crystallization;
    let mut outcome = ModeOutcome::default();

    let sources = match fetch_sources(ctx, cfg).await {
        Ok(sources) => sources,
        Err(e) => {
            tracing::warn!(error = %e, "Crystallization source query failed, mode skipped");
            return Ok(outcome);
        }
    };
    if sources.is_empty() {
        tracing::info!("No crystallization sources");
        return Ok(outcome);
    }
    let source_ids: Vec<EntityId> = sources.iter().map(|e| e.entity_id).collect();

    let memories = match fetch_source_memories(ctx, cfg, source_ids).await {
        Ok(memories) => memories,
        Err(e) => {
            tracing::warn!(error = %e, "Crystallization memory query failed, mode skipped");
            return Ok(outcome);
        }
    };

    let fetched = memories.len();
    let crystals: Vec<MemoryRecord> = dedup_by_prefix(memories, cfg.dedup_prefix_chars)
        .iter()
        .map(|m| crystallize(m, ctx.intensity, cfg))
        .collect();
    tracing::info!(
        sources = sources.len(),
        memories = fetched,
        crystals = crystals.len(),
        "Memory crystallization started"
    );
    if crystals.is_empty() {
        return Ok(outcome);
    }

    let copies = copies_per_entity(ctx.intensity, cfg);
    let mut received = Vec::new();
    let mut events = Vec::new();

    for entity in population.iter_mut() {
        let foreign: Vec<&MemoryRecord> = crystals
            .iter()
            .filter(|c| c.entity_id != entity.entity_id)
            .collect();
        let picked = shuffled_sample(&foreign, copies, rng);

        for crystal in &picked {
            received.push(
                MemoryRecord::new(
                    entity.entity_id,
                    MemoryType::ReceivedCrystal,
                    crystal.content.clone(),
                    crystal.importance_score * cfg.propagation_decay,
                )
                .with_owner(entity.owner_id)
                .with_context(json!({
                    "originEntityId": crystal.entity_id,
                    "crystalId": crystal.memory_id,
                    "requestId": ctx.request_id,
                })),
            );
        }

        let gain = picked.len() as f64 * cfg.knowledge_per_crystal;
        entity.raise_velocity(cfg.velocity_increment * ctx.intensity);
        if !picked.is_empty() {
            events.push(LearningEvent::new(
                entity.entity_id,
                LearningEventType::MemoryCrystallization,
                json!({
                    "crystalsReceived": picked.len(),
                    "origins": picked.iter().map(|c| c.entity_id).collect::<Vec<_>>(),
                }),
                gain,
            ));
        }
        outcome.record(entity, gain);
    }
    outcome.crystallizations = crystals.len();

    let mut written = crystals;
    written.extend(received);
    let touched: Vec<&Entity> = population.iter().collect();
    ctx.persist(&mut outcome, &written, &events, &touched).await;

    tracing::info!(
        crystallizations = outcome.crystallizations,
        knowledge_gained = outcome.knowledge_gained,
        "Memory crystallization finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_test_utils::fixtures::memory;
    use uuid::Uuid;

    #[test]
    fn test_dedup_by_prefix_keeps_first() {
        let owner = Uuid::now_v7();
        let shared = "x".repeat(50);
        let memories = vec![
            memory(owner, &format!("{shared} first"), 0.9),
            memory(owner, &format!("{shared} second"), 0.8),
            memory(owner, "something else entirely", 0.7),
        ];
        let kept = dedup_by_prefix(memories, 50);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].content.ends_with("first"));
    }

    #[test]
    fn test_crystallize_floors_and_boosts() {
        let cfg = CrystallizationConfig::default();
        let source = memory(Uuid::now_v7(), "weak note", 0.0);
        let crystal = crystallize(&source, 1.0, &cfg);
        assert_eq!(crystal.memory_type, MemoryType::Crystallized);
        assert!((crystal.importance_score - 0.35).abs() < 1e-9);

        let strong = memory(Uuid::now_v7(), "strong note", 0.99);
        assert_eq!(crystallize(&strong, 10.0, &cfg).importance_score, 1.0);
    }

    #[test]
    fn test_copies_per_entity_rounds_up() {
        let cfg = CrystallizationConfig::default();
        assert_eq!(copies_per_entity(1.0, &cfg), 3);
        assert_eq!(copies_per_entity(0.1, &cfg), 1);
        assert_eq!(copies_per_entity(3.0, &cfg), 9);
    }
}
