//! Evolution mode executors.
//!
//! Every executor has the same shape: it takes the shared [`ModeContext`],
//! mutates the fetched population in place, writes its records through the
//! batch layer and returns a [`ModeOutcome`]. A failed read skips the
//! executor's segment with a warning; write failures are folded into the
//! outcome.

pub mod adversarial;
pub mod benchmark;
pub mod collective;
pub mod crystallization;
pub mod discovery;
pub mod knowledge;
pub mod parallel;
pub mod topics;

use crate::context::ModeContext;
use crate::outcome::ModeOutcome;
use crate::request::EvolutionMode;
use atlas_core::{group_by_sector, shuffled_sample, AtlasResult, Entity};
use rand::rngs::StdRng;

/// Run `mode`, expanding `FullAcceleration` into its six stages.
pub async fn run_mode(
    mode: EvolutionMode,
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    rng: &mut StdRng,
) -> AtlasResult<ModeOutcome> {
    let mut total = ModeOutcome::default();
    for &stage in mode.stages() {
        total.merge(run_stage(stage, ctx, population, rng).await?);
    }
    Ok(total)
}

async fn run_stage(
    stage: EvolutionMode,
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    rng: &mut StdRng,
) -> AtlasResult<ModeOutcome> {
    match stage {
        EvolutionMode::CollectiveIntelligence => collective::run(ctx, population, rng).await,
        EvolutionMode::HyperParallelLearning => parallel::run(ctx, population, rng).await,
        EvolutionMode::AdversarialEvolution => adversarial::run(ctx, population, rng).await,
        EvolutionMode::MemoryCrystallization => crystallization::run(ctx, population, rng).await,
        EvolutionMode::KnowledgeAbsorption => knowledge::run(ctx, population, rng).await,
        EvolutionMode::TaskDiscovery => discovery::run(ctx, population, rng).await,
        // never a stage of itself
        EvolutionMode::FullAcceleration => Ok(ModeOutcome::default()),
    }
}

/// Sectors chosen for one external-knowledge pass, with their members.
///
/// `ceil(intensity * per_intensity)` sectors, at least one, at most all of
/// them, drawn without replacement.
pub(crate) fn sample_sectors(
    population: &[Entity],
    per_intensity: f64,
    intensity: f64,
    rng: &mut StdRng,
) -> Vec<(String, Vec<usize>)> {
    let groups: Vec<(String, Vec<usize>)> = group_by_sector(population).into_iter().collect();
    if groups.is_empty() {
        return groups;
    }
    let wanted = ((intensity * per_intensity).ceil().max(1.0) as usize).min(groups.len());
    shuffled_sample(&groups, wanted, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_test_utils::fixtures::{population, seeded_rng};

    #[test]
    fn test_sample_sectors_bounds() {
        let population = population(9);
        let mut rng = seeded_rng(11);
        assert_eq!(sample_sectors(&population, 1.0, 0.1, &mut rng).len(), 1);
        assert_eq!(sample_sectors(&population, 1.0, 2.0, &mut rng).len(), 2);
        let all = sample_sectors(&population, 1.0, 10.0, &mut rng);
        assert_eq!(all.len(), 3);
        let members: usize = all.iter().map(|(_, m)| m.len()).sum();
        assert_eq!(members, 9);
    }

    #[test]
    fn test_sample_sectors_empty_population() {
        let mut rng = seeded_rng(1);
        assert!(sample_sectors(&[], 1.0, 3.0, &mut rng).is_empty());
    }
}
