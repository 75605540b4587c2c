//! Pure scoring primitives shared by every mode.

use crate::entities::Entity;
use crate::SkillType;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

// ============================================================================
// CLAMPING
// ============================================================================

/// Clamp `v` into `[lo, hi]`. NaN collapses to `lo`.
pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        return lo;
    }
    v.max(lo).min(hi)
}

/// Clamp into the unit interval.
pub fn clamp_unit(v: f64) -> f64 {
    clamp(v, 0.0, 1.0)
}

// ============================================================================
// COMPETITIVE SCORE
// ============================================================================

const WEIGHT_SUCCESS: f64 = 0.30;
const WEIGHT_CONFIDENCE: f64 = 0.20;
const WEIGHT_EXPERIENCE: f64 = 0.20;
const WEIGHT_VELOCITY: f64 = 0.15;
const WEIGHT_BREADTH: f64 = 0.15;

/// Tasks completed at which the experience term saturates.
const EXPERIENCE_SATURATION: f64 = 100.0;

/// Ranking used by adversarial pairing.
///
/// Breadth counts distinct specialisation keys against the core skill set
/// and is clamped, since ad hoc keys can push the raw ratio above one.
pub fn competitive_score(entity: &Entity) -> f64 {
    let experience = clamp_unit(entity.total_tasks_completed as f64 / EXPERIENCE_SATURATION);
    let breadth = clamp_unit(entity.task_specializations.len() as f64 / SkillType::COUNT as f64);

    clamp_unit(
        WEIGHT_SUCCESS * clamp_unit(entity.success_rate)
            + WEIGHT_CONFIDENCE * clamp_unit(entity.avg_confidence)
            + WEIGHT_EXPERIENCE * experience
            + WEIGHT_VELOCITY * clamp_unit(entity.learning_velocity)
            + WEIGHT_BREADTH * breadth,
    )
}

// ============================================================================
// SELECTION
// ============================================================================

/// Up to `k` items drawn without replacement (shuffle, then take).
pub fn shuffled_sample<T: Clone, R: Rng + ?Sized>(items: &[T], k: usize, rng: &mut R) -> Vec<T> {
    let mut pool = items.to_vec();
    pool.shuffle(rng);
    pool.truncate(k);
    pool
}

/// Population indices grouped by sector label. Entities without a label
/// land in [`crate::entities::DEFAULT_SECTOR`]. Sectors iterate in name order.
pub fn group_by_sector(entities: &[Entity]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, entity) in entities.iter().enumerate() {
        groups
            .entry(entity.sector_label().to_string())
            .or_default()
            .push(idx);
    }
    groups
}
