//! Adversarial evolution: shuffled pairwise competition.
//!
//! The population is shuffled and split into consecutive pairs; an odd
//! entity out sits the pass out. Within a pair the higher competitive score
//! wins, and a tie goes to the entity shuffled first. The winner improves
//! across every skill it holds, the loser absorbs the winner's stronger
//! skills, and a competitive relationship is upserted for the pair.

use crate::context::ModeContext;
use crate::outcome::ModeOutcome;
use atlas_core::{
    competitive_score, AdversarialConfig, AtlasResult, Entity, LearningEvent, LearningEventType,
    Relationship,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::json;

/// Result of scoring one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Duel {
    pub winner: usize,
    pub loser: usize,
    pub winner_score: f64,
    pub loser_score: f64,
    pub margin: f64,
}

/// Score changes applied by one duel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DuelGains {
    pub winner: f64,
    pub loser: f64,
    pub skills_absorbed: usize,
}

/// Shuffle indices `0..len` and pair consecutive ones.
pub fn pair_up(len: usize, rng: &mut StdRng) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order.chunks_exact(2).map(|p| (p[0], p[1])).collect()
}

/// Decide a pair. `first` wins ties.
pub fn judge(population: &[Entity], first: usize, second: usize) -> Duel {
    let a = competitive_score(&population[first]);
    let b = competitive_score(&population[second]);
    let (winner, loser, winner_score, loser_score) = if b > a {
        (second, first, b, a)
    } else {
        (first, second, a, b)
    };
    Duel {
        winner,
        loser,
        winner_score,
        loser_score,
        margin: winner_score - loser_score,
    }
}

/// Boost added to each of the winner's skills.
pub fn winner_boost(intensity: f64, base: f64, margin: f64) -> f64 {
    intensity * base * (1.0 + margin)
}

/// Apply a decided duel to the two entities.
pub fn apply_duel(
    winner: &mut Entity,
    loser: &mut Entity,
    margin: f64,
    intensity: f64,
    cfg: &AdversarialConfig,
) -> DuelGains {
    let snapshot = winner.task_specializations.clone();
    let boost = winner_boost(intensity, cfg.winner_base_boost, margin);
    let mut gains = DuelGains::default();

    for key in snapshot.keys() {
        gains.winner += winner.task_specializations.raise(key, boost);
    }
    for (key, winner_score) in snapshot.iter() {
        let weaker = match loser.task_specializations.get(key) {
            Some(own) => own < winner_score,
            None => true,
        };
        if weaker {
            let applied = loser
                .task_specializations
                .raise(key, intensity * cfg.loser_learning);
            if applied > 0.0 {
                gains.skills_absorbed += 1;
                gains.loser += applied;
            }
        }
    }

    winner.raise_success_rate(cfg.winner_success_increment * intensity);
    loser.raise_velocity(cfg.loser_velocity_increment * intensity);
    gains
}

/// Two distinct mutable entries of a slice.
fn pair_mut(entities: &mut [Entity], i: usize, j: usize) -> (&mut Entity, &mut Entity) {
    if i < j {
        let (left, right) = entities.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = entities.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

pub async fn run(
    ctx: &ModeContext<'_>,
    population: &mut [Entity],
    rng: &mut StdRng,
) -> AtlasResult<ModeOutcome> {
    let cfg = &ctx.config.adversarial;
    let mut outcome = ModeOutcome::default();
    let pairs = pair_up(population.len(), rng);
    tracing::info!(population = population.len(), pairs = pairs.len(), "Adversarial evolution started");

    let mut events = Vec::with_capacity(pairs.len());
    let mut contenders = Vec::with_capacity(pairs.len() * 2);

    for (first, second) in pairs {
        let duel = judge(population, first, second);
        let (winner, loser) = pair_mut(population, duel.winner, duel.loser);
        let gains = apply_duel(winner, loser, duel.margin, ctx.intensity, cfg);

        let relationship = Relationship::competitive(
            winner.entity_id,
            loser.entity_id,
            1.0 - duel.margin,
            json!({
                "winner": winner.entity_id,
                "winnerScore": duel.winner_score,
                "loserScore": duel.loser_score,
                "margin": duel.margin,
                "requestId": ctx.request_id,
            }),
        );
        if let Err(e) = ctx.writer.upsert_relationship(&relationship).await {
            tracing::warn!(
                winner = %winner.entity_id,
                loser = %loser.entity_id,
                error = %e,
                "Relationship upsert skipped"
            );
        }

        events.push(LearningEvent::new(
            winner.entity_id,
            LearningEventType::AdversarialOutcome,
            json!({
                "winner": winner.entity_id,
                "loser": loser.entity_id,
                "margin": duel.margin,
                "winnerGain": gains.winner,
                "loserGain": gains.loser,
                "skillsAbsorbed": gains.skills_absorbed,
            }),
            duel.margin,
        ));

        outcome.record(winner, gains.winner);
        outcome.record(loser, gains.loser);
        outcome.competitions += 1;
        contenders.push(duel.winner);
        contenders.push(duel.loser);
    }

    let touched: Vec<&Entity> = contenders.iter().map(|&i| &population[i]).collect();
    ctx.persist(&mut outcome, &[], &events, &touched).await;

    tracing::info!(
        competitions = outcome.competitions,
        knowledge_gained = outcome.knowledge_gained,
        "Adversarial evolution finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_test_utils::fixtures::{entity_with, seeded_rng};

    #[test]
    fn test_pair_up_drops_odd_entity() {
        let mut rng = seeded_rng(7);
        let pairs = pair_up(5, &mut rng);
        assert_eq!(pairs.len(), 2);
        let mut seen: Vec<usize> = pairs.iter().flat_map(|&(a, b)| [a, b]).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_judge_tie_goes_to_first() {
        let population = vec![entity_with("a", 0.5, &[]), entity_with("b", 0.5, &[])];
        let duel = judge(&population, 1, 0);
        assert_eq!(duel.winner, 1);
        assert_eq!(duel.margin, 0.0);
    }

    #[test]
    fn test_loser_absorbs_only_stronger_skills() {
        let cfg = AdversarialConfig::default();
        let mut winner = entity_with("w", 0.9, &[("research", 0.6), ("planning", 0.2)]);
        let mut loser = entity_with("l", 0.1, &[("research", 0.3), ("planning", 0.5)]);
        let gains = apply_duel(&mut winner, &mut loser, 0.3, 1.0, &cfg);

        assert_eq!(gains.skills_absorbed, 1);
        assert!((loser.task_specializations.score("research") - 0.315).abs() < 1e-9);
        assert_eq!(loser.task_specializations.score("planning"), 0.5);
        assert!(winner.task_specializations.score("planning") > 0.2);
        assert!(loser.learning_velocity > 0.0);
        assert!(winner.success_rate > 0.9);
    }

    #[test]
    fn test_loser_learns_missing_skills() {
        let cfg = AdversarialConfig::default();
        let mut winner = entity_with("w", 0.9, &[("automation", 0.4)]);
        let mut loser = entity_with("l", 0.1, &[]);
        apply_duel(&mut winner, &mut loser, 0.5, 2.0, &cfg);
        assert!((loser.task_specializations.score("automation") - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_pair_mut_either_order() {
        let mut population = vec![entity_with("a", 0.1, &[]), entity_with("b", 0.2, &[])];
        let (x, y) = pair_mut(&mut population, 1, 0);
        assert_eq!(x.name, "b");
        assert_eq!(y.name, "a");
    }
}
