//! Run request parsing and validation.

use atlas_storage::PopulationFilter;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const MAX_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_INTENSITY: f64 = 3.0;
pub const MIN_INTENSITY: f64 = 0.1;
pub const MAX_INTENSITY: f64 = 10.0;
pub const DEFAULT_CYCLES: u32 = 5;
pub const MAX_CYCLES: u32 = 20;

// ============================================================================
// MODES
// ============================================================================

/// Which executor(s) a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionMode {
    CollectiveIntelligence,
    HyperParallelLearning,
    AdversarialEvolution,
    MemoryCrystallization,
    KnowledgeAbsorption,
    TaskDiscovery,
    /// All six executors in sequence.
    #[default]
    FullAcceleration,
}

impl EvolutionMode {
    /// The six single executors, in full-acceleration order.
    pub const SEQUENCE: [EvolutionMode; 6] = [
        EvolutionMode::CollectiveIntelligence,
        EvolutionMode::HyperParallelLearning,
        EvolutionMode::AdversarialEvolution,
        EvolutionMode::MemoryCrystallization,
        EvolutionMode::KnowledgeAbsorption,
        EvolutionMode::TaskDiscovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionMode::CollectiveIntelligence => "collective_intelligence",
            EvolutionMode::HyperParallelLearning => "hyper_parallel_learning",
            EvolutionMode::AdversarialEvolution => "adversarial_evolution",
            EvolutionMode::MemoryCrystallization => "memory_crystallization",
            EvolutionMode::KnowledgeAbsorption => "knowledge_absorption",
            EvolutionMode::TaskDiscovery => "task_discovery",
            EvolutionMode::FullAcceleration => "full_acceleration",
        }
    }

    /// Parse a mode tag. Anything unrecognised runs everything.
    pub fn parse_lenient(tag: &str) -> Self {
        match tag.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "collective_intelligence" | "collective" => EvolutionMode::CollectiveIntelligence,
            "hyper_parallel_learning" | "hyper_parallel" | "parallel_learning" => {
                EvolutionMode::HyperParallelLearning
            }
            "adversarial_evolution" | "adversarial" => EvolutionMode::AdversarialEvolution,
            "memory_crystallization" | "crystallization" => EvolutionMode::MemoryCrystallization,
            "knowledge_absorption" | "web_knowledge" | "external_knowledge" => {
                EvolutionMode::KnowledgeAbsorption
            }
            "task_discovery" | "task_pattern_discovery" => EvolutionMode::TaskDiscovery,
            _ => EvolutionMode::FullAcceleration,
        }
    }

    /// Executors this mode runs, in order.
    pub fn stages(&self) -> &'static [EvolutionMode] {
        match self {
            EvolutionMode::FullAcceleration => &Self::SEQUENCE,
            EvolutionMode::CollectiveIntelligence => &Self::SEQUENCE[0..1],
            EvolutionMode::HyperParallelLearning => &Self::SEQUENCE[1..2],
            EvolutionMode::AdversarialEvolution => &Self::SEQUENCE[2..3],
            EvolutionMode::MemoryCrystallization => &Self::SEQUENCE[3..4],
            EvolutionMode::KnowledgeAbsorption => &Self::SEQUENCE[4..5],
            EvolutionMode::TaskDiscovery => &Self::SEQUENCE[5..6],
        }
    }
}

impl fmt::Display for EvolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// REQUEST
// ============================================================================

/// Raw run request as received. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub intensity_multiplier: Option<f64>,
    #[serde(default)]
    pub evolution_cycles: Option<i64>,
    #[serde(default)]
    pub target_sector: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// Request after defaults and clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub mode: EvolutionMode,
    pub batch_size: usize,
    pub intensity: f64,
    pub cycles: u32,
    pub filter: PopulationFilter,
    pub user_id: Option<Uuid>,
}

impl EvolutionRequest {
    /// Apply defaults and clamp every numeric field into range.
    pub fn validate(&self) -> ValidatedRequest {
        let mode = self
            .mode
            .as_deref()
            .map(EvolutionMode::parse_lenient)
            .unwrap_or_default();

        let batch_size = self
            .batch_size
            .map(|b| b.clamp(1, MAX_BATCH_SIZE as i64) as usize)
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let intensity = match self.intensity_multiplier {
            Some(v) if v.is_finite() => v.clamp(MIN_INTENSITY, MAX_INTENSITY),
            Some(v) if v == f64::INFINITY => MAX_INTENSITY,
            Some(v) if v == f64::NEG_INFINITY => MIN_INTENSITY,
            _ => DEFAULT_INTENSITY,
        };

        let cycles = self
            .evolution_cycles
            .map(|c| c.clamp(1, MAX_CYCLES as i64) as u32)
            .unwrap_or(DEFAULT_CYCLES);

        let target_sector = self
            .target_sector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        ValidatedRequest {
            mode,
            batch_size,
            intensity,
            cycles,
            filter: PopulationFilter {
                sector: target_sector,
                owner_id: self.user_id,
            },
            user_id: self.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let v = EvolutionRequest::default().validate();
        assert_eq!(v.mode, EvolutionMode::FullAcceleration);
        assert_eq!(v.batch_size, 500);
        assert_eq!(v.intensity, 3.0);
        assert_eq!(v.cycles, 5);
        assert_eq!(v.filter, PopulationFilter::default());
    }

    #[test]
    fn test_clamping() {
        let v = EvolutionRequest {
            batch_size: Some(5_000),
            intensity_multiplier: Some(0.0),
            evolution_cycles: Some(-3),
            ..Default::default()
        }
        .validate();
        assert_eq!(v.batch_size, 1_000);
        assert_eq!(v.intensity, 0.1);
        assert_eq!(v.cycles, 1);

        let v = EvolutionRequest {
            batch_size: Some(0),
            intensity_multiplier: Some(42.0),
            evolution_cycles: Some(99),
            ..Default::default()
        }
        .validate();
        assert_eq!(v.batch_size, 1);
        assert_eq!(v.intensity, 10.0);
        assert_eq!(v.cycles, 20);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_full() {
        assert_eq!(
            EvolutionMode::parse_lenient("warp_speed"),
            EvolutionMode::FullAcceleration
        );
        assert_eq!(
            EvolutionMode::parse_lenient("Web-Knowledge"),
            EvolutionMode::KnowledgeAbsorption
        );
        assert_eq!(
            EvolutionMode::parse_lenient("hyper_parallel"),
            EvolutionMode::HyperParallelLearning
        );
    }

    #[test]
    fn test_stages() {
        assert_eq!(EvolutionMode::FullAcceleration.stages().len(), 6);
        assert_eq!(
            EvolutionMode::AdversarialEvolution.stages(),
            &[EvolutionMode::AdversarialEvolution]
        );
        for mode in EvolutionMode::SEQUENCE {
            assert_eq!(mode.stages(), &[mode]);
        }
    }

    #[test]
    fn test_camel_case_request_and_filters() {
        let user = Uuid::now_v7();
        let json = format!(
            r#"{{"mode":"adversarial_evolution","batchSize":20,"intensityMultiplier":1.5,
                "evolutionCycles":2,"targetSector":" FINANCE ","userId":"{user}"}}"#
        );
        let request: EvolutionRequest = serde_json::from_str(&json).unwrap();
        let v = request.validate();
        assert_eq!(v.mode, EvolutionMode::AdversarialEvolution);
        assert_eq!(v.batch_size, 20);
        assert_eq!(v.filter.sector.as_deref(), Some("FINANCE"));
        assert_eq!(v.filter.owner_id, Some(user));
    }

    #[test]
    fn test_blank_sector_ignored() {
        let v = EvolutionRequest {
            target_sector: Some("   ".to_string()),
            ..Default::default()
        }
        .validate();
        assert!(v.filter.sector.is_none());
    }
}
