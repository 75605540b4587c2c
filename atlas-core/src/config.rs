//! Tuning table for the evolution engine.
//!
//! One immutable struct passed by reference into every mode. Defaults are
//! production values; tests override individual fields. A TOML file can
//! overlay any subset of fields.

use crate::retry::RetryPolicy;
use crate::{AtlasError, AtlasResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// PER-MODE SECTIONS
// ============================================================================

/// Collective intelligence: top performers teach the whole population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectiveConfig {
    /// Success rate an entity must exceed to count as a top performer.
    pub top_performer_floor: f64,
    /// Share of qualifying entities (by count) kept as top performers.
    pub top_fraction: f64,
    pub base_boost: f64,
    pub max_boost: f64,
    /// Total gain above which a memory and event are recorded.
    pub materiality_threshold: f64,
    pub velocity_increment: f64,
}

impl Default for CollectiveConfig {
    fn default() -> Self {
        Self {
            top_performer_floor: 0.7,
            top_fraction: 0.2,
            base_boost: 0.02,
            max_boost: 0.15,
            materiality_threshold: 0.05,
            velocity_increment: 0.005,
        }
    }
}

/// Hyper-parallel learning: independent random exploration per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParallelConfig {
    pub base_skill_count: usize,
    pub skills_per_intensity: f64,
    pub base_boost: f64,
    pub variance: f64,
    pub velocity_increment: f64,
    pub materiality_threshold: f64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            base_skill_count: 2,
            skills_per_intensity: 1.0,
            base_boost: 0.01,
            variance: 0.02,
            velocity_increment: 0.02,
            materiality_threshold: 0.05,
        }
    }
}

/// Adversarial evolution: pairwise competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdversarialConfig {
    pub winner_base_boost: f64,
    /// Per-skill gain for the loser, independent of margin.
    pub loser_learning: f64,
    pub winner_success_increment: f64,
    pub loser_velocity_increment: f64,
}

impl Default for AdversarialConfig {
    fn default() -> Self {
        Self {
            winner_base_boost: 0.01,
            loser_learning: 0.015,
            winner_success_increment: 0.005,
            loser_velocity_increment: 0.01,
        }
    }
}

/// Memory crystallization and propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrystallizationConfig {
    /// Success rate a source entity must exceed.
    pub min_success_rate: f64,
    pub max_sources: usize,
    /// Sources taken regardless of threshold when none qualify.
    pub fallback_sources: usize,
    pub max_memories: usize,
    pub min_importance: f64,
    /// Most recent memories taken when none clear `min_importance`.
    pub fallback_memories: usize,
    pub importance_floor: f64,
    pub dedup_prefix_chars: usize,
    pub importance_boost: f64,
    pub propagation_decay: f64,
    pub copies_per_intensity: f64,
    pub knowledge_per_crystal: f64,
    pub velocity_increment: f64,
}

impl Default for CrystallizationConfig {
    fn default() -> Self {
        Self {
            min_success_rate: 0.3,
            max_sources: 100,
            fallback_sources: 25,
            max_memories: 150,
            min_importance: 0.5,
            fallback_memories: 50,
            importance_floor: 0.3,
            dedup_prefix_chars: 50,
            importance_boost: 0.05,
            propagation_decay: 0.7,
            copies_per_intensity: 3.0,
            knowledge_per_crystal: 0.01,
            velocity_increment: 0.005,
        }
    }
}

/// External-knowledge absorption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KnowledgeConfig {
    pub sectors_per_intensity: f64,
    pub max_content_chars: usize,
    pub max_citations: usize,
    pub skill_boost: f64,
    pub memory_importance: f64,
    pub inter_call_delay_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            sectors_per_intensity: 1.0,
            max_content_chars: 2_000,
            max_citations: 5,
            skill_boost: 0.01,
            memory_importance: 0.7,
            inter_call_delay_ms: 1_000,
            max_tokens: 1_024,
            temperature: 0.2,
        }
    }
}

impl KnowledgeConfig {
    pub fn inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.inter_call_delay_ms)
    }
}

/// Task-pattern discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub sectors_per_intensity: f64,
    pub max_tasks_per_sector: usize,
    pub skill_boost: f64,
    pub memory_importance: f64,
    pub inter_call_delay_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sectors_per_intensity: 1.0,
            max_tasks_per_sector: 10,
            skill_boost: 0.005,
            memory_importance: 0.6,
            inter_call_delay_ms: 1_000,
            max_tokens: 2_048,
            temperature: 0.4,
        }
    }
}

impl DiscoveryConfig {
    pub fn inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.inter_call_delay_ms)
    }
}

/// Benchmark enhancement over discovered tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    pub synthetic_per_intensity: f64,
    /// Relative widening of the observed complexity range when sampling.
    pub complexity_jitter: f64,
    pub max_criteria: usize,
    pub max_edge_cases: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            synthetic_per_intensity: 1.0,
            complexity_jitter: 0.2,
            max_criteria: 3,
            max_edge_cases: 3,
        }
    }
}

/// Chunking and pacing for the batch persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub insert_chunk_size: usize,
    pub update_chunk_size: usize,
    /// Sleep between update chunks.
    pub pacing_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            insert_chunk_size: 50,
            update_chunk_size: 10,
            pacing_ms: 100,
        }
    }
}

impl BatchConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

// ============================================================================
// EVOLUTION CONFIG
// ============================================================================

/// Full tuning table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvolutionConfig {
    pub collective: CollectiveConfig,
    pub parallel: ParallelConfig,
    pub adversarial: AdversarialConfig,
    pub crystallization: CrystallizationConfig,
    pub knowledge: KnowledgeConfig,
    pub discovery: DiscoveryConfig,
    pub benchmark: BenchmarkConfig,
    pub batch: BatchConfig,
    /// Policy for store reads and writes.
    pub store_retry: RetryPolicy,
    /// Policy for knowledge provider calls.
    pub external_retry: RetryPolicy,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            collective: CollectiveConfig::default(),
            parallel: ParallelConfig::default(),
            adversarial: AdversarialConfig::default(),
            crystallization: CrystallizationConfig::default(),
            knowledge: KnowledgeConfig::default(),
            discovery: DiscoveryConfig::default(),
            benchmark: BenchmarkConfig::default(),
            batch: BatchConfig::default(),
            store_retry: RetryPolicy::store_writes(),
            external_retry: RetryPolicy::external_api(),
        }
    }
}

impl EvolutionConfig {
    /// Defaults with every sleep removed. Used by tests.
    pub fn without_delays() -> Self {
        let mut config = Self::default();
        config.batch.pacing_ms = 0;
        config.knowledge.inter_call_delay_ms = 0;
        config.discovery.inter_call_delay_ms = 0;
        config.store_retry = RetryPolicy::immediate(config.store_retry.max_retries);
        config.external_retry = RetryPolicy::immediate(config.external_retry.max_retries);
        config
    }

    /// Parse a TOML overlay. Missing fields keep their defaults.
    pub fn from_toml_str(contents: &str) -> AtlasResult<Self> {
        let config: EvolutionConfig = toml::from_str(contents).map_err(|e| {
            AtlasError::Config(ConfigError::Load {
                reason: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML overlay file.
    pub fn from_path(path: &Path) -> AtlasResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AtlasError::Config(ConfigError::Load {
                reason: format!("{}: {}", path.display(), e),
            })
        })?;
        Self::from_toml_str(&contents)
    }

    /// Validate that every constant is usable.
    pub fn validate(&self) -> AtlasResult<()> {
        let c = &self.collective;
        check_unit("collective.top_performer_floor", c.top_performer_floor)?;
        check_fraction("collective.top_fraction", c.top_fraction)?;
        check_unit("collective.base_boost", c.base_boost)?;
        check_unit("collective.max_boost", c.max_boost)?;
        check_unit("collective.materiality_threshold", c.materiality_threshold)?;
        check_unit("collective.velocity_increment", c.velocity_increment)?;

        let p = &self.parallel;
        check_unit("parallel.base_boost", p.base_boost)?;
        check_unit("parallel.variance", p.variance)?;
        check_unit("parallel.velocity_increment", p.velocity_increment)?;
        check_unit("parallel.materiality_threshold", p.materiality_threshold)?;
        check_non_negative("parallel.skills_per_intensity", p.skills_per_intensity)?;

        let a = &self.adversarial;
        check_unit("adversarial.winner_base_boost", a.winner_base_boost)?;
        check_unit("adversarial.loser_learning", a.loser_learning)?;
        check_unit("adversarial.winner_success_increment", a.winner_success_increment)?;
        check_unit("adversarial.loser_velocity_increment", a.loser_velocity_increment)?;

        let m = &self.crystallization;
        check_unit("crystallization.min_success_rate", m.min_success_rate)?;
        check_unit("crystallization.min_importance", m.min_importance)?;
        check_unit("crystallization.importance_floor", m.importance_floor)?;
        check_unit("crystallization.importance_boost", m.importance_boost)?;
        check_fraction("crystallization.propagation_decay", m.propagation_decay)?;
        check_unit("crystallization.knowledge_per_crystal", m.knowledge_per_crystal)?;
        check_unit("crystallization.velocity_increment", m.velocity_increment)?;
        check_non_negative("crystallization.copies_per_intensity", m.copies_per_intensity)?;
        check_positive_count("crystallization.max_sources", m.max_sources)?;
        check_positive_count("crystallization.fallback_sources", m.fallback_sources)?;
        check_positive_count("crystallization.max_memories", m.max_memories)?;
        check_positive_count("crystallization.fallback_memories", m.fallback_memories)?;
        check_positive_count("crystallization.dedup_prefix_chars", m.dedup_prefix_chars)?;

        let k = &self.knowledge;
        check_non_negative("knowledge.sectors_per_intensity", k.sectors_per_intensity)?;
        check_unit("knowledge.skill_boost", k.skill_boost)?;
        check_unit("knowledge.memory_importance", k.memory_importance)?;
        check_positive_count("knowledge.max_content_chars", k.max_content_chars)?;

        let d = &self.discovery;
        check_non_negative("discovery.sectors_per_intensity", d.sectors_per_intensity)?;
        check_unit("discovery.skill_boost", d.skill_boost)?;
        check_unit("discovery.memory_importance", d.memory_importance)?;

        let b = &self.benchmark;
        check_non_negative("benchmark.synthetic_per_intensity", b.synthetic_per_intensity)?;
        check_unit("benchmark.complexity_jitter", b.complexity_jitter)?;

        check_positive_count("batch.insert_chunk_size", self.batch.insert_chunk_size)?;
        check_positive_count("batch.update_chunk_size", self.batch.update_chunk_size)?;

        for (field, policy) in [
            ("store_retry", &self.store_retry),
            ("external_retry", &self.external_retry),
        ] {
            if policy.max_delay_ms < policy.initial_delay_ms {
                return Err(invalid(
                    &format!("{field}.max_delay_ms"),
                    policy.max_delay_ms.to_string(),
                    "must be >= initial_delay_ms",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> AtlasError {
    AtlasError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

fn check_unit(field: &str, value: f64) -> AtlasResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, value.to_string(), "must be between 0.0 and 1.0"));
    }
    Ok(())
}

fn check_fraction(field: &str, value: f64) -> AtlasResult<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(field, value.to_string(), "must be in (0.0, 1.0]"));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> AtlasResult<()> {
    if !(value >= 0.0 && value.is_finite()) {
        return Err(invalid(field, value.to_string(), "must be a non-negative number"));
    }
    Ok(())
}

fn check_positive_count(field: &str, value: usize) -> AtlasResult<()> {
    if value == 0 {
        return Err(invalid(field, value.to_string(), "must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EvolutionConfig::default().validate().is_ok());
        assert!(EvolutionConfig::without_delays().validate().is_ok());
    }

    #[test]
    fn test_default_uses_distinct_policies() {
        let config = EvolutionConfig::default();
        assert_eq!(config.store_retry, RetryPolicy::store_writes());
        assert_eq!(config.external_retry, RetryPolicy::external_api());
    }

    #[test]
    fn test_without_delays_zeroes_sleeps() {
        let config = EvolutionConfig::without_delays();
        assert!(config.batch.pacing().is_zero());
        assert!(config.knowledge.inter_call_delay().is_zero());
        assert!(config.discovery.inter_call_delay().is_zero());
        assert_eq!(config.external_retry.max_delay_ms, 0);
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let mut config = EvolutionConfig::default();
        config.batch.insert_chunk_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch.insert_chunk_size"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = EvolutionConfig::default();
        config.collective.top_performer_floor = 1.5;
        assert!(config.validate().is_err());

        let mut config = EvolutionConfig::default();
        config.collective.top_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_overlay_keeps_defaults() {
        let config = EvolutionConfig::from_toml_str(
            r#"
            [batch]
            insert_chunk_size = 25

            [adversarial]
            loser_learning = 0.03
            "#,
        )
        .unwrap();
        assert_eq!(config.batch.insert_chunk_size, 25);
        assert_eq!(config.batch.update_chunk_size, 10);
        assert_eq!(config.adversarial.loser_learning, 0.03);
        assert_eq!(config.collective, CollectiveConfig::default());
    }

    #[test]
    fn test_toml_unknown_field_rejected() {
        let err = EvolutionConfig::from_toml_str("[batch]\nchunk = 3\n").unwrap_err();
        assert!(matches!(err, AtlasError::Config(ConfigError::Load { .. })));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = EvolutionConfig::from_path(Path::new("/nonexistent/atlas.toml")).unwrap_err();
        assert!(matches!(err, AtlasError::Config(ConfigError::Load { .. })));
    }
}
