//! Atlas Core - Records, Scoring and Retry
//!
//! Data model for the evolution engine: scored entities, memories, learning
//! events, relationships and task-queue items. Also the shared scoring
//! primitives, the transient-failure retry utility and the tuning table.
//! Every other crate depends on this one.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod retry;
pub mod scoring;

pub use config::{
    AdversarialConfig, BatchConfig, BenchmarkConfig, CollectiveConfig, CrystallizationConfig,
    DiscoveryConfig, EvolutionConfig, KnowledgeConfig, ParallelConfig,
};
pub use entities::{
    Entity, EntityUpdate, LearningEvent, MemoryRecord, Relationship, Specializations,
    TaskQueueItem, DEFAULT_SECTOR,
};
pub use enums::{
    LearningEventType, MemoryType, ParseEnumError, RelationshipType, SkillType, TaskPriority,
    TaskStatus,
};
pub use error::{
    AtlasError, AtlasResult, ConfigError, LlmError, RecordKind, StorageError, ValidationError,
};
pub use identity::{
    compute_content_hash, content_prefix_hash, new_entity_id, ContentHash, EntityId, Timestamp,
    POPULATION_SENTINEL_ID,
};
pub use retry::{is_transient, is_transient_message, with_retry, RetryPolicy};
pub use scoring::{clamp, clamp_unit, competitive_score, group_by_sector, shuffled_sample};
