//! Error types for Atlas operations

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Kind of persisted record, used in error messages and batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Entity,
    Memory,
    LearningEvent,
    Relationship,
    Task,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordKind::Entity => "entity",
            RecordKind::Memory => "memory",
            RecordKind::LearningEvent => "learning_event",
            RecordKind::Relationship => "relationship",
            RecordKind::Task => "task",
        };
        f.write_str(s)
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store connection unavailable: {reason}")]
    Connection { reason: String },

    #[error("Store responded with status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Store query failed: {message}")]
    Query { message: String },

    #[error("Record not found: {kind} with id {id}")]
    NotFound { kind: RecordKind, id: Uuid },

    #[error("Insert failed for {kind}: {reason}")]
    InsertFailed { kind: RecordKind, reason: String },

    #[error("Update failed for entity {id}: {reason}")]
    UpdateFailed { id: Uuid, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Knowledge provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No knowledge provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider} (429)")]
    RateLimited { provider: String },

    #[error("Transport error talking to {provider}: {message}")]
    Transport { provider: String, message: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Request and record validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {reason}")]
    Load { reason: String },
}

/// Master error type for all Atlas errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AtlasError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Atlas operations.
pub type AtlasResult<T> = Result<T, AtlasError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_remote() {
        let err = StorageError::Remote {
            status: 503,
            message: "upstream unavailable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("upstream unavailable"));
    }

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            kind: RecordKind::Entity,
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Record not found"));
        assert!(msg.contains("entity"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_llm_error_display_rate_limited() {
        let err = LlmError::RateLimited {
            provider: "perplexity".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Rate limited"));
        assert!(msg.contains("perplexity"));
        assert!(msg.contains("429"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "batch.insert_chunk_size".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("batch.insert_chunk_size"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_atlas_error_from_variants() {
        let storage = AtlasError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, AtlasError::Storage(_)));

        let llm = AtlasError::from(LlmError::ProviderNotConfigured);
        assert!(matches!(llm, AtlasError::Llm(_)));

        let validation = AtlasError::from(ValidationError::RequiredFieldMissing {
            field: "mode".to_string(),
        });
        assert!(matches!(validation, AtlasError::Validation(_)));

        let config = AtlasError::from(ConfigError::MissingRequired {
            field: "ATLAS_DB_HOST".to_string(),
        });
        assert!(matches!(config, AtlasError::Config(_)));
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let msg = StorageError::LockPoisoned.to_string();
        assert!(msg.contains("lock poisoned"));
    }
}
