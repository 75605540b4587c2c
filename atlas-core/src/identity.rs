//! Identity types for Atlas records

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Entity identifier. New records use UUIDv7 so ids sort by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash used for deduplication.
pub type ContentHash = [u8; 32];

/// Id attached to population-level learning events that do not belong to a
/// single entity.
pub const POPULATION_SENTINEL_ID: EntityId = Uuid::nil();

/// Generate a new UUIDv7 id (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Hash of the first `prefix_chars` characters of `content`.
///
/// Counts characters, not bytes, so multi-byte text is never split.
pub fn content_prefix_hash(content: &str, prefix_chars: usize) -> ContentHash {
    let prefix: String = content.chars().take(prefix_chars).collect();
    compute_content_hash(prefix.as_bytes())
}
