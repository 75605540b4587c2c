//! Batch persistence layer.
//!
//! Inserts are split into fixed-size chunks; a failed chunk is logged and
//! the rest still run. Updates are split into smaller chunks, applied one
//! row at a time with a pacing sleep between chunks. Every store call goes
//! through the retry utility.

use crate::EvolutionStore;
use async_trait::async_trait;
use atlas_core::{
    with_retry, AtlasResult, BatchConfig, EntityId, EntityUpdate, LearningEvent, MemoryRecord,
    RecordKind, Relationship, RetryPolicy, TaskQueueItem,
};
use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// INSERTABLE RECORDS
// ============================================================================

/// Record type the batch layer knows how to insert.
#[async_trait]
pub trait Insertable: Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    /// Insert one chunk through the matching store call.
    async fn insert_chunk(store: &dyn EvolutionStore, chunk: &[Self]) -> AtlasResult<usize>;
}

#[async_trait]
impl Insertable for MemoryRecord {
    const KIND: RecordKind = RecordKind::Memory;

    async fn insert_chunk(store: &dyn EvolutionStore, chunk: &[Self]) -> AtlasResult<usize> {
        store.insert_memories(chunk).await
    }
}

#[async_trait]
impl Insertable for LearningEvent {
    const KIND: RecordKind = RecordKind::LearningEvent;

    async fn insert_chunk(store: &dyn EvolutionStore, chunk: &[Self]) -> AtlasResult<usize> {
        store.insert_learning_events(chunk).await
    }
}

#[async_trait]
impl Insertable for TaskQueueItem {
    const KIND: RecordKind = RecordKind::Task;

    async fn insert_chunk(store: &dyn EvolutionStore, chunk: &[Self]) -> AtlasResult<usize> {
        store.insert_tasks(chunk).await
    }
}

// ============================================================================
// REPORTS
// ============================================================================

/// A chunk that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub records: usize,
    pub reason: String,
}

/// Outcome of a batch insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub chunks_attempted: usize,
    pub chunks_failed: usize,
    pub records_written: usize,
    pub failures: Vec<ChunkFailure>,
}

impl InsertReport {
    pub fn merge(&mut self, other: InsertReport) {
        self.chunks_attempted += other.chunks_attempted;
        self.chunks_failed += other.chunks_failed;
        self.records_written += other.records_written;
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.chunks_failed == 0
    }
}

/// Whether a single row update took effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    Applied,
    Skipped { reason: String },
}

/// Per-row result of a batch update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    pub entity_id: EntityId,
    #[serde(flatten)]
    pub status: RowStatus,
}

impl RowOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, RowStatus::Applied)
    }
}

/// Outcome of a batch update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub outcomes: Vec<RowOutcome>,
}

impl UpdateReport {
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.applied()
    }

    pub fn merge(&mut self, other: UpdateReport) {
        self.outcomes.extend(other.outcomes);
    }
}

// ============================================================================
// BATCH WRITER
// ============================================================================

/// Chunked, retried, paced writes against an [`EvolutionStore`].
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn EvolutionStore>,
    config: BatchConfig,
    retry: RetryPolicy,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn EvolutionStore>, config: BatchConfig, retry: RetryPolicy) -> Self {
        Self {
            store,
            config,
            retry,
        }
    }

    pub fn store(&self) -> &dyn EvolutionStore {
        self.store.as_ref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Insert `records` in chunks of `insert_chunk_size`. Never fails as a
    /// whole; failed chunks are reported.
    pub async fn insert<T: Insertable>(&self, records: &[T]) -> InsertReport {
        let mut report = InsertReport::default();
        if records.is_empty() {
            return report;
        }

        let store = self.store.as_ref();
        let label = format!("insert_{}", T::KIND);
        for (chunk_index, chunk) in records.chunks(self.config.insert_chunk_size).enumerate() {
            report.chunks_attempted += 1;
            match with_retry(&self.retry, &label, || T::insert_chunk(store, chunk)).await {
                Ok(written) => report.records_written += written,
                Err(err) => {
                    tracing::error!(
                        kind = %T::KIND,
                        chunk = chunk_index,
                        records = chunk.len(),
                        error = %err,
                        "Batch insert chunk failed, continuing"
                    );
                    report.chunks_failed += 1;
                    report.failures.push(ChunkFailure {
                        chunk_index,
                        records: chunk.len(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            kind = %T::KIND,
            chunks = report.chunks_attempted,
            written = report.records_written,
            failed_chunks = report.chunks_failed,
            "Batch insert complete"
        );
        report
    }

    /// Apply `updates` row by row in chunks of `update_chunk_size`, sleeping
    /// `pacing` between chunks. A row that still fails after retries is
    /// skipped with its reason.
    pub async fn update(&self, updates: &[EntityUpdate]) -> UpdateReport {
        let mut report = UpdateReport::default();
        let store = self.store.as_ref();
        let pacing = self.config.pacing();
        let chunk_count = updates.len().div_ceil(self.config.update_chunk_size);

        for (chunk_index, chunk) in updates.chunks(self.config.update_chunk_size).enumerate() {
            for update in chunk {
                let status = match with_retry(&self.retry, "update_entity", || {
                    store.update_entity(update)
                })
                .await
                {
                    Ok(()) => RowStatus::Applied,
                    Err(err) => {
                        tracing::warn!(
                            entity_id = %update.entity_id,
                            error = %err,
                            "Entity update skipped"
                        );
                        RowStatus::Skipped {
                            reason: err.to_string(),
                        }
                    }
                };
                report.outcomes.push(RowOutcome {
                    entity_id: update.entity_id,
                    status,
                });
            }

            if chunk_index + 1 < chunk_count && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }

        if report.skipped() > 0 {
            tracing::warn!(
                applied = report.applied(),
                skipped = report.skipped(),
                "Batch update finished with skipped rows"
            );
        }
        report
    }

    /// Upsert one relationship through the retry utility.
    pub async fn upsert_relationship(&self, relationship: &Relationship) -> AtlasResult<()> {
        let store = self.store.as_ref();
        with_retry(&self.retry, "upsert_relationship", || {
            store.upsert_relationship(relationship)
        })
        .await
    }
}
