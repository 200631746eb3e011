//! Checkpoint store trait: the durable task list.
//!
//! The store is the sole source of truth for task status. Every operation
//! either fully applies or leaves prior state untouched.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::types::config::RunMode;
use crate::types::task::{TaskRecord, TaskSeed};

/// Outcome of merging discovery seeds into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// New ids inserted as `pending`
    pub added: usize,
    /// Ids already present, left untouched
    pub skipped: usize,
}

/// Durable, crash-safe task list.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read every task record, in store order.
    ///
    /// Fails with `StoreError::CorruptState` when the backing store is
    /// unreadable or malformed.
    async fn load(&self) -> StoreResult<Vec<TaskRecord>>;

    /// Records a run in `mode` should attempt, in store order.
    async fn select_actionable(&self, mode: RunMode) -> StoreResult<Vec<TaskRecord>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|record| record.status.is_actionable(mode))
            .collect())
    }

    /// Durably replace the record with the same id.
    ///
    /// After this returns `Ok`, a crash loses nothing about `record`.
    async fn commit(&self, record: &TaskRecord) -> StoreResult<()>;

    /// Insert a `pending` record for every seed whose id is not yet present.
    /// Existing records, whatever their status, are never touched.
    async fn seed(&self, seeds: &[TaskSeed]) -> StoreResult<SeedReport>;

    /// Get the store name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<S: CheckpointStore + ?Sized> CheckpointStore for &S {
    async fn load(&self) -> StoreResult<Vec<TaskRecord>> {
        (**self).load().await
    }

    async fn select_actionable(&self, mode: RunMode) -> StoreResult<Vec<TaskRecord>> {
        (**self).select_actionable(mode).await
    }

    async fn commit(&self, record: &TaskRecord) -> StoreResult<()> {
        (**self).commit(record).await
    }

    async fn seed(&self, seeds: &[TaskSeed]) -> StoreResult<SeedReport> {
        (**self).seed(seeds).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<S: CheckpointStore + ?Sized> CheckpointStore for Arc<S> {
    async fn load(&self) -> StoreResult<Vec<TaskRecord>> {
        (**self).load().await
    }

    async fn select_actionable(&self, mode: RunMode) -> StoreResult<Vec<TaskRecord>> {
        (**self).select_actionable(mode).await
    }

    async fn commit(&self, record: &TaskRecord) -> StoreResult<()> {
        (**self).commit(record).await
    }

    async fn seed(&self, seeds: &[TaskSeed]) -> StoreResult<SeedReport> {
        (**self).seed(seeds).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
