//! Dry-run wrapper that reads through to a real store and discards writes.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::error::StoreResult;
use crate::traits::store::{CheckpointStore, SeedReport};
use crate::types::config::RunMode;
use crate::types::task::{TaskRecord, TaskSeed};

/// Reads from `inner`; commits and seeds go to a throwaway sink.
///
/// Used by debug runs so the real task list is never mutated.
pub struct DryRunStore<S: CheckpointStore> {
    inner: S,
    discarded: RwLock<Vec<TaskRecord>>,
}

impl<S: CheckpointStore> DryRunStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            discarded: RwLock::new(Vec::new()),
        }
    }

    /// Records that would have been committed.
    pub fn discarded(&self) -> Vec<TaskRecord> {
        self.discarded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: CheckpointStore> CheckpointStore for DryRunStore<S> {
    async fn load(&self) -> StoreResult<Vec<TaskRecord>> {
        self.inner.load().await
    }

    async fn select_actionable(&self, mode: RunMode) -> StoreResult<Vec<TaskRecord>> {
        self.inner.select_actionable(mode).await
    }

    async fn commit(&self, record: &TaskRecord) -> StoreResult<()> {
        info!(
            task_id = %record.id,
            status = %record.status,
            error_detail = record.error_detail.as_deref().unwrap_or(""),
            "Dry run: commit discarded"
        );
        self.discarded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    async fn seed(&self, seeds: &[TaskSeed]) -> StoreResult<SeedReport> {
        let mut known: HashSet<String> = self.inner.load().await?.into_iter().map(|r| r.id).collect();
        let mut report = SeedReport::default();
        for seed in seeds {
            if known.insert(seed.id.clone()) {
                report.added += 1;
            } else {
                report.skipped += 1;
            }
        }
        info!(added = report.added, skipped = report.skipped, "Dry run: seed discarded");
        Ok(report)
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::task::TaskStatus;
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_commits_never_reach_inner() {
        let inner = Arc::new(MemoryStore::with_records([TaskRecord::new("1", "u")]));
        let store = DryRunStore::new(inner.clone());

        let mut record = store.load().await.unwrap().remove(0);
        record.mark_downloaded(Default::default(), Utc::now());
        store.commit(&record).await.unwrap();

        assert_eq!(inner.get("1").unwrap().status, TaskStatus::Pending);
        assert_eq!(inner.commit_count(), 0);
        assert_eq!(store.discarded().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_reports_without_writing() {
        let inner = Arc::new(MemoryStore::with_records([TaskRecord::new("1", "u")]));
        let store = DryRunStore::new(inner.clone());

        let report = store
            .seed(&[TaskSeed::new("1", "u"), TaskSeed::new("2", "v")])
            .await
            .unwrap();

        assert_eq!(report, SeedReport { added: 1, skipped: 1 });
        assert_eq!(inner.len(), 1);
    }
}
