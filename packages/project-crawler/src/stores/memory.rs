//! In-memory checkpoint store for testing and embedding.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::error::StoreResult;
use crate::traits::store::{CheckpointStore, SeedReport};
use crate::types::task::{TaskRecord, TaskSeed};

/// In-memory task list.
///
/// Not durable: state is lost when the process exits. Keeps insertion order
/// and a log of every committed record.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<TaskRecord>>,
    commits: RwLock<Vec<TaskRecord>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `records`, in order.
    pub fn with_records(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
            commits: RwLock::new(Vec::new()),
        }
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Snapshot of every record.
    pub fn records(&self) -> Vec<TaskRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every committed record, in commit order.
    pub fn commits(&self) -> Vec<TaskRecord> {
        self.commits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self) -> StoreResult<Vec<TaskRecord>> {
        Ok(self.records())
    }

    async fn commit(&self, record: &TaskRecord) -> StoreResult<()> {
        {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
        }
        self.commits
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    async fn seed(&self, seeds: &[TaskSeed]) -> StoreResult<SeedReport> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let mut known: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();

        let mut report = SeedReport::default();
        for seed in seeds {
            if known.insert(seed.id.clone()) {
                records.push(TaskRecord::from_seed(seed));
                report.added += 1;
            } else {
                report.skipped += 1;
            }
        }
        Ok(report)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
