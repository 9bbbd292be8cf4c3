use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use study_model::StudentId;

use super::GraphStore;
use crate::error::{StoreError, StoreResult};
use crate::knowledge_base::{GraphChangeset, StudentGraph};

/// In-process store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    graphs: Mutex<HashMap<StudentId, StudentGraph>>,
    fail_next_commit: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with a retryable error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn graphs(&self) -> MutexGuard<'_, HashMap<StudentId, StudentGraph>> {
        self.graphs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GraphStore for MemoryStore {
    fn load_student(&self, student: StudentId) -> StoreResult<StudentGraph> {
        Ok(self
            .graphs()
            .get(&student)
            .cloned()
            .unwrap_or_else(|| StudentGraph::new(student)))
    }

    fn commit(&self, changes: &GraphChangeset) -> StoreResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::CommitRejected("injected failure".to_string()));
        }
        self.graphs()
            .entry(changes.student)
            .or_insert_with(|| StudentGraph::new(changes.student))
            .apply(changes);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
