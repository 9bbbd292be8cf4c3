//! Persistence of student graphs.
//!
//! A pipeline run mutates a private copy of the graph and hands the captured
//! [`GraphChangeset`] to [`GraphStore::commit`], which applies all of it or
//! none of it.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use schema::{current_version, run_migrations, SCHEMA_VERSION};
pub use sqlite::SqliteStore;

use study_model::StudentId;

use crate::error::StoreResult;
use crate::knowledge_base::{GraphChangeset, StudentGraph};

/// Durable storage for per-student graphs.
pub trait GraphStore: Send + Sync {
    /// Load everything stored for a student. Unknown students get an empty graph.
    fn load_student(&self, student: StudentId) -> StoreResult<StudentGraph>;

    /// Persist a changeset atomically.
    fn commit(&self, changes: &GraphChangeset) -> StoreResult<()>;
}
