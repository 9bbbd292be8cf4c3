//! Schema migrations keyed by `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Version the schema is at once every migration has run.
pub const SCHEMA_VERSION: u32 = 2;

const V001_GRAPH: &str = "
CREATE TABLE IF NOT EXISTS concept_nodes (
    id              TEXT PRIMARY KEY,
    student_id      INTEGER NOT NULL,
    name            TEXT NOT NULL,
    normalized_name TEXT NOT NULL,
    kind            TEXT NOT NULL,
    subject         TEXT NOT NULL,
    synthetic       INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

-- (student, normalized name, kind) names one node; one unsorted root per subject
CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_identity
    ON concept_nodes(student_id, normalized_name, kind) WHERE synthetic = 0;
CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_root
    ON concept_nodes(student_id, subject) WHERE synthetic = 1;

CREATE TABLE IF NOT EXISTS concept_edges (
    student_id  INTEGER NOT NULL,
    from_id     TEXT NOT NULL REFERENCES concept_nodes(id),
    to_id       TEXT NOT NULL REFERENCES concept_nodes(id),
    created_at  TEXT NOT NULL,
    PRIMARY KEY (from_id, to_id)
);

CREATE INDEX IF NOT EXISTS idx_edges_student ON concept_edges(student_id);

-- append-only; rows are never updated
CREATE TABLE IF NOT EXISTS diagnosis_records (
    id           TEXT PRIMARY KEY,
    student_id   INTEGER NOT NULL,
    source_type  TEXT NOT NULL,
    source_id    INTEGER NOT NULL,
    subject      TEXT NOT NULL,
    verdict      TEXT NOT NULL,
    confidence   REAL NOT NULL,
    items        TEXT NOT NULL,
    anchor_node  TEXT,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_student ON diagnosis_records(student_id);
CREATE INDEX IF NOT EXISTS idx_records_source
    ON diagnosis_records(student_id, source_type, source_id);

CREATE TABLE IF NOT EXISTS node_evidence (
    student_id  INTEGER NOT NULL,
    node_id     TEXT NOT NULL REFERENCES concept_nodes(id),
    record_id   TEXT NOT NULL REFERENCES diagnosis_records(id),
    item_index  INTEGER NOT NULL,
    linked_at   TEXT NOT NULL,
    PRIMARY KEY (node_id, record_id, item_index)
);

CREATE INDEX IF NOT EXISTS idx_evidence_student ON node_evidence(student_id);
";

const V002_SCORES: &str = "
CREATE TABLE IF NOT EXISTS weakness_scores (
    node_id       TEXT PRIMARY KEY REFERENCES concept_nodes(id),
    student_id    INTEGER NOT NULL,
    value         REAL NOT NULL CHECK (value >= 0),
    last_touched  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scores_student ON weakness_scores(student_id);

CREATE TABLE IF NOT EXISTS review_entries (
    student_id        INTEGER NOT NULL,
    target_kind       TEXT NOT NULL,
    target_id         TEXT NOT NULL,
    priority          TEXT NOT NULL,
    next_review_at    TEXT NOT NULL,
    review_streak     INTEGER NOT NULL DEFAULT 0,
    last_reviewed_at  TEXT,
    scheduled_at      TEXT NOT NULL,
    PRIMARY KEY (student_id, target_kind, target_id)
);
";

const MIGRATIONS: &[(u32, &str)] = &[(1, V001_GRAPH), (2, V002_SCORES)];

/// Run all pending migrations, each in its own transaction.
pub fn run_migrations(conn: &mut Connection) -> StoreResult<()> {
    let current = current_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if current >= *version {
            continue;
        }
        let failed = |e: rusqlite::Error| StoreError::MigrationFailed {
            version: *version,
            reason: e.to_string(),
        };

        let tx = conn.transaction().map_err(failed)?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", version).map_err(failed)?;
        tx.commit().map_err(failed)?;
        info!(version = version, "applied migration");
    }
    Ok(())
}

/// The schema version recorded in the database.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_reach_latest_and_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);

        run_migrations(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);

        run_migrations(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('concept_nodes', 'concept_edges', 'diagnosis_records',
                  'node_evidence', 'weakness_scores', 'review_entries')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }
}
