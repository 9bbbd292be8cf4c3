//! SQLite-backed [`GraphStore`].

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use study_model::{
    ArtifactRef, NodeId, NodeKind, Priority, RecordId, SourceType, StudentId, Subject,
};
use tracing::debug;
use uuid::Uuid;

use super::schema::run_migrations;
use super::GraphStore;
use crate::error::{StoreError, StoreResult};
use crate::knowledge_base::{
    ConceptEdge, ConceptNode, DiagnosisRecord, EvidenceLink, GraphChangeset, MistakeItem,
    StudentGraph, Verdict,
};
use crate::scheduler::{ReviewEntry, ReviewTarget};
use crate::weakness::WeaknessScore;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Single-connection SQLite store. Writes are serialized by the connection mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::initialize(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(mut conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GraphStore for SqliteStore {
    fn load_student(&self, student: StudentId) -> StoreResult<StudentGraph> {
        let conn = self.conn();
        let mut graph = StudentGraph::new(student);

        let mut stmt = conn.prepare(
            "SELECT id, name, normalized_name, kind, subject, synthetic, created_at
             FROM concept_nodes WHERE student_id = ?1 ORDER BY rowid",
        )?;
        let nodes = stmt
            .query_map(params![student.0], |row| node_row(student, row))?
            .collect::<Result<Vec<_>, _>>()?;
        for node in nodes {
            graph.insert_node(node?);
        }

        let mut stmt = conn.prepare(
            "SELECT from_id, to_id, created_at FROM concept_edges
             WHERE student_id = ?1 ORDER BY rowid",
        )?;
        let edges = stmt
            .query_map(params![student.0], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (from, to, created_at) in edges {
            let edge = ConceptEdge::new(
                node_id(&from, "concept_edges")?,
                node_id(&to, "concept_edges")?,
                timestamp(&created_at, "concept_edges")?,
            );
            graph.insert_edge(edge);
        }

        let mut stmt = conn.prepare(
            "SELECT id, source_type, source_id, subject, verdict, confidence, items,
                    anchor_node, created_at
             FROM diagnosis_records WHERE student_id = ?1 ORDER BY rowid",
        )?;
        let records = stmt
            .query_map(params![student.0], |row| record_row(student, row))?
            .collect::<Result<Vec<_>, _>>()?;
        for record in records {
            graph.push_record(record?);
        }

        let mut stmt = conn.prepare(
            "SELECT node_id, record_id, item_index, linked_at FROM node_evidence
             WHERE student_id = ?1 ORDER BY rowid",
        )?;
        let links = stmt
            .query_map(params![student.0], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (node, record, item_index, linked_at) in links {
            let link = EvidenceLink {
                record: RecordId::from_uuid(uuid(&record, "node_evidence")?),
                item_index: usize::try_from(item_index).map_err(|_| corrupt("node_evidence", "negative item index"))?,
                linked_at: timestamp(&linked_at, "node_evidence")?,
            };
            graph.link_evidence(node_id(&node, "node_evidence")?, link);
        }

        let mut stmt = conn.prepare(
            "SELECT node_id, value, last_touched FROM weakness_scores WHERE student_id = ?1",
        )?;
        let scores = stmt
            .query_map(params![student.0], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (node, value, last_touched) in scores {
            graph.set_score(
                node_id(&node, "weakness_scores")?,
                WeaknessScore::new(value, timestamp(&last_touched, "weakness_scores")?),
            );
        }

        let mut stmt = conn.prepare(
            "SELECT target_kind, target_id, priority, next_review_at, review_streak,
                    last_reviewed_at, scheduled_at
             FROM review_entries WHERE student_id = ?1",
        )?;
        let reviews = stmt
            .query_map(params![student.0], review_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for review in reviews {
            graph.set_review(review?);
        }

        debug!(
            student = %student,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            records = graph.record_count(),
            "student graph loaded"
        );
        Ok(graph)
    }

    fn commit(&self, changes: &GraphChangeset) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        write_changes(&tx, changes)?;
        tx.commit()?;

        debug!(student = %changes.student, changes = changes.len(), "changeset committed");
        Ok(())
    }
}

fn write_changes(tx: &Transaction<'_>, changes: &GraphChangeset) -> StoreResult<()> {
    let student = changes.student.0;

    for node in &changes.nodes {
        tx.execute(
            "INSERT INTO concept_nodes
                 (id, student_id, name, normalized_name, kind, subject, synthetic, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                node.id.to_string(),
                student,
                node.name,
                node.normalized_name,
                node.kind.as_str(),
                node.subject.as_str(),
                node.synthetic,
                rfc3339(node.created_at),
            ],
        )?;
    }

    for edge in &changes.edges {
        tx.execute(
            "INSERT INTO concept_edges (student_id, from_id, to_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![student, edge.from.to_string(), edge.to.to_string(), rfc3339(edge.created_at)],
        )?;
    }

    for record in &changes.records {
        tx.execute(
            "INSERT INTO diagnosis_records
                 (id, student_id, source_type, source_id, subject, verdict, confidence,
                  items, anchor_node, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.to_string(),
                student,
                record.source.source_type.as_str(),
                record.source.source_id.0,
                record.subject.as_str(),
                record.verdict.as_str(),
                record.confidence,
                serde_json::to_string(&record.items)?,
                record.anchor_node.map(|n| n.to_string()),
                rfc3339(record.created_at),
            ],
        )?;
    }

    for (node, link) in &changes.evidence {
        tx.execute(
            "INSERT OR IGNORE INTO node_evidence
                 (student_id, node_id, record_id, item_index, linked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                student,
                node.to_string(),
                link.record.to_string(),
                link.item_index as i64,
                rfc3339(link.linked_at),
            ],
        )?;
    }

    for (node, score) in &changes.scores {
        tx.execute(
            "INSERT INTO weakness_scores (node_id, student_id, value, last_touched)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(node_id) DO UPDATE SET
                 value = excluded.value, last_touched = excluded.last_touched",
            params![node.to_string(), student, score.value, rfc3339(score.last_touched)],
        )?;
    }

    for entry in changes.reviews.values() {
        let (kind, id) = encode_target(&entry.target);
        tx.execute(
            "INSERT INTO review_entries
                 (student_id, target_kind, target_id, priority, next_review_at,
                  review_streak, last_reviewed_at, scheduled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(student_id, target_kind, target_id) DO UPDATE SET
                 priority = excluded.priority,
                 next_review_at = excluded.next_review_at,
                 review_streak = excluded.review_streak,
                 last_reviewed_at = excluded.last_reviewed_at,
                 scheduled_at = excluded.scheduled_at",
            params![
                student,
                kind,
                id,
                entry.priority.as_str(),
                rfc3339(entry.next_review_at),
                entry.review_streak,
                entry.last_reviewed_at.map(rfc3339),
                rfc3339(entry.scheduled_at),
            ],
        )?;
    }

    Ok(())
}

// --- Row decoding ------------------------------------------------------
//
// Row closures return `rusqlite::Result<StoreResult<T>>` so that SQL errors
// and corrupt values stay distinguishable.

fn node_row(student: StudentId, row: &Row<'_>) -> rusqlite::Result<StoreResult<ConceptNode>> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let normalized_name: String = row.get(2)?;
    let kind: String = row.get(3)?;
    let subject: String = row.get(4)?;
    let synthetic: bool = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok((|| -> StoreResult<ConceptNode> {
        Ok(ConceptNode {
            id: node_id(&id, "concept_nodes")?,
            student,
            name,
            normalized_name,
            kind: NodeKind::from_str(&kind).map_err(|e| corrupt("concept_nodes", e))?,
            subject: Subject::from_stored(subject),
            synthetic,
            created_at: timestamp(&created_at, "concept_nodes")?,
        })
    })())
}

fn record_row(student: StudentId, row: &Row<'_>) -> rusqlite::Result<StoreResult<DiagnosisRecord>> {
    let id: String = row.get(0)?;
    let source_type: String = row.get(1)?;
    let source_id: i64 = row.get(2)?;
    let subject: String = row.get(3)?;
    let verdict: String = row.get(4)?;
    let confidence: f64 = row.get(5)?;
    let items: String = row.get(6)?;
    let anchor: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;

    Ok((|| -> StoreResult<DiagnosisRecord> {
        let source_type =
            SourceType::from_str(&source_type).map_err(|e| corrupt("diagnosis_records", e))?;
        let items: Vec<MistakeItem> = serde_json::from_str(&items)?;
        let anchor_node = anchor
            .map(|a| node_id(&a, "diagnosis_records"))
            .transpose()?;

        Ok(DiagnosisRecord {
            id: RecordId::from_uuid(uuid(&id, "diagnosis_records")?),
            student,
            source: ArtifactRef::new(source_type, source_id),
            subject: Subject::from_stored(subject),
            verdict: Verdict::from(verdict),
            confidence,
            items,
            anchor_node,
            created_at: timestamp(&created_at, "diagnosis_records")?,
        })
    })())
}

fn review_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<ReviewEntry>> {
    let kind: String = row.get(0)?;
    let id: String = row.get(1)?;
    let priority: String = row.get(2)?;
    let next_review_at: String = row.get(3)?;
    let review_streak: u32 = row.get(4)?;
    let last_reviewed_at: Option<String> = row.get(5)?;
    let scheduled_at: String = row.get(6)?;

    Ok((|| -> StoreResult<ReviewEntry> {
        Ok(ReviewEntry {
            target: decode_target(&kind, &id)?,
            priority: Priority::from_str(&priority).map_err(|e| corrupt("review_entries", e))?,
            next_review_at: timestamp(&next_review_at, "review_entries")?,
            review_streak,
            last_reviewed_at: last_reviewed_at
                .map(|at| timestamp(&at, "review_entries"))
                .transpose()?,
            scheduled_at: timestamp(&scheduled_at, "review_entries")?,
        })
    })())
}

fn encode_target(target: &ReviewTarget) -> (&'static str, String) {
    match target {
        ReviewTarget::Node(id) => ("node", id.to_string()),
        ReviewTarget::Artifact(artifact) => ("artifact", artifact.to_string()),
    }
}

fn decode_target(kind: &str, id: &str) -> StoreResult<ReviewTarget> {
    match kind {
        "node" => Ok(ReviewTarget::Node(node_id(id, "review_entries")?)),
        "artifact" => {
            let (source_type, source_id) = id
                .split_once(':')
                .ok_or_else(|| corrupt("review_entries", format!("bad artifact target {:?}", id)))?;
            let source_type =
                SourceType::from_str(source_type).map_err(|e| corrupt("review_entries", e))?;
            let source_id = source_id
                .parse::<i64>()
                .map_err(|e| corrupt("review_entries", e))?;
            Ok(ReviewTarget::Artifact(ArtifactRef::new(source_type, source_id)))
        }
        other => Err(corrupt("review_entries", format!("unknown target kind {:?}", other))),
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn timestamp(raw: &str, table: &'static str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| corrupt(table, e))
}

fn uuid(raw: &str, table: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| corrupt(table, e))
}

fn node_id(raw: &str, table: &'static str) -> StoreResult<NodeId> {
    uuid(raw, table).map(NodeId::from_uuid)
}

fn corrupt(table: &'static str, details: impl ToString) -> StoreError {
    StoreError::Corrupt {
        table,
        details: details.to_string(),
    }
}
