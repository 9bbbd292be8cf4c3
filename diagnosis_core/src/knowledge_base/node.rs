//! Concept nodes and parent -> child edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use study_model::{NodeId, NodeKind, StudentId, Subject};

/// A unit of knowledge structure in a student's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: NodeId,
    pub student: StudentId,

    /// Human-readable name as first seen.
    pub name: String,

    /// Dedupe key; see [`crate::knowledge_base::label::normalize`].
    pub normalized_name: String,

    pub kind: NodeKind,
    pub subject: Subject,

    /// Per-subject "unsorted" root created by the resolver rather than named by a model.
    pub synthetic: bool,

    pub created_at: DateTime<Utc>,
}

impl ConceptNode {
    /// Create a new node with a fresh ID.
    pub fn new(
        student: StudentId,
        name: impl Into<String>,
        normalized_name: impl Into<String>,
        kind: NodeKind,
        subject: Subject,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NodeId::new(),
            student,
            name: name.into(),
            normalized_name: normalized_name.into(),
            kind,
            subject,
            synthetic: false,
            created_at,
        }
    }

    /// Create the synthetic "unsorted" root for a subject.
    pub fn unsorted_root(
        student: StudentId,
        root_name: &str,
        subject: Subject,
        created_at: DateTime<Utc>,
    ) -> Self {
        let name = format!("{} · {}", subject, root_name);
        Self {
            id: NodeId::new(),
            student,
            normalized_name: String::new(),
            name,
            kind: NodeKind::Chapter,
            subject,
            synthetic: true,
            created_at,
        }
    }
}

/// Directed parent -> child edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub created_at: DateTime<Utc>,
}

impl ConceptEdge {
    pub fn new(from: NodeId, to: NodeId, created_at: DateTime<Utc>) -> Self {
        Self {
            from,
            to,
            created_at,
        }
    }
}
