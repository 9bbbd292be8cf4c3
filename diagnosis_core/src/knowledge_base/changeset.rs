//! Changesets: every mutation of a [`StudentGraph`](super::StudentGraph) made
//! during one pipeline run, in an order that can be replayed or persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use study_model::{NodeId, StudentId};

use super::{ConceptEdge, ConceptNode, DiagnosisRecord, EvidenceLink};
use crate::scheduler::{ReviewEntry, ReviewTarget};
use crate::weakness::WeaknessScore;

/// Mutations to persist atomically for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphChangeset {
    pub student: StudentId,
    pub nodes: Vec<ConceptNode>,
    pub edges: Vec<ConceptEdge>,
    pub records: Vec<DiagnosisRecord>,
    pub evidence: Vec<(NodeId, EvidenceLink)>,

    /// Latest value per node; earlier writes in the same run are superseded.
    pub scores: BTreeMap<NodeId, WeaknessScore>,

    /// Latest entry per target.
    pub reviews: BTreeMap<ReviewTarget, ReviewEntry>,
}

impl GraphChangeset {
    pub fn new(student: StudentId) -> Self {
        Self {
            student,
            nodes: Vec::new(),
            edges: Vec::new(),
            records: Vec::new(),
            evidence: Vec::new(),
            scores: BTreeMap::new(),
            reviews: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.records.is_empty()
            && self.evidence.is_empty()
            && self.scores.is_empty()
            && self.reviews.is_empty()
    }

    /// Total number of row-level changes.
    pub fn len(&self) -> usize {
        self.nodes.len()
            + self.edges.len()
            + self.records.len()
            + self.evidence.len()
            + self.scores.len()
            + self.reviews.len()
    }
}
