//! Serializable graph views handed to the visualization layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use study_model::{ArtifactRef, NodeId, NodeKind, RecordId, Subject};

use crate::knowledge_base::Verdict;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub subject: Subject,
    /// Edges followed from the root to first reach this node.
    pub depth: u32,
    pub synthetic: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeView {
    pub from: NodeId,
    pub to: NodeId,
}

/// One record that implicated a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub record_id: RecordId,
    pub artifact: ArtifactRef,
    pub snippet: String,
    pub verdict: Verdict,
    pub recorded_at: DateTime<Utc>,
}

/// A node that was resolved from the same records as another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedNode {
    pub id: NodeId,
    pub name: String,
    /// Number of records naming both nodes.
    pub count: usize,
}

/// Subgraph reachable from a root, annotated for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    pub root_id: NodeId,
    /// Breadth-first order from the root.
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub weakness_by_node: BTreeMap<NodeId, f64>,
    pub evidence_by_node: BTreeMap<NodeId, Vec<EvidenceRef>>,
    pub mistake_counts: BTreeMap<NodeId, usize>,
    pub related: BTreeMap<NodeId, Vec<RelatedNode>>,
}

impl GraphView {
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeView> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
