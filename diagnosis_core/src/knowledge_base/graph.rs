//! Student Graph - flat arena holding one student's concept graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use study_model::{ArtifactRef, NodeId, NodeKind, RecordId, StudentId, Subject};

use super::{ConceptEdge, ConceptNode, DiagnosisRecord, EvidenceLink, GraphChangeset};
use crate::scheduler::{ReviewEntry, ReviewTarget};
use crate::weakness::WeaknessScore;

/// Result of trying to add an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    Inserted,
    /// The same (parent, child) pair already exists.
    Duplicate,
    /// The child is already an ancestor of the parent (or they are equal).
    WouldCycle,
    /// One of the endpoints is not in the graph.
    MissingNode,
}

/// The concept graph of a single student.
///
/// Nodes and edges are addressed by stable IDs, so dedupe lookups and cycle
/// checks are map lookups and bounded walks over adjacency sets. Records are
/// shared behind `Arc` so cloning a graph for a pipeline run stays cheap.
#[derive(Debug, Clone)]
pub struct StudentGraph {
    student: StudentId,

    nodes: HashMap<NodeId, ConceptNode>,

    /// Index: (normalized name, kind) -> node. Synthetic roots are not indexed.
    name_index: HashMap<(String, NodeKind), NodeId>,

    /// Synthetic "unsorted" root per subject.
    unsorted_roots: HashMap<Subject, NodeId>,

    /// Edges in insertion order.
    edges: Vec<ConceptEdge>,
    edge_set: HashSet<(NodeId, NodeId)>,
    children: HashMap<NodeId, Vec<NodeId>>,
    parents: HashMap<NodeId, Vec<NodeId>>,

    /// Append-only, in creation order.
    records: Vec<Arc<DiagnosisRecord>>,
    record_index: HashMap<RecordId, usize>,

    /// Evidence trail per node, oldest first.
    evidence: HashMap<NodeId, Vec<EvidenceLink>>,

    scores: HashMap<NodeId, WeaknessScore>,
    reviews: HashMap<ReviewTarget, ReviewEntry>,

    journal: Option<GraphChangeset>,
}

impl StudentGraph {
    /// Create an empty graph for a student.
    pub fn new(student: StudentId) -> Self {
        Self {
            student,
            nodes: HashMap::new(),
            name_index: HashMap::new(),
            unsorted_roots: HashMap::new(),
            edges: Vec::new(),
            edge_set: HashSet::new(),
            children: HashMap::new(),
            parents: HashMap::new(),
            records: Vec::new(),
            record_index: HashMap::new(),
            evidence: HashMap::new(),
            scores: HashMap::new(),
            reviews: HashMap::new(),
            journal: None,
        }
    }

    pub fn student(&self) -> StudentId {
        self.student
    }

    // --- Journal -------------------------------------------------------

    /// Start capturing mutations into a fresh changeset.
    pub fn begin_journal(&mut self) {
        self.journal = Some(GraphChangeset::new(self.student));
    }

    /// Stop capturing and return everything captured since [`begin_journal`](Self::begin_journal).
    pub fn take_journal(&mut self) -> GraphChangeset {
        self.journal
            .take()
            .unwrap_or_else(|| GraphChangeset::new(self.student))
    }

    /// Replay a changeset produced for this student.
    pub fn apply(&mut self, changes: &GraphChangeset) {
        for node in &changes.nodes {
            self.insert_node(node.clone());
        }
        for edge in &changes.edges {
            self.insert_edge(edge.clone());
        }
        for record in &changes.records {
            self.push_record(record.clone());
        }
        for (node, link) in &changes.evidence {
            self.link_evidence(*node, link.clone());
        }
        for (node, score) in &changes.scores {
            self.set_score(*node, score.clone());
        }
        for entry in changes.reviews.values() {
            self.set_review(entry.clone());
        }
    }

    // --- Nodes ---------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&ConceptNode> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConceptNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find a node by normalized name whose kind is compatible with `kind`.
    ///
    /// An exact kind match wins over a merely compatible one.
    pub fn find_node(&self, normalized_name: &str, kind: NodeKind) -> Option<&ConceptNode> {
        let exact = self
            .name_index
            .get(&(normalized_name.to_string(), kind))
            .and_then(|id| self.nodes.get(id));
        if exact.is_some() {
            return exact;
        }

        NodeKind::ALL
            .iter()
            .filter(|other| **other != kind && kind.is_compatible_with(**other))
            .find_map(|other| {
                self.name_index
                    .get(&(normalized_name.to_string(), *other))
                    .and_then(|id| self.nodes.get(id))
            })
    }

    /// The synthetic root for a subject, if created.
    pub fn unsorted_root(&self, subject: &Subject) -> Option<NodeId> {
        self.unsorted_roots.get(subject).copied()
    }

    /// Add a node. Returns the ID of the node that now holds the key, which is
    /// the existing one if `(normalized_name, kind)` is already taken.
    pub fn insert_node(&mut self, node: ConceptNode) -> NodeId {
        if let Some(existing) = self.nodes.get(&node.id) {
            return existing.id;
        }

        if node.synthetic {
            if let Some(existing) = self.unsorted_roots.get(&node.subject) {
                return *existing;
            }
            self.unsorted_roots.insert(node.subject.clone(), node.id);
        } else {
            let key = (node.normalized_name.clone(), node.kind);
            if let Some(existing) = self.name_index.get(&key) {
                return *existing;
            }
            self.name_index.insert(key, node.id);
        }

        let id = node.id;
        if let Some(journal) = self.journal.as_mut() {
            journal.nodes.push(node.clone());
        }
        self.nodes.insert(id, node);
        id
    }

    // --- Edges ---------------------------------------------------------

    pub fn edges(&self) -> &[ConceptEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.edge_set.contains(&(from, to))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        self.parents.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Whether `ancestor` reaches `descendant` by following child edges.
    pub fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        let mut stack = vec![ancestor];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for child in self.children(current) {
                if *child == descendant {
                    return true;
                }
                stack.push(*child);
            }
        }
        false
    }

    /// Whether adding `parent -> child` would close a cycle.
    pub fn would_create_cycle(&self, parent: NodeId, child: NodeId) -> bool {
        parent == child || self.is_ancestor(child, parent)
    }

    /// Add a parent -> child edge unless it duplicates one or closes a cycle.
    pub fn insert_edge(&mut self, edge: ConceptEdge) -> EdgeInsert {
        if !self.contains_node(edge.from) || !self.contains_node(edge.to) {
            return EdgeInsert::MissingNode;
        }
        if self.has_edge(edge.from, edge.to) {
            return EdgeInsert::Duplicate;
        }
        if self.would_create_cycle(edge.from, edge.to) {
            return EdgeInsert::WouldCycle;
        }

        self.edge_set.insert((edge.from, edge.to));
        self.children.entry(edge.from).or_default().push(edge.to);
        self.parents.entry(edge.to).or_default().push(edge.from);
        if let Some(journal) = self.journal.as_mut() {
            journal.edges.push(edge.clone());
        }
        self.edges.push(edge);
        EdgeInsert::Inserted
    }

    /// Add an edge with no duplicate or cycle check, as corrupt stored data might.
    #[cfg(test)]
    pub(crate) fn insert_edge_unchecked(&mut self, edge: ConceptEdge) {
        self.edge_set.insert((edge.from, edge.to));
        self.children.entry(edge.from).or_default().push(edge.to);
        self.parents.entry(edge.to).or_default().push(edge.from);
        self.edges.push(edge);
    }

    /// Ancestors of `id` up to `max_depth` levels, each at its minimum depth.
    ///
    /// Ordered by depth, then discovery order.
    pub fn ancestors_within(&self, id: NodeId, max_depth: u32) -> Vec<(NodeId, u32)> {
        let mut result = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut queue = VecDeque::from([(id, 0u32)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for parent in self.parents(current) {
                if visited.insert(*parent) {
                    result.push((*parent, depth + 1));
                    queue.push_back((*parent, depth + 1));
                }
            }
        }
        result
    }

    // --- Records and evidence -------------------------------------------

    /// Append a record. Records are never edited once pushed.
    pub fn push_record(&mut self, record: DiagnosisRecord) -> RecordId {
        let id = record.id;
        if self.record_index.contains_key(&id) {
            return id;
        }
        if let Some(journal) = self.journal.as_mut() {
            journal.records.push(record.clone());
        }
        self.record_index.insert(id, self.records.len());
        self.records.push(Arc::new(record));
        id
    }

    pub fn record(&self, id: RecordId) -> Option<&DiagnosisRecord> {
        self.record_index
            .get(&id)
            .and_then(|idx| self.records.get(*idx))
            .map(|r| r.as_ref())
    }

    pub fn records(&self) -> impl DoubleEndedIterator<Item = &DiagnosisRecord> {
        self.records.iter().map(|r| r.as_ref())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Most recent record for a source artifact.
    pub fn latest_record_for(&self, source: ArtifactRef) -> Option<&DiagnosisRecord> {
        self.records().rev().find(|r| r.source == source)
    }

    /// All records for a source artifact, oldest first.
    pub fn records_for_source(&self, source: ArtifactRef) -> impl DoubleEndedIterator<Item = &DiagnosisRecord> {
        self.records().filter(move |r| r.source == source)
    }

    /// Link a node to the record item that implicated it.
    pub fn link_evidence(&mut self, node: NodeId, link: EvidenceLink) {
        let links = self.evidence.entry(node).or_default();
        if links
            .iter()
            .any(|l| l.record == link.record && l.item_index == link.item_index)
        {
            return;
        }
        if let Some(journal) = self.journal.as_mut() {
            journal.evidence.push((node, link.clone()));
        }
        links.push(link);
    }

    /// Evidence links of a node, oldest first.
    pub fn evidence_for(&self, node: NodeId) -> &[EvidenceLink] {
        self.evidence.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    // --- Scores and reviews --------------------------------------------

    pub fn score(&self, node: NodeId) -> Option<&WeaknessScore> {
        self.scores.get(&node)
    }

    pub fn scores(&self) -> impl Iterator<Item = (&NodeId, &WeaknessScore)> {
        self.scores.iter()
    }

    pub fn set_score(&mut self, node: NodeId, score: WeaknessScore) {
        if let Some(journal) = self.journal.as_mut() {
            journal.scores.insert(node, score.clone());
        }
        self.scores.insert(node, score);
    }

    pub fn review(&self, target: &ReviewTarget) -> Option<&ReviewEntry> {
        self.reviews.get(target)
    }

    pub fn reviews(&self) -> impl Iterator<Item = &ReviewEntry> {
        self.reviews.values()
    }

    pub fn set_review(&mut self, entry: ReviewEntry) {
        if let Some(journal) = self.journal.as_mut() {
            journal.reviews.insert(entry.target, entry.clone());
        }
        self.reviews.insert(entry.target, entry);
    }
}
