//! Diagnosis records - the normalized output of analyzing one artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use study_model::{ArtifactRef, NodeId, NodeKind, RecordId, StudentId, Subject};

/// Overall verdict of a diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Verdict {
    /// One-sentence verdict stated by the model.
    Stated(String),
    /// The model output had no recoverable structure.
    Unparsed,
    /// The analysis could not be obtained at all.
    Error,
}

impl Verdict {
    pub const UNPARSED: &'static str = "unparsed";
    pub const ERROR: &'static str = "error";

    pub fn as_str(&self) -> &str {
        match self {
            Verdict::Stated(text) => text,
            Verdict::Unparsed => Self::UNPARSED,
            Verdict::Error => Self::ERROR,
        }
    }

    /// Whether the record carries a usable diagnosis.
    pub fn is_diagnosed(&self) -> bool {
        matches!(self, Verdict::Stated(_))
    }
}

impl From<String> for Verdict {
    fn from(s: String) -> Self {
        match s.as_str() {
            Self::UNPARSED => Verdict::Unparsed,
            Self::ERROR => Verdict::Error,
            _ => Verdict::Stated(s),
        }
    }
}

impl From<Verdict> for String {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Stated(text) => text,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item came from in the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrigin {
    /// A diagnosed mistake; contributes weakness.
    Mistake,
    /// A key term or key point; adds structure and evidence only.
    KeyTerm,
}

/// Character range into the source artifact text substantiating an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    /// Inclusive start, in chars.
    pub start: usize,
    /// Exclusive end, in chars.
    pub end: usize,
    /// The covered text.
    pub text: String,
}

/// One diagnosed cause within a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistakeItem {
    /// Free-text concept label from the model, before resolution.
    pub concept_label: String,
    pub reason: String,
    pub correct_approach: String,
    pub evidence: Option<EvidenceSpan>,

    /// Node kind named by the model, if any.
    pub kind_hint: Option<NodeKind>,

    pub origin: ItemOrigin,

    /// Set once the resolver maps the label onto a node.
    pub resolved_node: Option<NodeId>,
}

impl MistakeItem {
    /// Create an unresolved mistake item for a label.
    pub fn new(concept_label: impl Into<String>) -> Self {
        Self {
            concept_label: concept_label.into(),
            reason: String::new(),
            correct_approach: String::new(),
            evidence: None,
            kind_hint: None,
            origin: ItemOrigin::Mistake,
            resolved_node: None,
        }
    }

    /// Create a key-term item.
    pub fn key_term(label: impl Into<String>) -> Self {
        Self {
            origin: ItemOrigin::KeyTerm,
            ..Self::new(label)
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_correct_approach(mut self, approach: impl Into<String>) -> Self {
        self.correct_approach = approach.into();
        self
    }

    pub fn with_evidence(mut self, evidence: EvidenceSpan) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_kind_hint(mut self, kind: NodeKind) -> Self {
        self.kind_hint = Some(kind);
        self
    }

    /// Whether this item counts towards weakness once resolved.
    pub fn is_weakness_signal(&self) -> bool {
        self.origin == ItemOrigin::Mistake && self.resolved_node.is_some()
    }

    /// Short text quoted when this item is shown as evidence.
    pub fn snippet(&self) -> &str {
        if let Some(span) = &self.evidence {
            if !span.text.is_empty() {
                return &span.text;
            }
        }
        if !self.reason.is_empty() {
            return &self.reason;
        }
        &self.concept_label
    }
}

/// Normalized output of analyzing one artifact. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: RecordId,
    pub student: StudentId,
    pub source: ArtifactRef,
    pub subject: Subject,
    pub verdict: Verdict,

    /// Always within [0, 1].
    pub confidence: f64,

    pub items: Vec<MistakeItem>,

    /// Node the artifact's items were attached under (chapter or unsorted root).
    pub anchor_node: Option<NodeId>,

    pub created_at: DateTime<Utc>,
}

impl DiagnosisRecord {
    /// Create an empty record for an artifact.
    pub fn new(
        student: StudentId,
        source: ArtifactRef,
        subject: Subject,
        verdict: Verdict,
        confidence: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            student,
            source,
            subject,
            verdict,
            confidence: confidence.clamp(0.0, 1.0),
            items: Vec::new(),
            anchor_node: None,
            created_at,
        }
    }

    pub fn with_items(mut self, items: Vec<MistakeItem>) -> Self {
        self.items = items;
        self
    }

    /// Distinct nodes named by resolved mistake items, in first-seen order.
    pub fn weakness_targets(&self) -> Vec<NodeId> {
        let mut seen = Vec::new();
        for item in self.items.iter().filter(|i| i.is_weakness_signal()) {
            if let Some(node) = item.resolved_node {
                if !seen.contains(&node) {
                    seen.push(node);
                }
            }
        }
        seen
    }

    /// Distinct nodes named by any resolved item, in first-seen order.
    pub fn resolved_nodes(&self) -> Vec<NodeId> {
        let mut seen = Vec::new();
        for node in self.items.iter().filter_map(|i| i.resolved_node) {
            if !seen.contains(&node) {
                seen.push(node);
            }
        }
        seen
    }
}

/// Link from a node to the record item that implicated it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLink {
    pub record: RecordId,
    pub item_index: usize,
    pub linked_at: DateTime<Utc>,
}
