use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use study_model::{ArtifactRef, NodeId, Priority};

/// What a review entry schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReviewTarget {
    Node(NodeId),
    Artifact(ArtifactRef),
}

impl fmt::Display for ReviewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewTarget::Node(id) => write!(f, "node:{}", id),
            ReviewTarget::Artifact(artifact) => write!(f, "{}", artifact),
        }
    }
}

/// Derived schedule for one target. Only the scheduler writes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub target: ReviewTarget,
    pub priority: Priority,
    pub next_review_at: DateTime<Utc>,

    /// Reviews completed since the last diagnosis touched the target.
    pub review_streak: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,

    pub scheduled_at: DateTime<Utc>,
}

impl ReviewEntry {
    /// Streak that may be trusted at `now`.
    ///
    /// A missing or future `last_reviewed_at` means "never reviewed".
    pub fn effective_streak(&self, now: DateTime<Utc>) -> u32 {
        match self.last_reviewed_at {
            Some(at) if at <= now => self.review_streak,
            _ => 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }
}

/// One line of a student's review queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedReview {
    pub target: ReviewTarget,
    /// Node name or artifact reference, for display and tie-breaking.
    pub label: String,
    pub priority: Priority,
    pub next_review_at: DateTime<Utc>,
    pub review_streak: u32,
}
