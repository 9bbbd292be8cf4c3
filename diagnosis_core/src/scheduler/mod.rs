//! Review Scheduler - turns weakness scores into review priorities and dates.
//!
//! `next_review_at = now + interval(priority) * backoff^streak`, capped at
//! `max_interval_days`. A diagnosis resets the streak; each completed review
//! extends it.

mod entry;

pub use entry::*;

use chrono::{DateTime, Duration, Utc};
use study_model::{NodeId, Priority};
use tracing::debug;

use crate::config::{days_to_duration, SchedulerConfig};
use crate::knowledge_base::{DiagnosisRecord, StudentGraph};
use crate::weakness::ScoreUpdate;

pub struct ReviewScheduler {
    config: SchedulerConfig,
    half_life: Duration,
}

impl ReviewScheduler {
    /// `half_life` is used to decay stored scores when they are read.
    pub fn new(config: SchedulerConfig, half_life: Duration) -> Self {
        Self { config, half_life }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn priority_for(&self, score: f64) -> Priority {
        if score >= self.config.high_threshold {
            Priority::High
        } else if score >= self.config.medium_threshold {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Interval for a priority after `streak` reviews without a new diagnosis.
    pub fn interval(&self, priority: Priority, streak: u32) -> Duration {
        let base = match priority {
            Priority::High => self.config.high_interval_days,
            Priority::Medium => self.config.medium_interval_days,
            Priority::Low => self.config.low_interval_days,
        };
        let exponent = streak.min(i32::MAX as u32) as i32;
        let days = (base * self.config.backoff.powi(exponent)).min(self.config.max_interval_days);
        days_to_duration(days)
    }

    /// Reschedule a node whose score just changed. Resets the review streak.
    pub fn schedule_node(
        &self,
        graph: &mut StudentGraph,
        node: NodeId,
        score: f64,
        now: DateTime<Utc>,
    ) -> ReviewEntry {
        let target = ReviewTarget::Node(node);
        let priority = self.priority_for(score);
        let entry = ReviewEntry {
            target,
            priority,
            next_review_at: now + self.interval(priority, 0),
            review_streak: 0,
            last_reviewed_at: graph.review(&target).and_then(|e| e.last_reviewed_at),
            scheduled_at: now,
        };
        graph.set_review(entry.clone());
        entry
    }

    /// Reschedule every node updated by one propagation, plus the record's artifact.
    ///
    /// The artifact entry takes the highest priority and earliest date among
    /// the record's own weakness targets.
    pub fn schedule_record(
        &self,
        graph: &mut StudentGraph,
        record: &DiagnosisRecord,
        updates: &[ScoreUpdate],
        now: DateTime<Utc>,
    ) -> Vec<ReviewEntry> {
        let eligible: Vec<&ScoreUpdate> = updates
            .iter()
            .filter(|u| !is_synthetic(graph, u.node))
            .collect();
        let mut scheduled: Vec<ReviewEntry> = eligible
            .into_iter()
            .map(|u| self.schedule_node(graph, u.node, u.after, now))
            .collect();

        let targets = record.weakness_targets();
        let artifact_basis = scheduled
            .iter()
            .filter(|e| matches!(e.target, ReviewTarget::Node(n) if targets.contains(&n)))
            .fold(None, |acc: Option<(Priority, DateTime<Utc>)>, e| match acc {
                None => Some((e.priority, e.next_review_at)),
                Some((p, at)) => Some((p.min(e.priority), at.min(e.next_review_at))),
            });

        if let Some((priority, next_review_at)) = artifact_basis {
            let target = ReviewTarget::Artifact(record.source);
            let entry = ReviewEntry {
                target,
                priority,
                next_review_at,
                review_streak: 0,
                last_reviewed_at: graph.review(&target).and_then(|e| e.last_reviewed_at),
                scheduled_at: now,
            };
            graph.set_review(entry.clone());
            scheduled.push(entry);
        }

        debug!(
            record = %record.id,
            entries = scheduled.len(),
            "reviews scheduled"
        );
        scheduled
    }

    /// Record a completed review and push the next one further out.
    ///
    /// Returns `None` when the target has no schedule.
    pub fn mark_reviewed(
        &self,
        graph: &mut StudentGraph,
        target: ReviewTarget,
        now: DateTime<Utc>,
    ) -> Option<ReviewEntry> {
        let existing = graph.review(&target)?.clone();
        let streak = existing.effective_streak(now).saturating_add(1);
        let priority = match target {
            ReviewTarget::Node(node) => self.priority_for(self.current_score(graph, node, now)),
            ReviewTarget::Artifact(_) => existing.priority,
        };

        let entry = ReviewEntry {
            target,
            priority,
            next_review_at: now + self.interval(priority, streak),
            review_streak: streak,
            last_reviewed_at: Some(now),
            scheduled_at: now,
        };
        graph.set_review(entry.clone());
        Some(entry)
    }

    /// The student's review queue as of `now`.
    ///
    /// Node priorities are recomputed from decayed scores without writing them
    /// back. Entries whose target no longer exists or is an unsorted root are
    /// skipped.
    pub fn queue(&self, graph: &StudentGraph, now: DateTime<Utc>) -> Vec<QueuedReview> {
        let mut queue: Vec<QueuedReview> = graph
            .reviews()
            .filter_map(|entry| {
                let (label, priority) = match entry.target {
                    ReviewTarget::Node(node) => {
                        let node_ref = graph.node(node).filter(|n| !n.synthetic)?;
                        (node_ref.name.clone(), self.priority_for(self.current_score(graph, node, now)))
                    }
                    ReviewTarget::Artifact(artifact) => {
                        graph.latest_record_for(artifact)?;
                        (artifact.to_string(), entry.priority)
                    }
                };
                Some(QueuedReview {
                    target: entry.target,
                    label,
                    priority,
                    next_review_at: entry.next_review_at,
                    review_streak: entry.effective_streak(now),
                })
            })
            .collect();

        queue.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.next_review_at.cmp(&b.next_review_at))
                .then_with(|| a.label.cmp(&b.label))
        });
        queue
    }

    fn current_score(&self, graph: &StudentGraph, node: NodeId, now: DateTime<Utc>) -> f64 {
        graph
            .score(node)
            .map(|s| s.value_at(now, self.half_life))
            .unwrap_or(0.0)
    }
}

fn is_synthetic(graph: &StudentGraph, node: NodeId) -> bool {
    graph.node(node).map_or(false, |n| n.synthetic)
}
