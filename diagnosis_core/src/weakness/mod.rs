//! Weakness Propagator - raises scores on implicated nodes and passes a damped
//! share of each increment to their ancestors.
//!
//! The propagation works as follows:
//! 1. **Targets**: distinct nodes named by resolved mistake items of one record
//! 2. **Decay**: each score about to change is first decayed to `now`
//! 3. **Direct**: `score[node] += base_weight(confidence)`
//! 4. **Spreading**: every ancestor within `propagation_depth` receives
//!    `base_weight * damping^depth`, once per target at its minimum depth

mod score;

pub use score::*;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use study_model::NodeId;
use tracing::debug;

use crate::config::WeaknessConfig;
use crate::knowledge_base::{DiagnosisRecord, StudentGraph};

/// Score change applied to one node by one propagation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub node: NodeId,
    /// Value after decay, before the increment.
    pub before: f64,
    pub after: f64,
    /// Whether the node was a direct target (as opposed to an ancestor).
    pub direct: bool,
}

/// Applies weakness increments to a student graph.
pub struct WeaknessPropagator {
    config: WeaknessConfig,
}

impl WeaknessPropagator {
    /// Create a new propagator with the given configuration.
    pub fn new(config: WeaknessConfig) -> Self {
        Self { config }
    }

    /// Create a propagator with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(WeaknessConfig::default())
    }

    pub fn config(&self) -> &WeaknessConfig {
        &self.config
    }

    /// Increment contributed by a diagnosis of the given confidence.
    ///
    /// Strictly increasing in confidence; zero at zero confidence.
    pub fn base_weight(&self, confidence: f64) -> f64 {
        self.config.weight_scale * confidence.clamp(0.0, 1.0)
    }

    /// Compute the per-node increments for a set of targets without touching the graph.
    ///
    /// Synthetic ancestors receive nothing.
    pub fn increments(
        &self,
        graph: &StudentGraph,
        targets: &[NodeId],
        confidence: f64,
    ) -> Vec<(NodeId, f64, bool)> {
        let base = self.base_weight(confidence);
        let mut amounts: HashMap<NodeId, (f64, bool)> = HashMap::new();
        let mut order = Vec::new();

        for target in targets.iter().filter(|t| graph.contains_node(**t)) {
            let entry = amounts.entry(*target).or_insert_with(|| {
                order.push(*target);
                (0.0, true)
            });
            entry.0 += base;
            entry.1 = true;

            for (ancestor, depth) in graph.ancestors_within(*target, self.config.propagation_depth) {
                // unsorted roots group nodes, they are not knowledge to review
                if graph.node(ancestor).map_or(true, |n| n.synthetic) {
                    continue;
                }
                let share = base * self.config.damping.powi(depth as i32);
                let entry = amounts.entry(ancestor).or_insert_with(|| {
                    order.push(ancestor);
                    (0.0, false)
                });
                entry.0 += share;
            }
        }

        order
            .into_iter()
            .filter_map(|node| amounts.get(&node).map(|(amount, direct)| (node, *amount, *direct)))
            .collect()
    }

    /// Apply one record's weakness signal.
    ///
    /// A record without resolved mistake items changes nothing, not even decay.
    pub fn propagate(
        &self,
        graph: &mut StudentGraph,
        record: &DiagnosisRecord,
        now: DateTime<Utc>,
    ) -> Vec<ScoreUpdate> {
        let targets = record.weakness_targets();
        if targets.is_empty() {
            return Vec::new();
        }
        self.apply_to(graph, &targets, record.confidence, now)
    }

    /// Apply increments for explicit targets at a given confidence.
    pub fn apply_to(
        &self,
        graph: &mut StudentGraph,
        targets: &[NodeId],
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Vec<ScoreUpdate> {
        let half_life = self.config.half_life();
        let mut updates = Vec::new();

        for (node, amount, direct) in self.increments(graph, targets, confidence) {
            let current = graph
                .score(node)
                .cloned()
                .unwrap_or_else(|| WeaknessScore::zero(now));
            let before = current.value_at(now, half_life);
            let next = current.bump(amount, now, half_life);

            debug!(
                node = %node,
                before,
                after = next.value,
                direct,
                "weakness updated"
            );

            updates.push(ScoreUpdate {
                node,
                before,
                after: next.value,
                direct,
            });
            graph.set_score(node, next);
        }

        updates
    }

    /// Current (lazily decayed) score of a node; zero if never touched.
    pub fn current(&self, graph: &StudentGraph, node: NodeId, now: DateTime<Utc>) -> f64 {
        graph
            .score(node)
            .map(|s| s.value_at(now, self.config.half_life()))
            .unwrap_or(0.0)
    }
}
