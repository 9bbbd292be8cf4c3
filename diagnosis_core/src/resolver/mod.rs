//! Graph Resolver - maps the labels of a [`DiagnosisRecord`] onto nodes of
//! the student's graph.
//!
//! For each item:
//! 1. normalize the label; empty labels are skipped and reported
//! 2. reuse a node with the same normalized name and a compatible kind, or create one
//! 3. attach it under its parent (synthetic root, chapter anchor, or the
//!    record's latest concept), rerouting to the synthetic root on a cycle
//! 4. link the node back to the record item

mod kind;

pub use kind::*;

use chrono::{DateTime, Utc};
use study_model::{NodeId, NodeKind, Subject};
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::ConfigError;
use crate::knowledge_base::{
    label, ConceptEdge, ConceptNode, DiagnosisRecord, EdgeInsert, EvidenceLink, StudentGraph,
};

/// Something the resolver recovered from instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionAnomaly {
    /// The item's label normalized to nothing; the item stays unresolved.
    EmptyLabel { item_index: usize, label: String },

    /// Attaching `child` under `parent` would have closed a cycle, so it was
    /// attached under the synthetic root instead.
    CycleRedirected {
        item_index: Option<usize>,
        parent: NodeId,
        child: NodeId,
    },
}

/// What one resolution pass did to the graph.
#[derive(Debug, Clone, Default)]
pub struct ResolutionOutcome {
    /// Node the record was anchored under.
    pub anchor: Option<NodeId>,
    pub created: Vec<NodeId>,
    pub reused: Vec<NodeId>,
    pub edges_added: usize,
    pub anomalies: Vec<ResolutionAnomaly>,
}

impl ResolutionOutcome {
    pub fn resolved_count(&self) -> usize {
        self.created.len() + self.reused.len()
    }
}

pub struct GraphResolver {
    config: ResolverConfig,
    classifier: KindClassifier,
}

impl GraphResolver {
    /// Fails only when a chapter pattern does not compile.
    pub fn new(config: ResolverConfig) -> Result<Self, ConfigError> {
        let classifier = KindClassifier::new(&config.chapter_patterns)?;
        Ok(Self { config, classifier })
    }

    pub fn classifier(&self) -> &KindClassifier {
        &self.classifier
    }

    /// Resolve every item of `record` into `graph`, writing the resolved node
    /// IDs and the anchor back onto the record.
    ///
    /// `chapter_hint` is the chapter (or title) carried by the source artifact.
    pub fn resolve(
        &self,
        graph: &mut StudentGraph,
        record: &mut DiagnosisRecord,
        chapter_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        let subject = record.subject.clone();
        let record_id = record.id;

        let root = self.ensure_root(graph, &subject, now);
        let anchor = match chapter_hint.map(|h| self.normalize(h)) {
            Some(normalized) if !normalized.is_empty() => {
                let hint = chapter_hint.unwrap_or_default();
                let chapter =
                    self.find_or_create(graph, hint, &normalized, NodeKind::Chapter, &subject, now, &mut outcome);
                self.attach(graph, root, chapter, root, None, now, &mut outcome);
                chapter
            }
            _ => root,
        };
        outcome.anchor = Some(anchor);

        let mut latest_concept: Option<NodeId> = None;
        for (index, item) in record.items.iter_mut().enumerate() {
            let normalized = self.normalize(&item.concept_label);
            if normalized.is_empty() {
                warn!(
                    record = %record_id,
                    item = index,
                    label = %item.concept_label,
                    "label normalized to nothing, item left unresolved"
                );
                outcome.anomalies.push(ResolutionAnomaly::EmptyLabel {
                    item_index: index,
                    label: item.concept_label.clone(),
                });
                continue;
            }

            let kind = self.classifier.classify(&item.concept_label, item.kind_hint);
            let node =
                self.find_or_create(graph, &item.concept_label, &normalized, kind, &subject, now, &mut outcome);

            let parent = match kind {
                NodeKind::Chapter => root,
                NodeKind::Concept => anchor,
                NodeKind::Method | NodeKind::Mistake => latest_concept.unwrap_or(anchor),
            };
            self.attach(graph, parent, node, root, Some(index), now, &mut outcome);

            if kind == NodeKind::Concept {
                latest_concept = Some(node);
            }

            item.resolved_node = Some(node);
            graph.link_evidence(
                node,
                EvidenceLink {
                    record: record_id,
                    item_index: index,
                    linked_at: now,
                },
            );
        }

        record.anchor_node = Some(anchor);
        debug!(
            record = %record_id,
            created = outcome.created.len(),
            reused = outcome.reused.len(),
            edges = outcome.edges_added,
            anomalies = outcome.anomalies.len(),
            "record resolved"
        );
        outcome
    }

    fn normalize(&self, raw: &str) -> String {
        label::normalize(raw, self.config.max_label_chars)
    }

    fn ensure_root(&self, graph: &mut StudentGraph, subject: &Subject, now: DateTime<Utc>) -> NodeId {
        match graph.unsorted_root(subject) {
            Some(root) => root,
            None => graph.insert_node(ConceptNode::unsorted_root(
                graph.student(),
                &self.config.unsorted_root_name,
                subject.clone(),
                now,
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn find_or_create(
        &self,
        graph: &mut StudentGraph,
        raw_label: &str,
        normalized: &str,
        kind: NodeKind,
        subject: &Subject,
        now: DateTime<Utc>,
        outcome: &mut ResolutionOutcome,
    ) -> NodeId {
        if let Some(existing) = graph.find_node(normalized, kind) {
            let id = existing.id;
            if !outcome.reused.contains(&id) && !outcome.created.contains(&id) {
                outcome.reused.push(id);
            }
            return id;
        }

        let mut name = label::display(raw_label, self.config.max_label_chars);
        if name.is_empty() {
            name = normalized.to_string();
        }
        let id = graph.insert_node(ConceptNode::new(
            graph.student(),
            name,
            normalized,
            kind,
            subject.clone(),
            now,
        ));
        outcome.created.push(id);
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn attach(
        &self,
        graph: &mut StudentGraph,
        parent: NodeId,
        child: NodeId,
        root: NodeId,
        item_index: Option<usize>,
        now: DateTime<Utc>,
        outcome: &mut ResolutionOutcome,
    ) {
        match graph.insert_edge(ConceptEdge::new(parent, child, now)) {
            EdgeInsert::Inserted => outcome.edges_added += 1,
            EdgeInsert::Duplicate => {}
            EdgeInsert::WouldCycle => {
                warn!(
                    parent = %parent,
                    child = %child,
                    "edge would close a cycle, attaching under the unsorted root"
                );
                outcome.anomalies.push(ResolutionAnomaly::CycleRedirected {
                    item_index,
                    parent,
                    child,
                });
                if child != root
                    && graph.insert_edge(ConceptEdge::new(root, child, now)) == EdgeInsert::Inserted
                {
                    outcome.edges_added += 1;
                }
            }
            EdgeInsert::MissingNode => {
                debug!(parent = %parent, child = %child, "edge endpoint missing, skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::{MistakeItem, Verdict};
    use study_model::{ArtifactRef, StudentId};

    fn resolver() -> GraphResolver {
        GraphResolver::new(ResolverConfig::default()).unwrap()
    }

    fn record(items: Vec<MistakeItem>) -> DiagnosisRecord {
        DiagnosisRecord::new(
            StudentId(1),
            ArtifactRef::error_book(1),
            Subject::normalize(Some("数学")),
            Verdict::Stated("v".into()),
            0.8,
            Utc::now(),
        )
        .with_items(items)
    }

    #[test]
    fn test_trailing_space_resolves_to_same_node() {
        let mut graph = StudentGraph::new(StudentId(1));
        let mut rec = record(vec![
            MistakeItem::new("二次函数顶点式").with_reason("a"),
            MistakeItem::new("二次函数顶点式 ").with_reason("b"),
        ]);

        let outcome = resolver().resolve(&mut graph, &mut rec, None, Utc::now());

        assert_eq!(rec.items[0].resolved_node, rec.items[1].resolved_node);
        assert_eq!(outcome.created.len(), 1);
        // the concept plus the subject's unsorted root
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_reuse_across_records() {
        let mut graph = StudentGraph::new(StudentId(1));
        let r = resolver();

        let mut first = record(vec![MistakeItem::new("Vertex Form!")]);
        r.resolve(&mut graph, &mut first, None, Utc::now());
        let mut second = record(vec![MistakeItem::new("vertex form")]);
        let outcome = r.resolve(&mut graph, &mut second, None, Utc::now());

        assert_eq!(first.items[0].resolved_node, second.items[0].resolved_node);
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.reused.len(), 1);
    }

    #[test]
    fn test_empty_label_is_skipped() {
        let mut graph = StudentGraph::new(StudentId(1));
        let mut rec = record(vec![
            MistakeItem::new("！？。").with_reason("punctuation only"),
            MistakeItem::new("").with_reason("reason only"),
            MistakeItem::new("配方法"),
        ]);

        let outcome = resolver().resolve(&mut graph, &mut rec, None, Utc::now());

        assert!(rec.items[0].resolved_node.is_none());
        assert!(rec.items[1].resolved_node.is_none());
        assert!(rec.items[2].resolved_node.is_some());
        assert_eq!(
            outcome
                .anomalies
                .iter()
                .filter(|a| matches!(a, ResolutionAnomaly::EmptyLabel { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_parent_selection_with_chapter_hint() {
        let mut graph = StudentGraph::new(StudentId(1));
        let mut rec = record(vec![
            MistakeItem::new("顶点式"),
            MistakeItem::new("配方").with_kind_hint(NodeKind::Method),
            MistakeItem::new("第三章 函数"),
        ]);

        let outcome = resolver().resolve(&mut graph, &mut rec, Some("二次函数"), Utc::now());

        let root = graph.unsorted_root(&rec.subject).unwrap();
        let anchor = outcome.anchor.unwrap();
        let concept = rec.items[0].resolved_node.unwrap();
        let method = rec.items[1].resolved_node.unwrap();
        let chapter = rec.items[2].resolved_node.unwrap();

        assert_eq!(rec.anchor_node, Some(anchor));
        assert_eq!(graph.node(anchor).unwrap().kind, NodeKind::Chapter);
        assert!(graph.has_edge(root, anchor));
        assert!(graph.has_edge(anchor, concept));
        assert!(graph.has_edge(concept, method));
        assert!(graph.has_edge(root, chapter));
        assert_eq!(graph.node(chapter).unwrap().kind, NodeKind::Chapter);
    }

    #[test]
    fn test_without_hint_anchor_is_root() {
        let mut graph = StudentGraph::new(StudentId(1));
        let mut rec = record(vec![MistakeItem::new("判别式")]);

        let outcome = resolver().resolve(&mut graph, &mut rec, Some("   "), Utc::now());

        let root = graph.unsorted_root(&rec.subject).unwrap();
        assert_eq!(outcome.anchor, Some(root));
        assert!(graph.node(root).unwrap().synthetic);
        assert!(graph.has_edge(root, rec.items[0].resolved_node.unwrap()));
    }

    #[test]
    fn test_cycle_redirected_to_root() {
        let mut graph = StudentGraph::new(StudentId(1));
        let r = resolver();

        // a (concept) -> b (method)
        let mut first = record(vec![
            MistakeItem::new("a"),
            MistakeItem::new("b").with_kind_hint(NodeKind::Method),
        ]);
        r.resolve(&mut graph, &mut first, None, Utc::now());
        let a = first.items[0].resolved_node.unwrap();
        let b = first.items[1].resolved_node.unwrap();

        // b as a concept, then a as a method under it: b -> a would close a cycle
        let mut second = record(vec![
            MistakeItem::new("b"),
            MistakeItem::new("a").with_kind_hint(NodeKind::Method),
        ]);
        let outcome = r.resolve(&mut graph, &mut second, None, Utc::now());

        assert_eq!(second.items[0].resolved_node, Some(b));
        assert_eq!(second.items[1].resolved_node, Some(a));
        assert!(!graph.has_edge(b, a));
        assert!(outcome.anomalies.iter().any(|an| matches!(
            an,
            ResolutionAnomaly::CycleRedirected { parent, child, .. } if *parent == b && *child == a
        )));
        let root = graph.unsorted_root(&second.subject).unwrap();
        assert!(graph.has_edge(root, a));
    }

    #[test]
    fn test_evidence_links_back_to_record() {
        let mut graph = StudentGraph::new(StudentId(1));
        let mut rec = record(vec![MistakeItem::new("韦达定理"), MistakeItem::new("韦达定理。")]);

        resolver().resolve(&mut graph, &mut rec, None, Utc::now());

        let node = rec.items[0].resolved_node.unwrap();
        let links = graph.evidence_for(node);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.record == rec.id));
        assert_eq!(links[1].item_index, 1);
    }

    #[test]
    fn test_long_labels_truncated() {
        let mut graph = StudentGraph::new(StudentId(1));
        let long = "很".repeat(40);
        let mut rec = record(vec![MistakeItem::new(long.clone()), MistakeItem::new(long + "长")]);

        resolver().resolve(&mut graph, &mut rec, None, Utc::now());

        let node = graph.node(rec.items[0].resolved_node.unwrap()).unwrap();
        assert_eq!(node.normalized_name.chars().count(), 24);
        assert_eq!(rec.items[0].resolved_node, rec.items[1].resolved_node);
    }
}
