//! Graph Assembler - read-only views of a student's graph for one root.
//!
//! Traversal is a breadth-first walk over child edges with a visited set, so a
//! node reachable through several parents appears once and a stray cycle
//! cannot keep the walk going.

mod view;

pub use view::*;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use study_model::{NodeId, RecordId};
use tracing::debug;

use crate::config::AssemblerConfig;
use crate::knowledge_base::{ItemOrigin, StudentGraph};

pub struct GraphAssembler {
    config: AssemblerConfig,
    half_life: Duration,
}

impl GraphAssembler {
    /// `half_life` decays weakness scores as they are read.
    pub fn new(config: AssemblerConfig, half_life: Duration) -> Self {
        Self { config, half_life }
    }

    /// Nodes reachable from `root` within `max_depth` edges, with their depth.
    pub fn traverse(&self, graph: &StudentGraph, root: NodeId) -> Vec<(NodeId, u32)> {
        if !graph.contains_node(root) {
            return Vec::new();
        }

        let mut order = Vec::new();
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([(root, 0u32)]);

        while let Some((current, depth)) = queue.pop_front() {
            order.push((current, depth));
            if depth >= self.config.max_depth {
                continue;
            }
            for child in graph.children(current) {
                if visited.insert(*child) {
                    queue.push_back((*child, depth + 1));
                }
            }
        }
        order
    }

    /// Build the annotated subgraph under `root`. `None` if the root is unknown.
    pub fn assemble(&self, graph: &StudentGraph, root: NodeId, now: DateTime<Utc>) -> Option<GraphView> {
        graph.node(root)?;

        let reached = self.traverse(graph, root);
        let included: HashSet<NodeId> = reached.iter().map(|(id, _)| *id).collect();

        let nodes = reached
            .iter()
            .filter_map(|(id, depth)| {
                graph.node(*id).map(|node| NodeView {
                    id: node.id,
                    name: node.name.clone(),
                    kind: node.kind,
                    subject: node.subject.clone(),
                    depth: *depth,
                    synthetic: node.synthetic,
                    created_at: node.created_at,
                })
            })
            .collect::<Vec<_>>();

        let edges = graph
            .edges()
            .iter()
            .filter(|e| included.contains(&e.from) && included.contains(&e.to))
            .map(|e| EdgeView { from: e.from, to: e.to })
            .collect::<Vec<_>>();

        let mut view = GraphView {
            root_id: root,
            nodes,
            edges,
            weakness_by_node: BTreeMap::new(),
            evidence_by_node: BTreeMap::new(),
            mistake_counts: BTreeMap::new(),
            related: BTreeMap::new(),
        };

        for (id, _) in &reached {
            let id = *id;
            let weakness = graph
                .score(id)
                .map(|s| s.value_at(now, self.half_life))
                .unwrap_or(0.0);
            view.weakness_by_node.insert(id, weakness);

            let evidence = self.evidence_refs(graph, id);
            if !evidence.is_empty() {
                view.evidence_by_node.insert(id, evidence);
            }

            let count = self.mistake_count(graph, id);
            if count > 0 {
                view.mistake_counts.insert(id, count);
            }

            let related = self.related_nodes(graph, id);
            if !related.is_empty() {
                view.related.insert(id, related);
            }
        }

        debug!(
            root = %root,
            nodes = view.nodes.len(),
            edges = view.edges.len(),
            "graph assembled"
        );
        Some(view)
    }

    /// Newest records implicating `node`, one reference per record.
    pub fn evidence_refs(&self, graph: &StudentGraph, node: NodeId) -> Vec<EvidenceRef> {
        let mut seen = HashSet::new();
        let mut refs: Vec<EvidenceRef> = graph
            .evidence_for(node)
            .iter()
            .rev()
            .filter(|link| seen.insert(link.record))
            .filter_map(|link| {
                let record = graph.record(link.record)?;
                let item = record.items.get(link.item_index)?;
                Some(EvidenceRef {
                    record_id: record.id,
                    artifact: record.source,
                    snippet: item.snippet().to_string(),
                    verdict: record.verdict.clone(),
                    recorded_at: record.created_at,
                })
            })
            .collect();

        refs.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        refs.truncate(self.config.evidence_per_node);
        refs
    }

    /// Records with a mistake item resolved to `node`.
    pub fn mistake_count(&self, graph: &StudentGraph, node: NodeId) -> usize {
        graph
            .evidence_for(node)
            .iter()
            .filter(|link| {
                graph
                    .record(link.record)
                    .and_then(|r| r.items.get(link.item_index))
                    .is_some_and(|item| item.origin == ItemOrigin::Mistake)
            })
            .map(|link| link.record)
            .collect::<HashSet<RecordId>>()
            .len()
    }

    /// Other nodes resolved in the same records as `node`, most frequent first.
    pub fn related_nodes(&self, graph: &StudentGraph, node: NodeId) -> Vec<RelatedNode> {
        let records: HashSet<RecordId> = graph.evidence_for(node).iter().map(|l| l.record).collect();

        let mut counts: HashMap<NodeId, usize> = HashMap::new();
        for record in records.iter().filter_map(|id| graph.record(*id)) {
            for other in record.resolved_nodes() {
                if other != node {
                    *counts.entry(other).or_default() += 1;
                }
            }
        }

        let mut related: Vec<RelatedNode> = counts
            .into_iter()
            .filter_map(|(id, count)| {
                graph.node(id).map(|n| RelatedNode {
                    id,
                    name: n.name.clone(),
                    count,
                })
            })
            .collect();

        related.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        related.truncate(self.config.related_per_node);
        related
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge_base::{
        ConceptEdge, ConceptNode, DiagnosisRecord, EvidenceLink, MistakeItem, Verdict,
    };
    use crate::weakness::WeaknessScore;
    use chrono::TimeZone;
    use study_model::{ArtifactRef, NodeKind, StudentId, Subject};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 5, 10, 0, 0).unwrap()
    }

    fn assembler() -> GraphAssembler {
        GraphAssembler::new(AssemblerConfig::default(), Duration::days(14))
    }

    fn add(graph: &mut StudentGraph, name: &str, kind: NodeKind) -> NodeId {
        graph.insert_node(ConceptNode::new(
            graph.student(),
            name,
            name,
            kind,
            Subject::unsorted(),
            t0(),
        ))
    }

    fn link(graph: &mut StudentGraph, from: NodeId, to: NodeId) {
        graph.insert_edge(ConceptEdge::new(from, to, t0()));
    }

    /// Push a record whose items resolve to `nodes` and link the evidence.
    fn diagnose(graph: &mut StudentGraph, source: i64, nodes: &[NodeId], at: DateTime<Utc>) -> RecordId {
        let items = nodes
            .iter()
            .map(|n| {
                let mut item = MistakeItem::new("x").with_reason(format!("reason {}", source));
                item.resolved_node = Some(*n);
                item
            })
            .collect();
        let record = DiagnosisRecord::new(
            graph.student(),
            ArtifactRef::error_book(source),
            Subject::unsorted(),
            Verdict::Stated("v".into()),
            0.7,
            at,
        )
        .with_items(items);
        let id = graph.push_record(record);
        for (index, node) in nodes.iter().enumerate() {
            graph.link_evidence(
                *node,
                EvidenceLink {
                    record: id,
                    item_index: index,
                    linked_at: at,
                },
            );
        }
        id
    }

    #[test]
    fn test_shared_descendant_included_once() {
        let mut graph = StudentGraph::new(StudentId(1));
        let root = add(&mut graph, "root", NodeKind::Chapter);
        let left = add(&mut graph, "left", NodeKind::Concept);
        let right = add(&mut graph, "right", NodeKind::Concept);
        let shared = add(&mut graph, "shared", NodeKind::Method);
        link(&mut graph, root, left);
        link(&mut graph, root, right);
        link(&mut graph, left, shared);
        link(&mut graph, right, shared);

        let view = assembler().assemble(&graph, root, t0()).unwrap();

        assert_eq!(view.nodes.len(), 4);
        assert_eq!(view.nodes.iter().filter(|n| n.id == shared).count(), 1);
        assert_eq!(view.node(shared).unwrap().depth, 2);
        assert_eq!(view.edges.len(), 4);
    }

    #[test]
    fn test_traversal_survives_a_cycle() {
        let mut graph = StudentGraph::new(StudentId(1));
        let a = add(&mut graph, "a", NodeKind::Chapter);
        let b = add(&mut graph, "b", NodeKind::Concept);
        let c = add(&mut graph, "c", NodeKind::Method);
        for (from, to) in [(a, b), (b, c), (c, a), (a, c), (c, c)] {
            graph.insert_edge_unchecked(ConceptEdge::new(from, to, t0()));
        }
        let deep = GraphAssembler::new(
            AssemblerConfig {
                max_depth: 64,
                ..Default::default()
            },
            Duration::days(14),
        );

        let order = deep.traverse(&graph, b);
        assert_eq!(order, vec![(b, 0), (c, 1), (a, 2)]);

        let view = deep.assemble(&graph, a, t0()).unwrap();
        assert_eq!(view.nodes.len(), 3);
    }

    #[test]
    fn test_depth_bound_and_unknown_root() {
        let mut graph = StudentGraph::new(StudentId(1));
        let mut chain = vec![add(&mut graph, "n0", NodeKind::Chapter)];
        for i in 1..8 {
            let next = add(&mut graph, &format!("n{}", i), NodeKind::Concept);
            link(&mut graph, chain[i - 1], next);
            chain.push(next);
        }

        let view = assembler().assemble(&graph, chain[0], t0()).unwrap();
        assert_eq!(view.nodes.len(), 5);
        assert!(!view.contains(chain[5]));
        assert_eq!(view.edges.len(), 4);

        assert!(assembler().assemble(&graph, NodeId::new(), t0()).is_none());
    }

    #[test]
    fn test_weakness_decayed_on_read() {
        let mut graph = StudentGraph::new(StudentId(1));
        let root = add(&mut graph, "root", NodeKind::Chapter);
        graph.set_score(root, WeaknessScore::new(2.0, t0()));

        let fresh = assembler().assemble(&graph, root, t0()).unwrap();
        assert!((fresh.weakness_by_node[&root] - 2.0).abs() < 1e-9);

        let later = assembler().assemble(&graph, root, t0() + Duration::days(42)).unwrap();
        assert!((later.weakness_by_node[&root] - 0.5).abs() < 1e-9);
        // reading does not persist decay
        assert!((graph.score(root).unwrap().value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_evidence_newest_first_and_bounded() {
        let mut graph = StudentGraph::new(StudentId(1));
        let node = add(&mut graph, "顶点式", NodeKind::Concept);
        for i in 0..7 {
            diagnose(&mut graph, i, &[node], t0() + Duration::hours(i));
        }

        let refs = assembler().evidence_refs(&graph, node);
        assert_eq!(refs.len(), 5);
        assert_eq!(refs[0].artifact, ArtifactRef::error_book(6));
        assert_eq!(refs[4].artifact, ArtifactRef::error_book(2));
        assert_eq!(refs[0].snippet, "reason 6");
        assert_eq!(assembler().mistake_count(&graph, node), 7);
    }

    #[test]
    fn test_related_by_co_occurrence() {
        let mut graph = StudentGraph::new(StudentId(1));
        let a = add(&mut graph, "a", NodeKind::Concept);
        let b = add(&mut graph, "b", NodeKind::Concept);
        let c = add(&mut graph, "c", NodeKind::Concept);
        let d = add(&mut graph, "d", NodeKind::Concept);
        diagnose(&mut graph, 1, &[a, b, c], t0());
        diagnose(&mut graph, 2, &[a, c], t0());
        diagnose(&mut graph, 3, &[a, d], t0());

        let related = assembler().related_nodes(&graph, a);
        let names: Vec<_> = related.iter().map(|r| (r.name.as_str(), r.count)).collect();
        assert_eq!(names, vec![("c", 2), ("b", 1), ("d", 1)]);
    }

    #[test]
    fn test_view_serializes_with_string_keys() {
        let mut graph = StudentGraph::new(StudentId(1));
        let root = add(&mut graph, "root", NodeKind::Chapter);
        graph.set_score(root, WeaknessScore::new(1.0, t0()));

        let view = assembler().assemble(&graph, root, t0()).unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["weakness_by_node"][root.to_string()].is_number());
        let back: GraphView = serde_json::from_value(json).unwrap();
        assert_eq!(back, view);
    }
}
