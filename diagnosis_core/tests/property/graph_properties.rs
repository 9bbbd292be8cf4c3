use chrono::Utc;
use diagnosis_core::*;
use proptest::prelude::*;
use std::collections::HashSet;
use study_model::{ArtifactRef, NodeKind, StudentId, Subject};

fn arb_label() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("二次函数顶点式".to_string()),
        Just("二次函数顶点式 ".to_string()),
        Just(" 配方法。".to_string()),
        Just("配方法".to_string()),
        Just("Vertex Form".to_string()),
        Just("vertex  form!".to_string()),
        Just("第二章 函数".to_string()),
        Just("？？".to_string()),
        "[a-e]{1,3}",
    ]
}

fn arb_kind() -> impl Strategy<Value = Option<NodeKind>> {
    prop_oneof![
        Just(None),
        Just(Some(NodeKind::Concept)),
        Just(Some(NodeKind::Method)),
        Just(Some(NodeKind::Mistake)),
        Just(Some(NodeKind::Chapter)),
    ]
}

fn arb_record_items() -> impl Strategy<Value = Vec<(String, Option<NodeKind>)>> {
    prop::collection::vec((arb_label(), arb_kind()), 0..6)
}

fn arb_chapter() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("二次函数".to_string())),
        Just(Some("a".to_string())),
        "[a-c]{1,2}".prop_map(Some),
    ]
}

/// Resolve a sequence of records into one graph.
fn build(records: &[(Option<String>, Vec<(String, Option<NodeKind>)>)]) -> StudentGraph {
    let resolver = GraphResolver::new(ResolverConfig::default()).unwrap();
    let mut graph = StudentGraph::new(StudentId(1));
    for (index, (chapter, items)) in records.iter().enumerate() {
        let items = items
            .iter()
            .map(|(label, kind)| {
                let item = MistakeItem::new(label.clone()).with_reason("r");
                match kind {
                    Some(kind) => item.with_kind_hint(*kind),
                    None => item,
                }
            })
            .collect();
        let mut record = DiagnosisRecord::new(
            StudentId(1),
            ArtifactRef::error_book(index as i64),
            Subject::normalize(Some("数学")),
            Verdict::Stated("v".into()),
            0.7,
            Utc::now(),
        )
        .with_items(items);
        resolver.resolve(&mut graph, &mut record, chapter.as_deref(), Utc::now());
        graph.push_record(record);
    }
    graph
}

proptest! {
    #[test]
    fn no_two_nodes_share_name_and_kind(
        records in prop::collection::vec((arb_chapter(), arb_record_items()), 1..6)
    ) {
        let graph = build(&records);
        let mut seen = HashSet::new();
        for node in graph.nodes().filter(|n| !n.synthetic) {
            prop_assert!(seen.insert((node.normalized_name.clone(), node.kind)));
        }
    }

    #[test]
    fn resolved_graph_is_acyclic(
        records in prop::collection::vec((arb_chapter(), arb_record_items()), 1..8)
    ) {
        let graph = build(&records);
        for edge in graph.edges() {
            prop_assert!(edge.from != edge.to);
            prop_assert!(!graph.is_ancestor(edge.to, edge.from));
        }
    }

    #[test]
    fn traversal_visits_each_node_once(
        records in prop::collection::vec((arb_chapter(), arb_record_items()), 1..8),
        max_depth in 0u32..6
    ) {
        let graph = build(&records);
        let assembler = GraphAssembler::new(
            AssemblerConfig { max_depth, ..Default::default() },
            chrono::Duration::days(14),
        );
        for node in graph.nodes() {
            let order = assembler.traverse(&graph, node.id);
            let distinct: HashSet<_> = order.iter().map(|(id, _)| *id).collect();
            prop_assert_eq!(distinct.len(), order.len());
            prop_assert!(order.iter().all(|(_, depth)| *depth <= max_depth));
            prop_assert!(order.len() <= graph.node_count());
        }
    }

    #[test]
    fn equal_normalized_labels_resolve_to_one_node(label in arb_label(), pad in "[ ]{0,3}") {
        let padded = format!("{}{}", label, pad);
        let graph = build(&[(None, vec![(label.clone(), None), (padded, None)])]);
        let record = graph.records().next().unwrap();
        prop_assert_eq!(record.items[0].resolved_node, record.items[1].resolved_node);
    }
}
