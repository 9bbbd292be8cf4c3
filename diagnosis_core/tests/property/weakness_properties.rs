use chrono::{Duration, TimeZone, Utc};
use diagnosis_core::*;
use proptest::prelude::*;
use study_model::{ArtifactRef, NodeId, NodeKind, StudentId, Subject};

/// chapter -> concept -> method, each carrying a prior score.
fn chain(prior: f64, prior_age_days: i64) -> (StudentGraph, Vec<NodeId>) {
    let t0 = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    let mut graph = StudentGraph::new(StudentId(1));
    let mut ids = Vec::new();
    for (name, kind) in [
        ("chapter", NodeKind::Chapter),
        ("concept", NodeKind::Concept),
        ("method", NodeKind::Method),
    ] {
        let id = graph.insert_node(ConceptNode::new(
            StudentId(1),
            name,
            name,
            kind,
            Subject::unsorted(),
            t0,
        ));
        if let Some(parent) = ids.last() {
            graph.insert_edge(ConceptEdge::new(*parent, id, t0));
        }
        graph.set_score(id, WeaknessScore::new(prior, t0 - Duration::days(prior_age_days)));
        ids.push(id);
    }
    (graph, ids)
}

fn record(targets: &[NodeId], confidence: f64) -> DiagnosisRecord {
    let items = targets
        .iter()
        .map(|n| {
            let mut item = MistakeItem::new("x");
            item.resolved_node = Some(*n);
            item
        })
        .collect();
    DiagnosisRecord::new(
        StudentId(1),
        ArtifactRef::note(1),
        Subject::unsorted(),
        Verdict::Stated("v".into()),
        confidence,
        Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap(),
    )
    .with_items(items)
}

proptest! {
    #[test]
    fn touched_scores_do_not_decrease(
        prior in 0.0f64..5.0,
        confidence in 0.0f64..=1.0,
        target in 0usize..3,
    ) {
        let (mut graph, ids) = chain(prior, 0);
        let now = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
        let propagator = WeaknessPropagator::with_defaults();

        let before: Vec<f64> = ids.iter().map(|id| propagator.current(&graph, *id, now)).collect();
        propagator.propagate(&mut graph, &record(&[ids[target]], confidence), now);

        for (index, id) in ids.iter().enumerate() {
            let after = propagator.current(&graph, *id, now);
            prop_assert!(after >= before[index] - 1e-12);
            prop_assert!(after >= 0.0);
        }
    }

    #[test]
    fn base_weight_is_monotonic(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let propagator = WeaknessPropagator::with_defaults();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(propagator.base_weight(lo) <= propagator.base_weight(hi));
    }

    #[test]
    fn zero_item_record_changes_nothing(
        prior in 0.0f64..5.0,
        age in 0i64..90,
        later_days in 0i64..120,
        confidence in 0.0f64..=1.0,
    ) {
        let (mut graph, ids) = chain(prior, age);
        let before: Vec<_> = ids.iter().map(|id| graph.score(*id).cloned()).collect();
        let now = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap() + Duration::days(later_days);

        let updates = WeaknessPropagator::with_defaults()
            .propagate(&mut graph, &record(&[], confidence), now);

        prop_assert!(updates.is_empty());
        for (index, id) in ids.iter().enumerate() {
            prop_assert_eq!(graph.score(*id).cloned(), before[index].clone());
        }
    }

    #[test]
    fn decay_never_increases_a_score(value in 0.0f64..10.0, days in 0i64..365) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let score = WeaknessScore::new(value, t0);
        let read = score.value_at(t0 + Duration::days(days), Duration::days(14));
        prop_assert!(read <= value + 1e-12);
        prop_assert!(read >= 0.0);
    }
}
