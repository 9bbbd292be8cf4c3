//! Persistence round trips through an on-disk SQLite database.

use chrono::{Duration, TimeZone, Utc};
use diagnosis_core::*;
use std::sync::Arc;
use study_model::{Artifact, ArtifactRef, ManualClock, SourceType, StudentId};

const STUDENT: StudentId = StudentId(11);

fn service_at(
    path: &std::path::Path,
    sources: Arc<MemorySources>,
    clock: Arc<ManualClock>,
) -> DiagnosisService<SqliteStore> {
    DiagnosisService::new(
        PipelineConfig::default(),
        SqliteStore::open(path).unwrap(),
        sources.clone(),
        sources,
    )
    .unwrap()
    .with_clock(clock)
}

fn sources() -> Arc<MemorySources> {
    let sources = Arc::new(MemorySources::new());
    sources.insert(
        Artifact::new(ArtifactRef::error_book(1), STUDENT, "解得 x = 2，顶点 (1, -3)")
            .with_chapter("二次函数"),
        r#"```json
        {"verdict": "顶点坐标符号错误", "confidence": "90%",
         "mistakes": [
            {"concept": "二次函数顶点式", "reason": "把 +3 看成 -3", "evidence": "顶点 (1, -3)"},
            {"concept": "配方法", "reason": "常数项漏算", "kind": "method"}
         ],
         "key_points": ["顶点坐标"]}
        ```"#,
    );
    sources.insert(
        Artifact::new(ArtifactRef::note(2), STUDENT, "课堂笔记").with_subject("数学"),
        "no structure here",
    );
    sources
}

#[test]
fn test_graph_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diagnosis.db");
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 10, 8, 19, 45, 0).unwrap()));
    let sources = sources();

    let (view_before, queue_before, record_before) = {
        let service = service_at(&path, sources.clone(), clock.clone());
        let outcome = service.record_diagnosis(ArtifactRef::error_book(1)).unwrap();
        service.record_diagnosis(ArtifactRef::note(2)).unwrap();
        clock.advance(Duration::hours(3));
        let node = outcome.record.items[0].resolved_node.unwrap();
        service.mark_reviewed(STUDENT, ReviewTarget::Node(node)).unwrap();

        (
            service.generate_graph(STUDENT, SourceType::ErrorBook, 1).unwrap(),
            service.get_review_queue(STUDENT).unwrap(),
            outcome.record,
        )
    };

    let reopened = service_at(&path, sources, clock);
    let view_after = reopened.generate_graph(STUDENT, SourceType::ErrorBook, 1).unwrap();
    let queue_after = reopened.get_review_queue(STUDENT).unwrap();

    assert_eq!(view_before, view_after);
    assert_eq!(queue_before, queue_after);

    let history = reopened
        .diagnosis_history(STUDENT, ArtifactRef::error_book(1))
        .unwrap();
    assert_eq!(history, vec![record_before]);

    let unparsed = reopened.diagnosis_history(STUDENT, ArtifactRef::note(2)).unwrap();
    assert_eq!(unparsed[0].verdict, Verdict::Unparsed);
}

#[test]
fn test_reopened_store_keeps_deduping() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diagnosis.db");
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 10, 8, 19, 45, 0).unwrap()));
    let sources = sources();

    let first = {
        let service = service_at(&path, sources.clone(), clock.clone());
        service.record_diagnosis(ArtifactRef::error_book(1)).unwrap()
    };

    let reopened = service_at(&path, sources, clock);
    let second = reopened.record_diagnosis(ArtifactRef::error_book(1)).unwrap();

    assert!(second.record.id != first.record.id);
    for (a, b) in first.record.items.iter().zip(&second.record.items) {
        assert_eq!(a.resolved_node, b.resolved_node);
    }
    assert_eq!(
        reopened
            .diagnosis_history(STUDENT, ArtifactRef::error_book(1))
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_schema_version_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.db");
    SqliteStore::open(&path).unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
}
