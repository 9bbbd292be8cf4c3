//! Service façade: runs the diagnosis pipeline per artifact and answers graph
//! and review-queue queries.
//!
//! Each student has a slot holding a write mutex and the latest committed
//! graph snapshot. A pipeline run holds the write mutex, mutates a private
//! copy of the snapshot with the journal on, commits the journal, and only
//! then swaps the snapshot in. Readers clone the snapshot `Arc` and never wait
//! on a running pipeline.

mod sources;

pub use sources::*;

use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use study_model::{ArtifactRef, Clock, NodeId, SourceType, StudentId, SystemClock};
use tracing::{info, warn};

use crate::assembler::{GraphAssembler, GraphView};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, DiagnosisError, DiagnosisResult};
use crate::extractor::EvidenceExtractor;
use crate::knowledge_base::{DiagnosisRecord, StudentGraph};
use crate::resolver::{GraphResolver, ResolutionAnomaly};
use crate::scheduler::{QueuedReview, ReviewEntry, ReviewScheduler, ReviewTarget};
use crate::store::GraphStore;
use crate::weakness::{ScoreUpdate, WeaknessPropagator};
use crate::{record_span, stage_span};

/// Result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisOutcome {
    /// The stored record, with resolved node IDs filled in.
    pub record: DiagnosisRecord,
    #[serde(skip)]
    pub anomalies: Vec<ResolutionAnomaly>,
    #[serde(skip)]
    pub score_updates: Vec<ScoreUpdate>,
    pub reviews: Vec<ReviewEntry>,
}

#[derive(Default)]
struct StudentSlot {
    write: Mutex<()>,
    /// `None` until first loaded from the store.
    snapshot: RwLock<Option<Arc<StudentGraph>>>,
}

pub struct DiagnosisService<S: GraphStore> {
    store: S,
    artifacts: Arc<dyn ArtifactSource>,
    analyses: Arc<dyn AnalysisSource>,
    clock: Arc<dyn Clock>,
    extractor: EvidenceExtractor,
    resolver: GraphResolver,
    propagator: WeaknessPropagator,
    scheduler: ReviewScheduler,
    assembler: GraphAssembler,
    slots: DashMap<StudentId, Arc<StudentSlot>>,
}

impl<S: GraphStore> DiagnosisService<S> {
    /// Validate the config and build every pipeline stage from it.
    pub fn new(
        config: PipelineConfig,
        store: S,
        artifacts: Arc<dyn ArtifactSource>,
        analyses: Arc<dyn AnalysisSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let half_life = config.weakness.half_life();

        Ok(Self {
            store,
            artifacts,
            analyses,
            clock: Arc::new(SystemClock),
            extractor: EvidenceExtractor::new(config.extractor),
            resolver: GraphResolver::new(config.resolver)?,
            propagator: WeaknessPropagator::new(config.weakness),
            scheduler: ReviewScheduler::new(config.scheduler, half_life),
            assembler: GraphAssembler::new(config.assembler, half_life),
            slots: DashMap::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run the whole pipeline for one analyzed artifact.
    ///
    /// A failed analysis fetch still stores a record with verdict `error`.
    /// A storage failure leaves both the store and the visible graph as they
    /// were and is reported as retryable.
    pub fn record_diagnosis(&self, reference: ArtifactRef) -> DiagnosisResult<DiagnosisOutcome> {
        let artifact = self.artifacts.get_artifact(reference)?;
        let student = artifact.student;
        let _run = record_span!(student, reference).entered();
        let now = self.clock.now();

        let mut record = {
            let _stage = stage_span!(EXTRACT, student).entered();
            match self.analyses.get_analysis(&artifact) {
                Ok(raw) => self.extractor.extract(&artifact, &raw, now),
                Err(err) => {
                    warn!(error = %err, "analysis unavailable, storing error record");
                    self.extractor.error_record(&artifact, now)
                }
            }
        };

        let slot = self.slot(student);
        let _write = lock(&slot.write);
        let base = self.load_locked(&slot, student)?;
        let mut graph = StudentGraph::clone(&base);
        graph.begin_journal();

        let resolution = {
            let _stage = stage_span!(RESOLVE, student).entered();
            self.resolver
                .resolve(&mut graph, &mut record, artifact.chapter_hint.as_deref(), now)
        };
        graph.push_record(record.clone());

        let score_updates = {
            let _stage = stage_span!(PROPAGATE, student).entered();
            self.propagator.propagate(&mut graph, &record, now)
        };

        let reviews = {
            let _stage = stage_span!(SCHEDULE, student).entered();
            self.scheduler
                .schedule_record(&mut graph, &record, &score_updates, now)
        };

        let changes = graph.take_journal();
        self.store.commit(&changes)?;
        *write(&slot.snapshot) = Some(Arc::new(graph));

        info!(
            record = %record.id,
            verdict = %record.verdict,
            items = record.items.len(),
            resolved = resolution.resolved_count(),
            created = resolution.created.len(),
            anomalies = resolution.anomalies.len(),
            "diagnosis recorded"
        );

        Ok(DiagnosisOutcome {
            record,
            anomalies: resolution.anomalies,
            score_updates,
            reviews,
        })
    }

    /// Graph rooted at the anchor of the latest diagnosis of an artifact.
    pub fn generate_graph(
        &self,
        student: StudentId,
        source_type: SourceType,
        source_id: i64,
    ) -> DiagnosisResult<GraphView> {
        let artifact = ArtifactRef::new(source_type, source_id);
        let graph = self.snapshot(student)?;
        let root = graph
            .records_for_source(artifact)
            .rev()
            .find_map(|r| r.anchor_node)
            .ok_or(DiagnosisError::SourceNotDiagnosed { student, artifact })?;
        self.assemble_from(&graph, student, root)
    }

    /// Graph rooted at an arbitrary node.
    pub fn assemble_graph(&self, student: StudentId, root: NodeId) -> DiagnosisResult<GraphView> {
        let graph = self.snapshot(student)?;
        self.assemble_from(&graph, student, root)
    }

    /// The student's review queue, most urgent first.
    pub fn get_review_queue(&self, student: StudentId) -> DiagnosisResult<Vec<QueuedReview>> {
        let graph = self.snapshot(student)?;
        Ok(self.scheduler.queue(&graph, self.clock.now()))
    }

    /// Every record stored for an artifact, oldest first.
    pub fn diagnosis_history(
        &self,
        student: StudentId,
        artifact: ArtifactRef,
    ) -> DiagnosisResult<Vec<DiagnosisRecord>> {
        let graph = self.snapshot(student)?;
        Ok(graph.records_for_source(artifact).cloned().collect())
    }

    /// Record that the student reviewed `target`, pushing its next review out.
    pub fn mark_reviewed(&self, student: StudentId, target: ReviewTarget) -> DiagnosisResult<ReviewEntry> {
        let now = self.clock.now();
        let slot = self.slot(student);
        let _write = lock(&slot.write);
        let base = self.load_locked(&slot, student)?;

        let mut graph = StudentGraph::clone(&base);
        graph.begin_journal();
        let entry = self
            .scheduler
            .mark_reviewed(&mut graph, target, now)
            .ok_or(DiagnosisError::NotScheduled { student, target })?;

        self.store.commit(&graph.take_journal())?;
        *write(&slot.snapshot) = Some(Arc::new(graph));
        info!(student = %student, target = %target, streak = entry.review_streak, "review recorded");
        Ok(entry)
    }

    fn assemble_from(
        &self,
        graph: &StudentGraph,
        student: StudentId,
        root: NodeId,
    ) -> DiagnosisResult<GraphView> {
        let _stage = stage_span!(ASSEMBLE, student).entered();
        self.assembler
            .assemble(graph, root, self.clock.now())
            .ok_or(DiagnosisError::NodeNotFound { student, node: root })
    }

    fn slot(&self, student: StudentId) -> Arc<StudentSlot> {
        Arc::clone(&self.slots.entry(student).or_default())
    }

    /// Latest committed graph for a student, loading it on first use.
    fn snapshot(&self, student: StudentId) -> DiagnosisResult<Arc<StudentGraph>> {
        let slot = self.slot(student);
        let cached = read(&slot.snapshot).clone();
        if let Some(graph) = cached {
            return Ok(graph);
        }
        let _write = lock(&slot.write);
        self.load_locked(&slot, student)
    }

    /// Like [`snapshot`](Self::snapshot) for callers already holding the write mutex.
    fn load_locked(&self, slot: &StudentSlot, student: StudentId) -> DiagnosisResult<Arc<StudentGraph>> {
        let cached = read(&slot.snapshot).clone();
        if let Some(graph) = cached {
            return Ok(graph);
        }
        let graph = Arc::new(self.store.load_student(student)?);
        *write(&slot.snapshot) = Some(Arc::clone(&graph));
        Ok(graph)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
