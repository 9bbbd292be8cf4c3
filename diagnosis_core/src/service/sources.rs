//! Inbound accessors for artifacts and their model analyses.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use study_model::{Artifact, ArtifactRef};

use crate::error::SourceError;

/// Fetches transcribed or OCR'd artifacts.
pub trait ArtifactSource: Send + Sync {
    fn get_artifact(&self, reference: ArtifactRef) -> Result<Artifact, SourceError>;
}

/// Fetches the analysis text already produced for an artifact.
pub trait AnalysisSource: Send + Sync {
    fn get_analysis(&self, artifact: &Artifact) -> Result<String, SourceError>;
}

/// Artifacts and analyses held in memory, for tests and local tooling.
#[derive(Default)]
pub struct MemorySources {
    artifacts: Mutex<HashMap<ArtifactRef, Artifact>>,
    analyses: Mutex<HashMap<ArtifactRef, Result<String, SourceError>>>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact together with the analysis returned for it.
    pub fn insert(&self, artifact: Artifact, analysis: impl Into<String>) {
        let reference = artifact.reference;
        lock(&self.analyses).insert(reference, Ok(analysis.into()));
        lock(&self.artifacts).insert(reference, artifact);
    }

    /// Register an artifact whose analysis fails with `error`.
    pub fn insert_failing(&self, artifact: Artifact, error: SourceError) {
        let reference = artifact.reference;
        lock(&self.analyses).insert(reference, Err(error));
        lock(&self.artifacts).insert(reference, artifact);
    }
}

impl ArtifactSource for MemorySources {
    fn get_artifact(&self, reference: ArtifactRef) -> Result<Artifact, SourceError> {
        lock(&self.artifacts)
            .get(&reference)
            .cloned()
            .ok_or(SourceError::NotFound(reference))
    }
}

impl AnalysisSource for MemorySources {
    fn get_analysis(&self, artifact: &Artifact) -> Result<String, SourceError> {
        lock(&self.analyses)
            .get(&artifact.reference)
            .cloned()
            .unwrap_or(Err(SourceError::NotFound(artifact.reference)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
