//! Error taxonomy for the diagnosis pipeline.
//!
//! Malformed model output and resolution conflicts are recovered inside the
//! pipeline and never show up here. What remains is what a caller must act on.

use study_model::{ArtifactRef, NodeId, StudentId};

use crate::scheduler::ReviewTarget;

pub type DiagnosisResult<T> = Result<T, DiagnosisError>;

/// Errors surfaced to callers of the service façade.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("artifact {artifact} not found")]
    ArtifactNotFound { artifact: ArtifactRef },

    #[error("no diagnosis recorded for artifact {artifact} of student {student}")]
    SourceNotDiagnosed {
        student: StudentId,
        artifact: ArtifactRef,
    },

    #[error("node {node} not found in graph of student {student}")]
    NodeNotFound { student: StudentId, node: NodeId },

    #[error("{target} has no review scheduled for student {student}")]
    NotScheduled {
        student: StudentId,
        target: ReviewTarget,
    },

    #[error("artifact source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("storage failure (retryable: {retryable}): {source}")]
    Storage {
        #[source]
        source: StoreError,
        retryable: bool,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DiagnosisError {
    /// Whether this is one of the "not found" outcomes of a read.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DiagnosisError::ArtifactNotFound { .. }
                | DiagnosisError::SourceNotDiagnosed { .. }
                | DiagnosisError::NodeNotFound { .. }
                | DiagnosisError::NotScheduled { .. }
        )
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            DiagnosisError::Storage { retryable, .. } => *retryable,
            DiagnosisError::SourceUnavailable(_) => true,
            _ => false,
        }
    }
}

impl From<StoreError> for DiagnosisError {
    fn from(source: StoreError) -> Self {
        let retryable = source.is_transient();
        DiagnosisError::Storage { source, retryable }
    }
}

impl From<SourceError> for DiagnosisError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(artifact) => DiagnosisError::ArtifactNotFound { artifact },
            SourceError::Unavailable(reason) => DiagnosisError::SourceUnavailable(reason),
        }
    }
}

/// Persistence-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode or decode stored value: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("corrupt row in {table}: {details}")]
    Corrupt { table: &'static str, details: String },

    #[error("migration to version {version} failed: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("commit rejected: {0}")]
    CommitRejected(String),
}

impl StoreError {
    /// Corrupt rows and failed migrations do not heal on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Sqlite(_) | StoreError::CommitRejected(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the inbound artifact and analysis accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("{0} not found")]
    NotFound(ArtifactRef),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid chapter pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
