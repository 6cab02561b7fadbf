use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::progress::Stage;
use crate::retry::{classify, ErrorKind};

/// A stage failure, classified once at the point it is raised.
#[derive(Error, Debug, Clone)]
#[error("{stage} failed: {message}")]
pub struct WorkflowError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl WorkflowError {
    /// Classifies `message` by its transient markers.
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            stage,
            kind: classify(&message),
            message,
        }
    }

    /// A failure that must never be retried, whatever its text says.
    pub fn fatal(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: ErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{source}")]
    Workflow {
        attempts: u32,
        #[source]
        source: WorkflowError,
    },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Workflow finished but produced no video at {0}")]
    MissingArtifact(PathBuf),

    #[error("Storage failed: {0}")]
    Storage(#[from] crate::error::StorageError),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Workflow { source, .. } if source.is_transient())
    }
}
