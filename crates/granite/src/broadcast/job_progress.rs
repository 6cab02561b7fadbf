//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Stage a job is currently in, as shown to clients.
///
/// Ordered: a job's stage only ever moves forward through this list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Extraction,
    Planning,
    Animation,
    Narration,
    Composition,
    Quality,
    Done,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Queued => write!(f, "Queued"),
            JobStage::Extraction => write!(f, "Extraction"),
            JobStage::Planning => write!(f, "Planning"),
            JobStage::Animation => write!(f, "Animation"),
            JobStage::Narration => write!(f, "Narration"),
            JobStage::Composition => write!(f, "Composition"),
            JobStage::Quality => write!(f, "Quality"),
            JobStage::Done => write!(f, "Done"),
        }
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Unique job identifier.
    pub job_id: String,
    pub stage: JobStage,
    pub status: JobStatus,
    /// Overall progress, 0 to 100.
    pub progress: u8,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Final video path (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    /// Creates an in-flight progress event.
    pub fn new(job_id: &str, stage: JobStage, progress: u8, message: &str) -> Self {
        let status = if stage == JobStage::Queued && progress == 0 {
            JobStatus::Queued
        } else {
            JobStatus::Processing
        };

        Self {
            job_id: job_id.to_string(),
            stage,
            status,
            progress: progress.min(100),
            message: message.to_string(),
            timestamp: Utc::now(),
            output_path: None,
            error: None,
        }
    }

    /// Creates a completion event.
    pub fn completed(job_id: &str, output_path: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: JobStage::Done,
            status: JobStatus::Completed,
            progress: 100,
            message: "Video generated successfully".to_string(),
            timestamp: Utc::now(),
            output_path: Some(output_path.to_string()),
            error: None,
        }
    }

    /// Creates a failure event. `progress` is the last known value.
    pub fn failed(job_id: &str, stage: JobStage, progress: u8, error: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage,
            status: JobStatus::Failed,
            progress,
            message: "Generation failed".to_string(),
            timestamp: Utc::now(),
            output_path: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_finished()
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
