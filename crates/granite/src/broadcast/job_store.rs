//! In-memory job store.
//!
//! Records live for the lifetime of the process only. A restart loses all
//! job history; jobs are short-lived "generate one video" requests and are
//! not worth persisting.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broadcast::job_progress::{JobStage, JobStatus};
use crate::sanitize::{truncate_for_display, MAX_DISPLAY_ERROR_LEN};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobStoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Job already finished: {0}")]
    AlreadyFinished(String),
}

/// A tracked job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    /// Free-text topic supplied by the user. Never changes.
    pub description: String,
    /// File name of the uploaded source document, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    pub status: JobStatus,
    pub current_stage: JobStage,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pipeline attempts started so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    fn new(job_id: &str, description: &str, source_name: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            description: description.to_string(),
            source_name: source_name.map(|s| s.to_string()),
            status: JobStatus::Queued,
            current_stage: JobStage::Queued,
            progress: 0,
            message: "Job queued".to_string(),
            output_path: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Identifier-keyed job records, written by one worker per job and read by
/// pollers.
pub trait JobStore: Send + Sync {
    /// Registers a new queued job.
    fn create(
        &self,
        job_id: &str,
        description: &str,
        source_name: Option<&str>,
    ) -> Result<JobRecord, JobStoreError>;

    fn get(&self, job_id: &str) -> Result<JobRecord, JobStoreError>;

    /// Moves a queued job to processing.
    fn start(&self, job_id: &str) -> Result<(), JobStoreError>;

    /// Records the start of pipeline attempt `attempt`. With `reset_progress`
    /// the displayed stage and progress return to the beginning.
    fn begin_attempt(
        &self,
        job_id: &str,
        attempt: u32,
        reset_progress: bool,
    ) -> Result<(), JobStoreError>;

    /// Advances stage and progress. Neither ever moves backwards.
    fn update_stage(
        &self,
        job_id: &str,
        stage: JobStage,
        progress: u8,
        message: &str,
    ) -> Result<(), JobStoreError>;

    /// Replaces only the message.
    fn note(&self, job_id: &str, message: &str) -> Result<(), JobStoreError>;

    fn complete(&self, job_id: &str, output_path: &str) -> Result<JobRecord, JobStoreError>;

    fn fail(&self, job_id: &str, error: &str) -> Result<JobRecord, JobStoreError>;

    /// All records, newest first.
    fn list(&self) -> Vec<JobRecord>;

    fn counts(&self) -> JobCounts;
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, JobRecord>,
    /// Insertion order, oldest first.
    order: Vec<String>,
}

/// [`JobStore`] backed by a `RwLock<HashMap>`.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Applies `f` to an in-flight record. Finished records are left alone
    /// and `Ok(false)` is returned.
    fn mutate_active<F>(&self, job_id: &str, op: &str, f: F) -> Result<bool, JobStoreError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut inner = self.write();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;

        if job.is_finished() {
            log::warn!(
                "Ignoring {} for job {} which is already {}",
                op,
                job_id,
                job.status
            );
            return Ok(false);
        }

        f(job);
        job.touch();
        Ok(true)
    }

    fn finish<F>(&self, job_id: &str, f: F) -> Result<JobRecord, JobStoreError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut inner = self.write();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;

        if job.is_finished() {
            return Err(JobStoreError::AlreadyFinished(job_id.to_string()));
        }

        f(job);
        let now = Utc::now();
        job.updated_at = now;
        job.finished_at = Some(now);
        Ok(job.clone())
    }
}

impl JobStore for MemoryJobStore {
    fn create(
        &self,
        job_id: &str,
        description: &str,
        source_name: Option<&str>,
    ) -> Result<JobRecord, JobStoreError> {
        let mut inner = self.write();
        if inner.jobs.contains_key(job_id) {
            return Err(JobStoreError::AlreadyExists(job_id.to_string()));
        }

        let record = JobRecord::new(job_id, description, source_name);
        inner.jobs.insert(job_id.to_string(), record.clone());
        inner.order.push(job_id.to_string());
        Ok(record)
    }

    fn get(&self, job_id: &str) -> Result<JobRecord, JobStoreError> {
        self.read()
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))
    }

    fn start(&self, job_id: &str) -> Result<(), JobStoreError> {
        let mut inner = self.write();
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;

        match job.status {
            JobStatus::Queued => {
                job.status = JobStatus::Processing;
                job.message = "Job started".to_string();
                job.touch();
                Ok(())
            }
            JobStatus::Processing => Ok(()),
            JobStatus::Completed | JobStatus::Failed => {
                Err(JobStoreError::AlreadyFinished(job_id.to_string()))
            }
        }
    }

    fn begin_attempt(
        &self,
        job_id: &str,
        attempt: u32,
        reset_progress: bool,
    ) -> Result<(), JobStoreError> {
        self.mutate_active(job_id, "attempt start", |job| {
            job.attempts = job.attempts.max(attempt);
            if reset_progress {
                job.current_stage = JobStage::Queued;
                job.progress = 0;
            }
        })
        .map(|_| ())
    }

    fn update_stage(
        &self,
        job_id: &str,
        stage: JobStage,
        progress: u8,
        message: &str,
    ) -> Result<(), JobStoreError> {
        self.mutate_active(job_id, "stage update", |job| {
            job.status = JobStatus::Processing;
            job.current_stage = job.current_stage.max(stage);
            job.progress = job.progress.max(progress.min(100));
            job.message = message.to_string();
        })
        .map(|_| ())
    }

    fn note(&self, job_id: &str, message: &str) -> Result<(), JobStoreError> {
        self.mutate_active(job_id, "note", |job| {
            job.message = message.to_string();
        })
        .map(|_| ())
    }

    fn complete(&self, job_id: &str, output_path: &str) -> Result<JobRecord, JobStoreError> {
        self.finish(job_id, |job| {
            job.status = JobStatus::Completed;
            job.current_stage = JobStage::Done;
            job.progress = 100;
            job.message = "Video generated successfully".to_string();
            job.output_path = Some(output_path.to_string());
            job.error = None;
        })
    }

    fn fail(&self, job_id: &str, error: &str) -> Result<JobRecord, JobStoreError> {
        self.finish(job_id, |job| {
            job.status = JobStatus::Failed;
            job.message = "Generation failed".to_string();
            job.error = Some(truncate_for_display(error, MAX_DISPLAY_ERROR_LEN));
            job.output_path = None;
        })
    }

    fn list(&self) -> Vec<JobRecord> {
        let inner = self.read();
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    fn counts(&self) -> JobCounts {
        let inner = self.read();
        let mut counts = JobCounts {
            total: inner.jobs.len(),
            ..JobCounts::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
