//! Test harness for isolated job execution.
//!
//! Every harness owns a temporary output root and a fresh job manager, so
//! tests never share state.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use granite::broadcast::{JobProgressBroadcaster, JobRecord, MemoryJobStore};
use granite::pipeline::{PipelineConfig, WorkflowFactory};
use granite::retry::RetryPolicy;
use granite::worker::{GenerationRequest, JobManager};

pub struct JobHarness {
    temp_dir: TempDir,
    /// Root under which each job gets its own directory.
    pub output_root: PathBuf,
    pub manager: JobManager,
}

impl JobHarness {
    /// Harness with a fast retry policy: three attempts, 50 ms base wait.
    pub fn new(factory: impl WorkflowFactory + 'static) -> Self {
        Self::with_policy(factory, fast_policy())
    }

    pub fn with_policy(factory: impl WorkflowFactory + 'static, policy: RetryPolicy) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output_root = temp_dir.path().join("output_videos");

        let manager = JobManager::new(
            PipelineConfig {
                output_root: output_root.clone(),
                policy,
            },
            Arc::new(factory),
            Arc::new(MemoryJobStore::new()),
            JobProgressBroadcaster::default(),
        );

        Self {
            temp_dir,
            output_root,
            manager,
        }
    }

    pub fn submit(&self, description: &str) -> String {
        self.manager
            .submit(GenerationRequest::from_description(description))
            .expect("Failed to submit job")
    }

    pub fn get(&self, job_id: &str) -> JobRecord {
        self.manager.store().get(job_id).expect("Job not found")
    }

    /// Polls until the job is completed or failed.
    pub async fn wait_finished(&self, job_id: &str) -> JobRecord {
        self.wait_until(job_id, |r| r.is_finished()).await
    }

    /// Polls until `predicate` holds for the job record, for at most 10 s.
    pub async fn wait_until<F>(&self, job_id: &str, predicate: F) -> JobRecord
    where
        F: Fn(&JobRecord) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let record = self.get(job_id);
            if predicate(&record) {
                return record;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Timed out waiting on job {}: {:?}", job_id, record);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Job directories created under the output root.
    pub fn job_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.output_root)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect()
            })
            .unwrap_or_default();
        dirs.sort();
        dirs
    }
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_wait: Duration::from_millis(50),
        max_wait: Duration::from_secs(1),
        hold_progress: true,
    }
}
