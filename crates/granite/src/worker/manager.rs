use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use futures_util::FutureExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, JobStage, JobStore, JobStoreError};
use crate::error::WorkerError;
use crate::pipeline::{
    PipelineConfig, PipelineError, PipelineRunner, ProgressEvent, ProgressReporter,
    RunContext, StoreProgress, WorkflowFactory,
};

use super::job::GenerationRequest;

type CancelMap = Arc<RwLock<HashMap<String, CancellationToken>>>;

/// Accepts generation requests and runs each one on its own tokio task.
///
/// The job store holds the authoritative state; every change is also
/// published on the broadcaster.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    broadcaster: JobProgressBroadcaster,
    runner: Arc<PipelineRunner>,
    output_root: PathBuf,
    reset_on_retry: bool,
    cancels: CancelMap,
}

impl JobManager {
    pub fn new(
        config: PipelineConfig,
        factory: Arc<dyn WorkflowFactory>,
        store: Arc<dyn JobStore>,
        broadcaster: JobProgressBroadcaster,
    ) -> Self {
        let reset_on_retry = !config.policy.hold_progress;
        Self {
            store,
            broadcaster,
            runner: Arc::new(PipelineRunner::new(factory, config.policy)),
            output_root: config.output_root,
            reset_on_retry,
            cancels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &JobProgressBroadcaster {
        &self.broadcaster
    }

    /// Registers the job and starts it in the background.
    ///
    /// Returns the new job id without waiting for any work. Must be called
    /// from within a tokio runtime.
    pub fn submit(&self, request: GenerationRequest) -> Result<String, WorkerError> {
        if request.is_empty() {
            return Err(WorkerError::EmptyRequest);
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let description = request.description().unwrap_or_default().to_string();
        let source_name = request.source_name();

        self.store
            .create(&job_id, &description, source_name.as_deref())?;

        let cancel = CancellationToken::new();
        write_cancels(&self.cancels).insert(job_id.clone(), cancel.clone());

        self.broadcaster
            .send(JobProgressEvent::new(&job_id, JobStage::Queued, 0, "Queued"));

        info!(
            "Accepted job {} ({})",
            job_id,
            source_name.as_deref().unwrap_or("description only")
        );

        let task = JobTask {
            job_id: job_id.clone(),
            request,
            cancel,
            store: Arc::clone(&self.store),
            broadcaster: self.broadcaster.clone(),
            runner: Arc::clone(&self.runner),
            output_root: self.output_root.clone(),
            reset_on_retry: self.reset_on_retry,
            cancels: Arc::clone(&self.cancels),
        };
        tokio::spawn(task.run());

        Ok(job_id)
    }

    /// Asks a running job to stop at the next stage boundary or retry wait.
    pub fn cancel(&self, job_id: &str) -> Result<(), WorkerError> {
        let record = self.store.get(job_id).map_err(|e| match e {
            JobStoreError::NotFound(_) => WorkerError::UnknownJob(job_id.to_string()),
            other => WorkerError::Register(other),
        })?;
        if record.is_finished() {
            return Err(WorkerError::AlreadyFinished(job_id.to_string()));
        }

        match read_cancels(&self.cancels).get(job_id) {
            Some(flag) => {
                info!("Cancelling job {}", job_id);
                flag.cancel();
                Ok(())
            }
            // The task finished between the store lookup and now.
            None => Err(WorkerError::AlreadyFinished(job_id.to_string())),
        }
    }

    /// Signals every running job to stop.
    pub fn cancel_all(&self) {
        let cancels = read_cancels(&self.cancels);
        if !cancels.is_empty() {
            info!("Cancelling {} running job(s)", cancels.len());
        }
        for flag in cancels.values() {
            flag.cancel();
        }
    }

    /// Number of jobs whose task has not finished yet.
    pub fn active_jobs(&self) -> usize {
        read_cancels(&self.cancels).len()
    }
}

fn read_cancels(
    cancels: &CancelMap,
) -> std::sync::RwLockReadGuard<'_, HashMap<String, CancellationToken>> {
    match cancels.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Cancel map lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_cancels(
    cancels: &CancelMap,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CancellationToken>> {
    match cancels.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Cancel map lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "job task panicked".to_string()
    }
}

/// Everything one background job needs, moved into its task.
struct JobTask {
    job_id: String,
    request: GenerationRequest,
    cancel: CancellationToken,
    store: Arc<dyn JobStore>,
    broadcaster: JobProgressBroadcaster,
    runner: Arc<PipelineRunner>,
    output_root: PathBuf,
    reset_on_retry: bool,
    cancels: CancelMap,
}

impl JobTask {
    async fn run(self) {
        let reporter = StoreProgress::new(
            &self.job_id,
            Arc::clone(&self.store),
            self.broadcaster.clone(),
            self.reset_on_retry,
        );

        if let Err(e) = self.store.start(&self.job_id) {
            warn!("Job {} could not be started: {}", self.job_id, e);
            write_cancels(&self.cancels).remove(&self.job_id);
            return;
        }

        let topic = self.request.topic();

        match RunContext::create(
            &self.output_root,
            &self.job_id,
            &topic,
            self.request.source_file.clone(),
            self.cancel.clone(),
        )
        .map(|ctx| ctx.with_description(self.request.description().map(str::to_string)))
        {
            Ok(mut ctx) => {
                let outcome = AssertUnwindSafe(self.runner.run(&mut ctx, &reporter))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => debug!("Job {} ended with error: {}", self.job_id, e),
                    Err(panic) => {
                        let message = panic_message(&*panic);
                        error!("Job {} panicked: {}", self.job_id, message);
                        reporter.report(ProgressEvent::Failed {
                            error: format!("Internal error: {}", message),
                        });
                    }
                }
            }
            Err(e) => {
                let err = PipelineError::from(e);
                warn!("Job {} could not prepare its output directory: {}", self.job_id, err);
                reporter.report(ProgressEvent::Failed {
                    error: err.to_string(),
                });
            }
        }

        write_cancels(&self.cancels).remove(&self.job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{JobStatus, MemoryJobStore};
    use crate::retry::RetryPolicy;
    use crate::workflow::SimulatedWorkflowFactory;
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, factory: Arc<dyn WorkflowFactory>) -> JobManager {
        let config = PipelineConfig {
            output_root: dir.path().to_path_buf(),
            policy: RetryPolicy::default(),
        };
        JobManager::new(
            config,
            factory,
            Arc::new(MemoryJobStore::new()),
            JobProgressBroadcaster::default(),
        )
    }

    async fn wait_finished(manager: &JobManager, job_id: &str) -> crate::broadcast::JobRecord {
        for _ in 0..500 {
            let record = manager.store().get(job_id).unwrap();
            if record.is_finished() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(SimulatedWorkflowFactory::new()));

        let err = manager.submit(GenerationRequest::default()).unwrap_err();
        assert!(matches!(err, WorkerError::EmptyRequest));
        assert!(manager.store().list().is_empty());
    }

    #[tokio::test]
    async fn test_submit_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(SimulatedWorkflowFactory::new()));

        let job_id = manager
            .submit(GenerationRequest::from_description("explain gravity"))
            .unwrap();
        let record = wait_finished(&manager, &job_id).await;

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.description, "explain gravity");
        assert!(PathBuf::from(record.output_path.unwrap()).is_file());
        assert_eq!(manager.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unknown_and_finished() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(SimulatedWorkflowFactory::new()));

        assert!(matches!(
            manager.cancel("nope"),
            Err(WorkerError::UnknownJob(_))
        ));

        let job_id = manager
            .submit(GenerationRequest::from_description("x"))
            .unwrap();
        wait_finished(&manager, &job_id).await;
        assert!(matches!(
            manager.cancel(&job_id),
            Err(WorkerError::AlreadyFinished(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let dir = TempDir::new().unwrap();
        let factory =
            SimulatedWorkflowFactory::new().with_stage_delay(Duration::from_millis(200));
        let manager = manager(&dir, Arc::new(factory));

        let job_id = manager
            .submit(GenerationRequest::from_description("slow topic"))
            .unwrap();
        manager.cancel(&job_id).unwrap();

        let record = wait_finished(&manager, &job_id).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("Job cancelled"));
        assert!(record.output_path.is_none());
    }

    struct PanickingFactory;

    struct PanickingWorkflow;

    #[async_trait::async_trait]
    impl crate::pipeline::Workflow for PanickingWorkflow {
        async fn run_stage(
            &mut self,
            stage: crate::pipeline::Stage,
            _ctx: &RunContext,
        ) -> Result<(), crate::pipeline::WorkflowError> {
            if stage == crate::pipeline::Stage::Planning {
                panic!("lesson planner blew up");
            }
            Ok(())
        }

        fn output_path(&self) -> Option<PathBuf> {
            None
        }
    }

    impl WorkflowFactory for PanickingFactory {
        fn create(&self, _ctx: &RunContext) -> Box<dyn crate::pipeline::Workflow> {
            Box::new(PanickingWorkflow)
        }
    }

    #[tokio::test]
    async fn test_panicking_stage_fails_job() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, Arc::new(PanickingFactory));

        let job_id = manager
            .submit(GenerationRequest::from_description("explain gravity"))
            .unwrap();
        let record = wait_finished(&manager, &job_id).await;

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(
            record.error.as_deref(),
            Some("Internal error: lesson planner blew up")
        );
        assert!(record.output_path.is_none());

        for _ in 0..100 {
            if manager.active_jobs() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_output_root_fails_job() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let config = PipelineConfig {
            output_root: blocker,
            policy: RetryPolicy::default(),
        };
        let manager = JobManager::new(
            config,
            Arc::new(SimulatedWorkflowFactory::new()),
            Arc::new(MemoryJobStore::new()),
            JobProgressBroadcaster::default(),
        );

        let job_id = manager
            .submit(GenerationRequest::from_description("x"))
            .unwrap();
        let record = wait_finished(&manager, &job_id).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.unwrap().contains("Storage failed"));
    }
}
