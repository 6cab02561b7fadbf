use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::retry::RetryPolicy;
use crate::sanitize;

use super::context::RunContext;
use super::error::{PipelineError, WorkflowError};
use super::progress::{ProgressEvent, ProgressReporter, Stage};

/// One attempt's worth of the six-stage generation workflow.
///
/// A workflow may hold state between stages (extracted text, lesson plan,
/// rendered files) and is discarded after a failed attempt.
#[async_trait]
pub trait Workflow: Send {
    async fn run_stage(&mut self, stage: Stage, ctx: &RunContext) -> Result<(), WorkflowError>;

    /// Final video once every stage has succeeded.
    fn output_path(&self) -> Option<PathBuf>;
}

/// Builds a fresh [`Workflow`] for every attempt.
pub trait WorkflowFactory: Send + Sync {
    fn create(&self, ctx: &RunContext) -> Box<dyn Workflow>;
}

enum RunState {
    Attempting(u32),
    WaitingToRetry { attempt: u32, wait: Duration },
    Succeeded(PathBuf),
    Failed(PipelineError),
}

/// Drives a workflow to completion, retrying transient failures with backoff.
pub struct PipelineRunner {
    factory: Arc<dyn WorkflowFactory>,
    policy: RetryPolicy,
}

impl PipelineRunner {
    pub fn new(factory: Arc<dyn WorkflowFactory>, policy: RetryPolicy) -> Self {
        Self { factory, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs the pipeline for one job and returns the final video path.
    ///
    /// Reports `Completed` or `Failed` to `progress` before returning.
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        let span = info_span!("pipeline",
            job_id = %ctx.job_id,
            topic = %ctx.topic,
            source = %ctx
                .source_file
                .as_deref()
                .map(sanitize::redact_path)
                .unwrap_or_else(|| "none".to_string()),
        );
        self.drive(ctx, progress).instrument(span).await
    }

    async fn drive(
        &self,
        ctx: &mut RunContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = RunState::Attempting(1);

        loop {
            state = match state {
                RunState::Attempting(attempt) => {
                    ctx.attempt = attempt;
                    progress.report(ProgressEvent::AttemptStarted {
                        attempt,
                        max_attempts,
                    });

                    match self.attempt(ctx, progress).await {
                        Ok(path) => RunState::Succeeded(path),
                        Err(err) if err.is_transient() && attempt < max_attempts => {
                            let text = match &err {
                                PipelineError::Workflow { source, .. } => source.message.clone(),
                                other => other.to_string(),
                            };
                            let wait = self.policy.wait_before_next(attempt, &text);
                            warn!(
                                "Transient failure on attempt {}/{}: {}; retrying in {:?}",
                                attempt, max_attempts, err, wait
                            );
                            progress.report(ProgressEvent::Retrying {
                                attempt,
                                max_attempts,
                                wait,
                                error: err.to_string(),
                            });
                            RunState::WaitingToRetry { attempt, wait }
                        }
                        Err(err) => RunState::Failed(err),
                    }
                }
                RunState::WaitingToRetry { attempt, wait } => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => RunState::Attempting(attempt + 1),
                        _ = ctx.cancel.cancelled() => RunState::Failed(PipelineError::Cancelled),
                    }
                }
                RunState::Succeeded(path) => {
                    info!(
                        "Pipeline finished after {} attempt(s): {}",
                        ctx.attempt,
                        sanitize::redact_path(&path)
                    );
                    progress.report(ProgressEvent::Completed {
                        output_path: path.display().to_string(),
                    });
                    return Ok(path);
                }
                RunState::Failed(err) => {
                    error!("Pipeline failed after {} attempt(s): {}", ctx.attempt, err);
                    progress.report(ProgressEvent::Failed {
                        error: err.to_string(),
                    });
                    return Err(err);
                }
            };
        }
    }

    async fn attempt(
        &self,
        ctx: &RunContext,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, PipelineError> {
        let mut workflow = self.factory.create(ctx);

        for stage in Stage::ALL {
            if ctx.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let span = info_span!("stage", stage = stage.key(), attempt = ctx.attempt);
            workflow
                .run_stage(stage, ctx)
                .instrument(span)
                .await
                .map_err(|source| PipelineError::Workflow {
                    attempts: ctx.attempt,
                    source,
                })?;

            debug!("Stage {} completed", stage);
            progress.report(ProgressEvent::StageCompleted { stage });
        }

        progress.report(ProgressEvent::Finalizing);

        let path = workflow
            .output_path()
            .ok_or_else(|| PipelineError::MissingArtifact(ctx.output_dir.clone()))?;
        if !path.is_file() {
            return Err(PipelineError::MissingArtifact(path));
        }
        Ok(path)
    }
}
