//! Scripted workflows for driving the pipeline through known failure paths.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use granite::pipeline::{RunContext, Stage, Workflow, WorkflowError, WorkflowFactory};

/// Builds workflows that fail the first `failures` attempts at one stage and
/// then succeed, writing `video.mp4` into the job directory.
pub struct ScriptedFactory {
    failures: u32,
    fail_stage: Stage,
    message: String,
    stage_delay: Duration,
    panic_at: Option<Stage>,
    attempts: Arc<AtomicU32>,
}

impl ScriptedFactory {
    /// A workflow that always succeeds.
    pub fn new() -> Self {
        Self {
            failures: 0,
            fail_stage: Stage::Animation,
            message: String::new(),
            stage_delay: Duration::ZERO,
            panic_at: None,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fail the first `count` attempts at `stage` with `message`.
    pub fn failing(mut self, count: u32, stage: Stage, message: &str) -> Self {
        self.failures = count;
        self.fail_stage = stage;
        self.message = message.to_string();
        self
    }

    pub fn stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }

    /// Panic instead of returning when `stage` runs.
    pub fn panicking_at(mut self, stage: Stage) -> Self {
        self.panic_at = Some(stage);
        self
    }

    /// Counter of attempts created so far, shared with the factory.
    pub fn attempts(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }
}

impl WorkflowFactory for ScriptedFactory {
    fn create(&self, _ctx: &RunContext) -> Box<dyn Workflow> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Box::new(ScriptedWorkflow {
            fail_with: (attempt <= self.failures).then(|| (self.fail_stage, self.message.clone())),
            stage_delay: self.stage_delay,
            panic_at: self.panic_at,
            output: None,
        })
    }
}

struct ScriptedWorkflow {
    fail_with: Option<(Stage, String)>,
    stage_delay: Duration,
    panic_at: Option<Stage>,
    output: Option<PathBuf>,
}

#[async_trait]
impl Workflow for ScriptedWorkflow {
    async fn run_stage(&mut self, stage: Stage, ctx: &RunContext) -> Result<(), WorkflowError> {
        if !self.stage_delay.is_zero() {
            tokio::time::sleep(self.stage_delay).await;
        }
        if self.panic_at == Some(stage) {
            panic!("{} stage panicked", stage);
        }
        if let Some((fail_stage, message)) = &self.fail_with {
            if *fail_stage == stage {
                return Err(WorkflowError::new(stage, message.clone()));
            }
        }
        if stage == Stage::Composition {
            let path = ctx.output_dir.join("video.mp4");
            std::fs::write(&path, b"not really a video").map_err(|e| {
                WorkflowError::fatal(stage, e.to_string())
            })?;
            self.output = Some(path);
        }
        Ok(())
    }

    fn output_path(&self) -> Option<PathBuf> {
        self.output.clone()
    }
}
