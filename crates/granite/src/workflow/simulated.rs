//! Workflow that walks through the six stages without any external tools or
//! API calls. Used for demos and when no API key is configured.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;

use crate::pipeline::{RunContext, Stage, Workflow, WorkflowError, WorkflowFactory};

use super::media::PLAN_FILE;
use super::plan::{LessonPlan, Scene};

#[derive(Debug, Clone, Default)]
pub struct SimulatedWorkflowFactory {
    stage_delay: Duration,
}

impl SimulatedWorkflowFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause after each stage so progress is visible to clients.
    pub fn with_stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }
}

impl WorkflowFactory for SimulatedWorkflowFactory {
    fn create(&self, _ctx: &RunContext) -> Box<dyn Workflow> {
        Box::new(SimulatedWorkflow {
            stage_delay: self.stage_delay,
            output: None,
        })
    }
}

pub struct SimulatedWorkflow {
    stage_delay: Duration,
    output: Option<PathBuf>,
}

fn demo_plan(topic: &str) -> LessonPlan {
    let scene = |title: &str, narration: String| Scene {
        title: title.to_string(),
        narration,
        visual: String::new(),
        duration_seconds: 10.0,
    };
    LessonPlan {
        title: topic.to_string(),
        scenes: vec![
            scene("Introduction", format!("Today we explore {}.", topic)),
            scene("Key idea", format!("Here is the central idea behind {}.", topic)),
            scene("Summary", "Let's recap what we learned.".to_string()),
        ],
    }
}

fn write(stage: Stage, path: PathBuf, contents: impl AsRef<[u8]>) -> Result<PathBuf, WorkflowError> {
    std::fs::write(&path, contents)
        .map_err(|e| WorkflowError::fatal(stage, format!("cannot write {}: {}", path.display(), e)))?;
    Ok(path)
}

#[async_trait]
impl Workflow for SimulatedWorkflow {
    async fn run_stage(&mut self, stage: Stage, ctx: &RunContext) -> Result<(), WorkflowError> {
        match stage {
            Stage::Planning => {
                let json = serde_json::to_vec_pretty(&demo_plan(&ctx.topic))
                    .map_err(|e| WorkflowError::fatal(stage, e.to_string()))?;
                write(stage, ctx.output_dir.join(PLAN_FILE), json)?;
            }
            Stage::Composition => {
                let name = format!("demo_video_{}.txt", Local::now().format("%Y%m%d_%H%M%S"));
                let body = format!(
                    "Simulated video for \"{}\"\nJob: {}\nNo media was rendered.\n",
                    ctx.topic, ctx.job_id
                );
                self.output = Some(write(stage, ctx.output_dir.join(name), body)?);
            }
            _ => {}
        }

        if !self.stage_delay.is_zero() {
            tokio::time::sleep(self.stage_delay).await;
        }
        Ok(())
    }

    fn output_path(&self) -> Option<PathBuf> {
        self.output.clone()
    }
}
