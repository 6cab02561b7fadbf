//! The real six-stage workflow: generative API, Manim, speech synthesis and
//! ffmpeg.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::config::{RenderConfig, TtsConfig};
use crate::pipeline::{RunContext, Stage, Workflow, WorkflowError, WorkflowFactory};

use super::animate::animate;
use super::compose::compose;
use super::extract::extract_content;
use super::llm::{LanguageModel, Part};
use super::narrate::{LmntClient, Narration, Narrator};
use super::plan::LessonPlan;
use super::prompts;
use super::quality;

pub const PLAN_FILE: &str = "lesson_plan.json";

/// Long-lived clients and settings shared by every attempt.
pub struct MediaToolkit {
    pub llm: Arc<dyn LanguageModel>,
    pub lmnt: Option<LmntClient>,
    pub tts: TtsConfig,
    pub render: RenderConfig,
}

pub struct MediaWorkflowFactory {
    toolkit: Arc<MediaToolkit>,
}

impl MediaWorkflowFactory {
    pub fn new(toolkit: MediaToolkit) -> Self {
        Self {
            toolkit: Arc::new(toolkit),
        }
    }
}

impl WorkflowFactory for MediaWorkflowFactory {
    fn create(&self, _ctx: &RunContext) -> Box<dyn Workflow> {
        Box::new(MediaWorkflow::new(Arc::clone(&self.toolkit)))
    }
}

/// Intermediate results of one attempt.
pub struct MediaWorkflow {
    toolkit: Arc<MediaToolkit>,
    summary: Option<String>,
    plan: Option<LessonPlan>,
    animation: Option<PathBuf>,
    narration: Option<Narration>,
    composed: Option<PathBuf>,
    checked: bool,
}

impl MediaWorkflow {
    pub fn new(toolkit: Arc<MediaToolkit>) -> Self {
        Self {
            toolkit,
            summary: None,
            plan: None,
            animation: None,
            narration: None,
            composed: None,
            checked: false,
        }
    }

    async fn plan_lesson(&self, summary: &str, ctx: &RunContext) -> Result<LessonPlan, WorkflowError> {
        let reply = self
            .toolkit
            .llm
            .generate(vec![Part::text(prompts::planning(summary))])
            .await
            .map_err(|e| WorkflowError::new(Stage::Planning, e.to_string()))?;

        let plan = LessonPlan::parse(&reply).map_err(|e| WorkflowError::fatal(Stage::Planning, e))?;

        let json = serde_json::to_vec_pretty(&plan)
            .map_err(|e| WorkflowError::fatal(Stage::Planning, e.to_string()))?;
        std::fs::write(ctx.output_dir.join(PLAN_FILE), json).map_err(|e| {
            WorkflowError::fatal(Stage::Planning, format!("cannot write {}: {}", PLAN_FILE, e))
        })?;

        debug!("Planned {} scenes for \"{}\"", plan.scenes.len(), plan.title);
        Ok(plan)
    }
}

/// Error for a stage run before the one that produces its input.
fn out_of_order(stage: Stage, missing: &str) -> WorkflowError {
    WorkflowError::fatal(stage, format!("{} is not available yet", missing))
}

#[async_trait]
impl Workflow for MediaWorkflow {
    async fn run_stage(&mut self, stage: Stage, ctx: &RunContext) -> Result<(), WorkflowError> {
        let toolkit = Arc::clone(&self.toolkit);
        match stage {
            Stage::Extraction => {
                let summary = extract_content(
                    ctx.description.as_deref(),
                    ctx.source_file.as_deref(),
                    &toolkit.render,
                    toolkit.llm.as_ref(),
                )
                .await?;
                self.summary = Some(summary);
            }
            Stage::Planning => {
                let summary = self
                    .summary
                    .clone()
                    .ok_or_else(|| out_of_order(stage, "content summary"))?;
                self.plan = Some(self.plan_lesson(&summary, ctx).await?);
            }
            Stage::Animation => {
                let plan = self.plan.as_ref().ok_or_else(|| out_of_order(stage, "lesson plan"))?;
                let video = animate(plan, &ctx.output_dir, &toolkit.render, toolkit.llm.as_ref()).await?;
                self.animation = Some(video);
            }
            Stage::Narration => {
                let plan = self.plan.as_ref().ok_or_else(|| out_of_order(stage, "lesson plan"))?;
                let narrator = Narrator {
                    tts: &toolkit.tts,
                    render: &toolkit.render,
                    lmnt: toolkit.lmnt.as_ref(),
                };
                self.narration = Some(narrator.narrate(plan, &ctx.output_dir).await?);
            }
            Stage::Composition => {
                let video = self
                    .animation
                    .as_ref()
                    .ok_or_else(|| out_of_order(stage, "animation"))?;
                let audio = self
                    .narration
                    .as_ref()
                    .ok_or_else(|| out_of_order(stage, "narration"))?;
                let composed = compose(video, &audio.audio_path, &ctx.output_dir, &toolkit.render).await?;
                self.composed = Some(composed);
            }
            Stage::Quality => {
                let video = self
                    .composed
                    .as_ref()
                    .ok_or_else(|| out_of_order(stage, "composed video"))?;
                quality::check(video, &toolkit.render).await?;
                self.checked = true;
            }
        }
        Ok(())
    }

    fn output_path(&self) -> Option<PathBuf> {
        self.composed.clone().filter(|_| self.checked)
    }
}
