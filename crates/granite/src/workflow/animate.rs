use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use log::{debug, info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::config::RenderConfig;
use crate::pipeline::{Stage, WorkflowError};

use super::llm::{LanguageModel, Part};
use super::plan::{strip_code_fences, LessonPlan};
use super::process::{run_command, ProcessError};
use super::prompts::{self, SCENE_CLASS};

/// Render failures handed back to the model for a corrected script before
/// the stage gives up.
pub const MAX_RENDER_FIXES: usize = 2;

const SCENE_FILE: &str = "scene.py";

/// Manim APIs that were renamed in the community edition.
const DEPRECATED_APIS: &[(&str, &str)] = &[
    ("ShowCreation", "Create"),
    ("TextMobject", "Text"),
    ("TexMobject", "MathTex"),
    ("get_graph_label", "get_x_axis_label"),
    ("get_graph", "plot"),
];

static RE_MISSING_MODULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"No module named '(\w+)'").unwrap());
static RE_MISSING_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"has no attribute '(\w+)'").unwrap());
static RE_UNDEFINED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"name '(\w+)' is not defined").unwrap());

/// Strips fences, ensures the manim import and rewrites deprecated APIs.
///
/// Returns the cleaned code and the list of rewrites applied.
pub fn prepare_code(raw: &str) -> (String, Vec<String>) {
    let mut code = strip_code_fences(raw).to_string();
    if !code.contains("from manim import") {
        code = format!("from manim import *\n\n{}", code);
    }

    let mut fixes = Vec::new();
    for (old, new) in DEPRECATED_APIS {
        if code.contains(old) {
            code = code.replace(old, new);
            fixes.push(format!("{} -> {}", old, new));
        }
    }
    (code, fixes)
}

pub fn validate_code(code: &str) -> Result<(), String> {
    if !code.contains(&format!("class {}", SCENE_CLASS)) {
        return Err(format!(
            "the Manim code must define a class named '{}' that inherits from Scene",
            SCENE_CLASS
        ));
    }
    if !code.contains("def construct") {
        return Err(format!("{} must have a 'construct' method", SCENE_CLASS));
    }
    Ok(())
}

/// Actionable hints for common Manim failures.
pub fn fix_suggestions(stderr: &str) -> Vec<String> {
    let mut suggestions = Vec::new();

    if let Some(caps) = RE_MISSING_MODULE.captures(stderr) {
        suggestions.push(format!(
            "Module '{}' is not installed. Use only 'from manim import *'.",
            &caps[1]
        ));
    }
    if let Some(caps) = RE_MISSING_ATTR.captures(stderr) {
        let attr = &caps[1];
        match DEPRECATED_APIS.iter().find(|(old, _)| *old == attr) {
            Some((_, new)) => suggestions.push(format!("'{}' is deprecated. Use '{}' instead.", attr, new)),
            None => suggestions.push(format!(
                "'{}' does not exist in Manim Community Edition.",
                attr
            )),
        }
    }
    if stderr.to_lowercase().contains("latex") || stderr.contains("FileNotFoundError") {
        suggestions.push(
            "LaTeX is not available. Replace every MathTex() and Tex() with Text(), \
             writing formulas in plain text with Unicode superscripts."
                .to_string(),
        );
    }
    if stderr.contains("TypeError") {
        suggestions.push(
            "Check call arguments: self.play() needs animations such as Create(obj) or FadeIn(obj), \
             and colours should be Manim constants."
                .to_string(),
        );
    }
    if let Some(caps) = RE_UNDEFINED_NAME.captures(stderr) {
        suggestions.push(format!(
            "'{}' is not defined. Create it before use.",
            &caps[1]
        ));
    }
    if stderr.contains("ValueError") {
        suggestions.push(
            "Check colour values, Axes x_range/y_range and array dimensions.".to_string(),
        );
    }
    suggestions
}

/// Path announced on manim's `File ready at` line, if it exists.
pub fn announced_output(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .filter_map(|line| line.split("File ready at").nth(1))
        .map(|rest| rest.trim().trim_matches(|c| c == '\'' || c == '"' || c == '.' || c == ' '))
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Most recently modified `.mp4` under `dir`.
pub fn newest_video(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("mp4"))
        })
        .max_by_key(|e| {
            e.metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        })
        .map(|e| e.into_path())
}

async fn render(scene_path: &Path, out_dir: &Path, render: &RenderConfig) -> Result<PathBuf, ProcessError> {
    let media_dir = out_dir.join("media");
    let quality_flag = format!("-q{}", render.quality);
    let args = [
        OsStr::new("render"),
        OsStr::new(&quality_flag),
        OsStr::new("--media_dir"),
        media_dir.as_os_str(),
        scene_path.as_os_str(),
        OsStr::new(SCENE_CLASS),
    ];

    let output = run_command(&render.manim_binary, args, Some(out_dir), render.render_timeout()).await?;

    if let Some(path) = announced_output(&output.stdout) {
        return Ok(path);
    }
    newest_video(&media_dir.join("videos")).ok_or_else(|| ProcessError::Failed {
        program: render.manim_binary.clone(),
        status: Some(0),
        stderr: "manim finished but no video file was found".to_string(),
    })
}

/// Asks the model for Manim code, renders it, and feeds render errors back
/// for up to [`MAX_RENDER_FIXES`] corrected versions.
pub async fn animate(
    plan: &LessonPlan,
    out_dir: &Path,
    render_config: &RenderConfig,
    llm: &dyn LanguageModel,
) -> Result<PathBuf, WorkflowError> {
    let plan_json = serde_json::to_string_pretty(plan)
        .map_err(|e| WorkflowError::fatal(Stage::Animation, e.to_string()))?;

    let mut prompt = prompts::animation(&plan_json);
    let mut last_error = String::new();

    for round in 0..=MAX_RENDER_FIXES {
        let reply = llm
            .generate(vec![Part::text(prompt.clone())])
            .await
            .map_err(|e| WorkflowError::new(Stage::Animation, e.to_string()))?;

        let (code, fixes) = prepare_code(&reply);
        if !fixes.is_empty() {
            debug!("Rewrote deprecated Manim APIs: {}", fixes.join(", "));
        }

        let failure = match validate_code(&code) {
            Err(problem) => problem,
            Ok(()) => {
                let scene_path = out_dir.join(SCENE_FILE);
                std::fs::write(&scene_path, &code).map_err(|e| {
                    WorkflowError::fatal(Stage::Animation, format!("cannot write {}: {}", SCENE_FILE, e))
                })?;

                match render(&scene_path, out_dir, render_config).await {
                    Ok(video) => {
                        info!("Rendered animation after {} fix round(s)", round);
                        return Ok(video);
                    }
                    // Not worth asking the model to fix these.
                    Err(e @ ProcessError::TimedOut { .. }) => {
                        return Err(WorkflowError::new(Stage::Animation, e.to_string()))
                    }
                    Err(e @ ProcessError::NotFound { .. }) | Err(e @ ProcessError::Spawn { .. }) => {
                        return Err(WorkflowError::fatal(Stage::Animation, e.to_string()))
                    }
                    Err(ProcessError::Failed { stderr, .. }) => stderr,
                }
            }
        };

        warn!("Animation attempt {} failed: {}", round + 1, failure.lines().last().unwrap_or(""));
        prompt = prompts::animation_fix(&code, &failure, &fix_suggestions(&failure));
        last_error = failure;
    }

    Err(WorkflowError::fatal(
        Stage::Animation,
        format!(
            "Manim rendering failed after {} fix attempts: {}",
            MAX_RENDER_FIXES,
            last_error.lines().last().unwrap_or("unknown error")
        ),
    ))
}
