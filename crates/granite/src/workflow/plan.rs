use serde::{Deserialize, Serialize};

/// Planned duration for a scene that does not state one.
const DEFAULT_SCENE_SECS: f64 = 10.0;

/// Longest duration accepted for a single scene.
pub const MAX_SCENE_SECS: f64 = 120.0;

/// Upper bound on the whole lesson, whatever the scenes add up to.
pub const MAX_TOTAL_SECS: f64 = 600.0;

/// Scene-by-scene plan for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonPlan {
    pub title: String,
    pub scenes: Vec<Scene>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub title: String,
    /// Exact words the narrator says during the scene.
    pub narration: String,
    /// What the animation shows.
    #[serde(default)]
    pub visual: String,
    #[serde(default = "default_scene_secs")]
    pub duration_seconds: f64,
}

fn default_scene_secs() -> f64 {
    DEFAULT_SCENE_SECS
}

impl LessonPlan {
    /// Parses a plan from model output, tolerating markdown fences and prose
    /// around the JSON object.
    pub fn parse(text: &str) -> Result<Self, String> {
        let body = strip_code_fences(text);
        let json = extract_json_object(body).unwrap_or(body);

        let mut plan: LessonPlan =
            serde_json::from_str(json).map_err(|e| format!("lesson plan is not valid JSON: {}", e))?;

        if plan.scenes.is_empty() {
            return Err("lesson plan has no scenes".to_string());
        }
        if plan.scenes.iter().all(|s| s.narration.trim().is_empty()) {
            return Err("lesson plan has no narration".to_string());
        }
        for scene in &mut plan.scenes {
            scene.duration_seconds = clamp_scene_secs(scene.duration_seconds);
        }
        Ok(plan)
    }

    /// All scene narrations as one continuous script.
    pub fn narration_script(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.narration.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Planned length of the lesson, capped at [`MAX_TOTAL_SECS`].
    pub fn total_duration_secs(&self) -> f64 {
        let total: f64 = self
            .scenes
            .iter()
            .map(|s| clamp_scene_secs(s.duration_seconds))
            .sum();
        total.min(MAX_TOTAL_SECS)
    }
}

fn clamp_scene_secs(secs: f64) -> f64 {
    if secs.is_finite() && secs > 0.0 {
        secs.min(MAX_SCENE_SECS)
    } else {
        DEFAULT_SCENE_SECS
    }
}

/// Returns the body of the first fenced code block, or the trimmed input
/// when there is none.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after_fence = &trimmed[start + 3..];
    // skip the language tag line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];

    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
