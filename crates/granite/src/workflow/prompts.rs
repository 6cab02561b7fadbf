//! Prompt text for the generative stages.

pub const SCENE_CLASS: &str = "GraniteScene";

pub fn extraction(description: Option<&str>, has_document: bool) -> String {
    let mut prompt = String::from(
        "Analyse the following input and extract the core educational content.\n\n",
    );
    if let Some(desc) = description.filter(|d| !d.trim().is_empty()) {
        prompt.push_str(&format!("USER REQUEST:\n{}\n\n", desc.trim()));
    }
    if has_document {
        prompt.push_str("The source material is attached or included below.\n\n");
    }
    prompt.push_str(
        "Produce a structured summary with clearly labelled sections:\n\
         - Topic\n\
         - Key Concepts (with short definitions)\n\
         - Formulas or relationships\n\
         - Visual Suggestions for an animation",
    );
    prompt
}

pub fn document_text(text: &str) -> String {
    format!("DOCUMENT TEXT:\n{}", text)
}

pub const IMAGE_TRANSCRIPTION: &str = "Extract all text content from this image. Include any \
    mathematical formulas, diagram descriptions, and educational content. Format clearly and \
    preserve structure.";

pub fn planning(summary: &str) -> String {
    format!(
        "Using the content summary below, create a lesson plan for a short animated \
         video (1-3 minutes) in the intuitive, minimalistic style of 3Blue1Brown.\n\n\
         CONTENT SUMMARY:\n{summary}\n\n\
         Respond with JSON only, no commentary, in exactly this shape:\n\
         {{\"title\": \"...\", \"scenes\": [{{\"title\": \"...\", \"narration\": \"exact words \
         the narrator says\", \"visual\": \"precise description of the animation\", \
         \"duration_seconds\": 20}}]}}\n\n\
         Use 3 to 6 scenes that build on each other logically."
    )
}

pub fn animation(plan_json: &str) -> String {
    format!(
        "Write complete, runnable Python code using the Manim Community Edition library \
         that animates this lesson plan:\n\n{plan_json}\n\n\
         REQUIREMENTS:\n\
         - Start with `from manim import *`.\n\
         - Define a class named `{SCENE_CLASS}` that inherits from `Scene`.\n\
         - Put all animations in its `construct(self)` method.\n\
         - Use Text() for all text. Do not use MathTex() or Tex(); LaTeX is not installed.\n\
         - Keep each scene roughly as long as its duration_seconds.\n\
         Respond with the code only, in a single ```python block."
    )
}

pub fn animation_fix(code: &str, error: &str, suggestions: &[String]) -> String {
    let mut prompt = format!(
        "This Manim code failed to render.\n\nCODE:\n```python\n{code}\n```\n\n\
         ERROR OUTPUT:\n{error}\n\n"
    );
    if !suggestions.is_empty() {
        prompt.push_str("FIX SUGGESTIONS:\n");
        for (i, s) in suggestions.iter().enumerate() {
            prompt.push_str(&format!("  {}. {}\n", i + 1, s));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Return the corrected, complete code defining `{SCENE_CLASS}`, in a single ```python block."
    ));
    prompt
}
