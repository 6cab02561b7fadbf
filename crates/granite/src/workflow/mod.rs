//! Stage implementations behind the pipeline runner.

pub mod animate;
pub mod compose;
pub mod extract;
pub mod llm;
pub mod media;
pub mod narrate;
pub mod plan;
pub mod process;
pub mod prompts;
pub mod quality;
pub mod simulated;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::config::{Credentials, Settings};
use crate::error::ConfigError;
use crate::pipeline::WorkflowFactory;

pub use llm::{GeminiClient, LanguageModel, LlmError, Part};
pub use media::{MediaToolkit, MediaWorkflow, MediaWorkflowFactory};
pub use plan::{LessonPlan, Scene};
pub use process::ProcessError;
pub use simulated::{SimulatedWorkflow, SimulatedWorkflowFactory};

/// Pause between simulated stages so clients can watch progress move.
pub const SIMULATED_STAGE_DELAY: Duration = Duration::from_millis(800);

/// Picks the workflow for real or simulated runs.
pub fn build_factory(
    settings: &Settings,
    credentials: &Credentials,
) -> Result<Arc<dyn WorkflowFactory>, ConfigError> {
    if settings.simulate {
        info!("Simulate mode: no external tools or APIs will be called");
        return Ok(Arc::new(
            SimulatedWorkflowFactory::new().with_stage_delay(SIMULATED_STAGE_DELAY),
        ));
    }

    credentials.require_ai_key(settings)?;
    let api_key = credentials.gemini.clone().ok_or_else(|| {
        ConfigError::MissingCredential("no generative API key resolved".to_string())
    })?;

    let llm = GeminiClient::new(&settings.llm, api_key).map_err(|e| ConfigError::Validation {
        message: e.to_string(),
    })?;

    let lmnt = match credentials.lmnt.clone() {
        Some(key) => match narrate::LmntClient::new(&settings.tts, key) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("LMNT disabled: {}", e);
                None
            }
        },
        None => None,
    };

    info!(
        "Using model {} (premium narration {})",
        settings.llm.model,
        if lmnt.is_some() { "on" } else { "off" }
    );

    Ok(Arc::new(MediaWorkflowFactory::new(MediaToolkit {
        llm: Arc::new(llm),
        lmnt,
        tts: settings.tts.clone(),
        render: settings.render.clone(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_real_run_requires_key() {
        let settings = Settings::default();
        let result = build_factory(&settings, &Credentials::default());
        assert!(matches!(result, Err(ConfigError::MissingCredential(_))));
    }

    #[test]
    fn test_simulate_needs_no_key() {
        let settings = Settings {
            simulate: true,
            ..Settings::default()
        };
        assert!(build_factory(&settings, &Credentials::default()).is_ok());
    }

    #[test]
    fn test_real_factory_with_key() {
        let credentials = Credentials {
            gemini: Some(SecretString::from("key".to_string())),
            lmnt: None,
        };
        assert!(build_factory(&Settings::default(), &credentials).is_ok());
    }
}
