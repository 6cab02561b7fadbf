//! Test doubles shared by the workflow stage tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::llm::{LanguageModel, LlmError, Part};

/// Replays canned replies in order and records the text of every prompt.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, LlmError> {
        let text: Vec<String> = parts
            .into_iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t),
                Part::InlineData { .. } => None,
            })
            .collect();
        self.prompts.lock().unwrap().push(text.join("\n"));

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(LlmError::Request(message)),
            None => Err(LlmError::EmptyResponse { reason: None }),
        }
    }
}
