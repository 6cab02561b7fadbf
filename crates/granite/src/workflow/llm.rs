//! Client for the generative-language API used by the extraction, planning
//! and animation stages.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use log::{debug, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider error bodies are kept short enough for job records and logs.
const MAX_ERROR_BODY_LENGTH: usize = 400;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Connection error talking to the generative API: {0}")]
    Connect(String),

    #[error("Generative API request timed out: {0}")]
    Timeout(String),

    #[error("Generative API request failed: {0}")]
    Request(String),

    #[error("Generative API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Generative API response could not be parsed: {0}")]
    Parse(String),

    #[error("Generative API returned no text{}", .reason.as_deref().map(|r| format!(" (finish reason: {})", r)).unwrap_or_default())]
    EmptyResponse { reason: Option<String> },
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout(e.to_string())
        } else if e.is_connect() {
            LlmError::Connect(e.to_string())
        } else if e.is_decode() {
            LlmError::Parse(e.to_string())
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

/// One piece of a multimodal prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Sends one user turn and returns the concatenated text reply.
    async fn generate(&self, parts: Vec<Part>) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

fn encode_parts(parts: Vec<Part>) -> Vec<RequestPart> {
    parts
        .into_iter()
        .map(|part| match part {
            Part::Text(text) => RequestPart::Text { text },
            Part::InlineData { mime_type, data } => RequestPart::Inline {
                inline_data: InlineData {
                    mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            },
        })
        .collect()
}

fn response_text(response: GenerateResponse) -> Result<String, LlmError> {
    let mut reason = None;
    for candidate in response.candidates {
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if !text.trim().is_empty() {
            return Ok(text);
        }
        reason = reason.or(candidate.finish_reason);
    }
    Err(LlmError::EmptyResponse { reason })
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() > MAX_ERROR_BODY_LENGTH {
        let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated)", cut)
    } else {
        body.to_string()
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, api_key: SecretString) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, parts: Vec<Part>) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: encode_parts(parts),
            }],
        };

        debug!("Calling generative model {}", self.model);

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Generative API returned {}", status);
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        response_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::is_transient;

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: encode_parts(vec![
                    Part::text("Describe this"),
                    Part::InlineData {
                        mime_type: "image/png".to_string(),
                        data: vec![1, 2, 3],
                    },
                ]),
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Describe this");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"world"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(response).unwrap(), "Hello, world");
    }

    #[test]
    fn test_empty_response_reports_reason() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        let err = response_text(response).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Generative API returned no text (finish reason: SAFETY)"
        );
    }

    #[test]
    fn test_error_classification() {
        let quota = LlmError::Api {
            status: 429,
            body: "RESOURCE_EXHAUSTED. Please retry in 20s".to_string(),
        };
        assert!(is_transient(&quota.to_string()));

        let bad_request = LlmError::Api {
            status: 400,
            body: "API key not valid".to_string(),
        };
        assert!(!is_transient(&bad_request.to_string()));

        assert!(is_transient(&LlmError::Connect("refused".to_string()).to_string()));
        assert!(is_transient(&LlmError::Timeout("slow".to_string()).to_string()));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(1000);
        assert!(truncate_body(&long).ends_with("... (truncated)"));
        assert_eq!(truncate_body("short"), "short");
    }
}
