//! Job submission.

use std::path::PathBuf;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use granite::sanitize::{redact_path, sanitize_filename};
use granite::worker::GenerationRequest;
use log::{debug, info};
use serde::Serialize;
use tokio::fs;

use super::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

/// Largest accepted multipart body.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: &'static str,
}

/// POST /api/generate
///
/// Multipart fields: `file` (optional document) and `concept` or
/// `description` (optional text). At least one must be present.
pub async fn generate(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<GenerateResponse> {
    let mut description: Option<String> = None;
    let mut source_file: Option<PathBuf> = None;
    let mut original_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(|n| n.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

                let Some(file_name) = file_name.filter(|n| !n.is_empty()) else {
                    continue;
                };
                if bytes.is_empty() {
                    debug!("Ignoring empty upload {}", file_name);
                    continue;
                }
                source_file = Some(save_upload(&state, &file_name, &bytes).await?);
                original_name = Some(file_name);
            }
            "concept" | "description" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", name, e)))?;
                if !text.trim().is_empty() {
                    description = Some(text);
                }
            }
            other => debug!("Ignoring unknown form field '{}'", other),
        }
    }

    let job_id = state.manager.submit(GenerationRequest {
        description,
        source_file,
        original_name,
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(GenerateResponse {
            job_id,
            status: "queued",
        })),
    ))
}

/// Saves an upload as `<uuid>_<sanitized name>` in the upload directory.
async fn save_upload(state: &AppState, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create upload directory: {}", e)))?;

    let stored_name = format!(
        "{}_{}",
        uuid::Uuid::new_v4().simple(),
        sanitize_filename(file_name)
    );
    let path = state.upload_dir.join(stored_name);

    fs::write(&path, bytes)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save upload: {}", e)))?;

    info!("Saved upload ({} bytes) to {}", bytes.len(), redact_path(&path));
    Ok(path)
}
