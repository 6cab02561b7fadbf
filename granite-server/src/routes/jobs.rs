//! Job queries and operations.

use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use granite::broadcast::{JobCounts, JobProgressEvent, JobRecord, JobStatus};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::io::ReaderStream;

use super::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

const SSE_BUFFER: usize = 32;
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobRecord>,
    pub counts: JobCounts,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: String,
    pub status: &'static str,
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<ApiResponse<JobListResponse>> {
    let store = state.manager.store();
    Json(ApiResponse::ok(JobListResponse {
        jobs: store.list(),
        counts: store.counts(),
    }))
}

/// GET /api/jobs/{id}
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<JobRecord> {
    let record = state.manager.store().get(&job_id)?;
    Ok((StatusCode::OK, Json(ApiResponse::ok(record))))
}

/// GET /api/jobs/{id}/video
///
/// Streams the finished video from disk.
pub async fn get_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.manager.store().get(&job_id)?;

    if record.status != JobStatus::Completed {
        return Err(ApiError::conflict(format!(
            "Job {} is {}, not completed",
            job_id, record.status
        )));
    }
    let path = record
        .output_path
        .map(PathBuf::from)
        .ok_or_else(|| ApiError::not_found(format!("Job {} has no output file", job_id)))?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        warn!("Output of job {} is unreadable: {}", job_id, e);
        ApiError::not_found(format!("Output file for job {} is no longer available", job_id))
    })?;

    let content_type = mime_guess::from_path(&path).first_or_octet_stream();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type.essence_str().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file_name),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}

/// POST /api/jobs/{id}/cancel
pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<CancelResponse> {
    state.manager.cancel(&job_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(CancelResponse {
            job_id,
            status: "cancelling",
        })),
    ))
}

/// GET /api/jobs/{id}/events
///
/// Streams the job's progress events until it reaches a terminal state. The
/// first event is always the job's current state.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    // Subscribe before reading the snapshot so no update falls in between.
    let mut events = state.manager.broadcaster().subscribe();
    let record = state.manager.store().get(&job_id)?;

    let (tx, rx) = mpsc::channel::<JobProgressEvent>(SSE_BUFFER);
    let snapshot = snapshot_event(&record);
    let finished = snapshot.is_terminal();

    tokio::spawn(async move {
        if tx.send(snapshot).await.is_err() || finished {
            return;
        }
        loop {
            match events.recv().await {
                Ok(event) if event.job_id == job_id => {
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() {
                        debug!("Event stream client for job {} went away", job_id);
                        break;
                    }
                    if terminal {
                        info!("Job {} finished, closing event stream", job_id);
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    warn!("Event stream for job {} lagged, missed {} events", job_id, n);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let sse = SseEvent::default()
            .event("progress")
            .json_data(&event)
            .unwrap_or_else(|e| SseEvent::default().event("error").data(e.to_string()));
        Ok(sse)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE)))
}

fn snapshot_event(record: &JobRecord) -> JobProgressEvent {
    match record.status {
        JobStatus::Completed => {
            JobProgressEvent::completed(&record.job_id, record.output_path.as_deref().unwrap_or_default())
        }
        JobStatus::Failed => JobProgressEvent::failed(
            &record.job_id,
            record.current_stage,
            record.progress,
            record.error.as_deref().unwrap_or_default(),
        ),
        status => {
            let mut event = JobProgressEvent::new(
                &record.job_id,
                record.current_stage,
                record.progress,
                &record.message,
            );
            event.status = status;
            event
        }
    }
}
