use std::ffi::OsStr;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::pipeline::{Stage, WorkflowError};
use crate::sanitize::redact_path;

use super::process::{run_command, ProcessError};

pub const REPORT_FILE: &str = "quality_report.json";

/// Anything smaller cannot hold a playable video.
pub const MIN_VIDEO_BYTES: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    /// The file looked sane but could not be probed.
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub verdict: Verdict,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub has_audio: bool,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Deserialize, Default)]
struct Probe {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Builds the report from ffprobe's JSON; a missing video stream is fatal.
fn report_from_probe(json: &str, file_size: u64) -> Result<QualityReport, WorkflowError> {
    let probe: Probe = serde_json::from_str(json)
        .map_err(|e| WorkflowError::fatal(Stage::Quality, format!("unreadable ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| WorkflowError::fatal(Stage::Quality, "output has no video stream"))?;

    Ok(QualityReport {
        verdict: Verdict::Passed,
        file_size,
        duration_secs: probe
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse().ok()),
        width: video.width,
        height: video.height,
        has_audio: probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
        checked_at: Utc::now(),
        notes: Vec::new(),
    })
}

fn partial(file_size: u64, note: String) -> QualityReport {
    QualityReport {
        verdict: Verdict::Partial,
        file_size,
        duration_secs: None,
        width: None,
        height: None,
        has_audio: false,
        checked_at: Utc::now(),
        notes: vec![note],
    }
}

/// Checks the composed video and writes [`REPORT_FILE`] next to it.
pub async fn check(video: &Path, render: &RenderConfig) -> Result<QualityReport, WorkflowError> {
    let file_size = std::fs::metadata(video)
        .map_err(|e| {
            WorkflowError::fatal(
                Stage::Quality,
                format!("cannot read {}: {}", redact_path(video), e),
            )
        })?
        .len();

    if file_size < MIN_VIDEO_BYTES {
        return Err(WorkflowError::fatal(
            Stage::Quality,
            format!("video is only {} bytes", file_size),
        ));
    }

    let args = [
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-print_format"),
        OsStr::new("json"),
        OsStr::new("-show_streams"),
        OsStr::new("-show_format"),
        video.as_os_str(),
    ];
    let report = match run_command(&render.ffprobe_binary, args, None, render.probe_timeout()).await {
        Ok(out) => report_from_probe(&out.stdout, file_size)?,
        Err(e @ ProcessError::NotFound { .. }) | Err(e @ ProcessError::TimedOut { .. }) => {
            warn!("Skipping stream checks: {}", e);
            partial(file_size, e.to_string())
        }
        Err(e) => return Err(WorkflowError::fatal(Stage::Quality, e.to_string())),
    };

    if let Some(dir) = video.parent() {
        let path = dir.join(REPORT_FILE);
        match serde_json::to_vec_pretty(&report) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&path, bytes) {
                    warn!("Could not write {}: {}", REPORT_FILE, e);
                }
            }
            Err(e) => warn!("Could not serialise quality report: {}", e),
        }
    }

    info!("Quality check {:?} ({} bytes)", report.verdict, report.file_size);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROBE: &str = r#"{
        "streams": [
            {"codec_type": "video", "width": 854, "height": 480},
            {"codec_type": "audio"}
        ],
        "format": {"duration": "61.200000"}
    }"#;

    fn no_ffprobe() -> RenderConfig {
        RenderConfig {
            ffprobe_binary: "granite-missing-ffprobe".to_string(),
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_report_from_probe() {
        let report = report_from_probe(PROBE, 5000).unwrap();
        assert_eq!(report.verdict, Verdict::Passed);
        assert_eq!(report.width, Some(854));
        assert_eq!(report.duration_secs, Some(61.2));
        assert!(report.has_audio);
    }

    #[test]
    fn test_audio_only_output_is_rejected() {
        let err = report_from_probe(r#"{"streams": [{"codec_type": "audio"}]}"#, 5000).unwrap_err();
        assert!(err.message.contains("no video stream"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_tiny_file_fails() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("final_video.mp4");
        std::fs::write(&video, vec![0u8; 10]).unwrap();

        let err = check(&video, &no_ffprobe()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Quality);
        assert!(err.message.contains("10 bytes"));
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = check(&dir.path().join("nope.mp4"), &no_ffprobe()).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_without_ffprobe_is_partial_pass() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("final_video.mp4");
        std::fs::write(&video, vec![0u8; 2048]).unwrap();

        let report = check(&video, &no_ffprobe()).await.unwrap();
        assert_eq!(report.verdict, Verdict::Partial);
        assert_eq!(report.file_size, 2048);

        let written: QualityReport =
            serde_json::from_slice(&std::fs::read(dir.path().join(REPORT_FILE)).unwrap()).unwrap();
        assert_eq!(written.verdict, Verdict::Partial);
    }
}
