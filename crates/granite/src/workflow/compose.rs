use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::RenderConfig;
use crate::pipeline::{Stage, WorkflowError};

use super::process::{run_command, ProcessError};

pub const FINAL_VIDEO: &str = "final_video.mp4";

/// Muxes the rendered animation with the narration track.
///
/// The video stream is copied; audio is re-encoded to AAC and the output is
/// cut to the shorter of the two inputs.
pub async fn compose(
    video: &Path,
    audio: &Path,
    out_dir: &Path,
    render: &RenderConfig,
) -> Result<PathBuf, WorkflowError> {
    let output = out_dir.join(FINAL_VIDEO);
    let args = [
        OsStr::new("-y"),
        OsStr::new("-i"),
        video.as_os_str(),
        OsStr::new("-i"),
        audio.as_os_str(),
        OsStr::new("-c:v"),
        OsStr::new("copy"),
        OsStr::new("-c:a"),
        OsStr::new("aac"),
        OsStr::new("-shortest"),
        output.as_os_str(),
    ];

    run_command(&render.ffmpeg_binary, args, Some(out_dir), render.compose_timeout())
        .await
        .map_err(|e| match e {
            ProcessError::TimedOut { .. } => WorkflowError::new(Stage::Composition, e.to_string()),
            _ => WorkflowError::fatal(Stage::Composition, e.to_string()),
        })?;

    if !output.is_file() {
        return Err(WorkflowError::fatal(
            Stage::Composition,
            format!("ffmpeg did not produce {}", FINAL_VIDEO),
        ));
    }
    info!("Composed {}", FINAL_VIDEO);
    Ok(output)
}
