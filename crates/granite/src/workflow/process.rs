//! Bounded invocation of external tools (manim, ffmpeg, ffprobe, ...).

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Keep only the end of long tool output; the actual error is usually last.
const MAX_STDERR_CHARS: usize = 3000;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Program '{program}' not found. Make sure it is installed and on PATH")]
    NotFound { program: String },

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("'{program}' exited with {}: {stderr}", describe_status(.status))]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no status (killed by signal)".to_string(),
    }
}

impl ProcessError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessError::NotFound { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program` with `args`, killing it if it outlives `timeout`.
///
/// A non-zero exit status is an error carrying the tail of stderr.
pub async fn run_command<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    log::debug!("Running {} (timeout {}s)", program, timeout.as_secs());

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProcessError::NotFound {
                program: program.to_string(),
            })
        }
        Ok(Err(e)) => {
            return Err(ProcessError::Spawn {
                program: program.to_string(),
                source: e,
            })
        }
        Err(_) => {
            return Err(ProcessError::TimedOut {
                program: program.to_string(),
                timeout,
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ProcessError::Failed {
            program: program.to_string(),
            status: output.status.code(),
            stderr: tail(&stderr, MAX_STDERR_CHARS),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.trim().to_string();
    }
    text.chars().skip(count - max_chars).collect::<String>().trim().to_string()
}
