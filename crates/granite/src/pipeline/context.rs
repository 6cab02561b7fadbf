use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::sanitize::slugify;

const SUFFIX_LEN: usize = 6;
const MAX_DIR_ATTEMPTS: usize = 8;

/// State owned by the pipeline runner for one job.
#[derive(Debug)]
pub struct RunContext {
    pub job_id: String,
    /// Topic the video is about. Never changes during a run.
    pub topic: String,
    /// What the user asked for, when they typed anything.
    pub description: Option<String>,
    /// Uploaded source document, if any.
    pub source_file: Option<PathBuf>,
    /// Directory exclusively owned by this job.
    pub output_dir: PathBuf,
    /// 1-based number of the attempt in progress, 0 before the first.
    pub attempt: u32,
    /// Cancelled by the job's owner; checked between stages and while
    /// waiting to retry. A stage that is already running is allowed to finish.
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Creates the job's output directory under `output_root` and returns the
    /// context for it.
    ///
    /// The directory is named `<slug>_<YYYYmmdd_HHMMSS>_<6 hex>`. The leaf is
    /// created with `create_dir` so two jobs can never share it.
    pub fn create(
        output_root: &Path,
        job_id: &str,
        topic: &str,
        source_file: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<Self, StorageError> {
        std::fs::create_dir_all(output_root).map_err(|e| StorageError::CreateDirectory {
            path: output_root.to_path_buf(),
            source: e,
        })?;

        let mut last_error = None;
        for _ in 0..MAX_DIR_ATTEMPTS {
            let candidate = output_root.join(output_dir_name(topic, Local::now()));
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    log::debug!("Created job directory {}", candidate.display());
                    return Ok(Self {
                        job_id: job_id.to_string(),
                        topic: topic.to_string(),
                        description: None,
                        source_file,
                        output_dir: candidate,
                        attempt: 0,
                        cancel,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    log::debug!("Job directory {} exists, picking another", candidate.display());
                    last_error = Some((candidate, e));
                }
                Err(e) => {
                    return Err(StorageError::CreateDirectory {
                        path: candidate,
                        source: e,
                    })
                }
            }
        }

        let (path, source) = last_error.unwrap_or_else(|| {
            (
                output_root.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free directory name"),
            )
        });
        Err(StorageError::CreateDirectory { path, source })
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Name of a job directory for `topic` created at `now`.
pub fn output_dir_name(topic: &str, now: DateTime<Local>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        slugify(topic),
        now.format("%Y%m%d_%H%M%S"),
        &suffix[..SUFFIX_LEN]
    )
}

/// Topic for a request: the description when given, else the source file stem.
pub fn topic_for(description: Option<&str>, source_file: Option<&Path>) -> String {
    if let Some(desc) = description.map(str::trim).filter(|d| !d.is_empty()) {
        return desc.to_string();
    }
    source_file
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "video".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_output_dir_name_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = output_dir_name("Explain gravity", now);

        assert!(name.starts_with("explain-gravity_20240309_140507_"));
        let suffix = name.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_topic_same_second_gets_distinct_dirs() {
        let root = TempDir::new().unwrap();
        let a = RunContext::create(root.path(), "a", "explain gravity", None, CancellationToken::new());
        let b = RunContext::create(root.path(), "b", "explain gravity", None, CancellationToken::new());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.output_dir, b.output_dir);
        assert!(a.output_dir.is_dir());
        assert!(b.output_dir.is_dir());
        assert!(a.output_dir.starts_with(root.path()));
        assert_eq!(a.attempt, 0);
    }

    #[test]
    fn test_create_makes_missing_root() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("videos").join("2024");
        let ctx =
            RunContext::create(&nested, "job", "topic", None, CancellationToken::new()).unwrap();
        assert!(ctx.output_dir.starts_with(&nested));
    }

    #[test]
    fn test_topic_for() {
        assert_eq!(topic_for(Some("  gravity "), None), "gravity");
        assert_eq!(
            topic_for(Some("   "), Some(Path::new("/up/abc_lecture-notes.pdf"))),
            "abc_lecture-notes"
        );
        assert_eq!(topic_for(None, None), "video");
    }

    #[test]
    fn test_cancelling_token_marks_context() {
        let root = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let ctx =
            RunContext::create(root.path(), "job", "topic", None, token.child_token()).unwrap();

        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
