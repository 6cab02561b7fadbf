//! Shared state handed to every request handler.

use std::path::PathBuf;
use std::sync::Arc;

use granite::worker::JobManager;

#[derive(Clone)]
pub struct AppState {
    /// Launches and cancels generation jobs; owns the job store.
    pub manager: Arc<JobManager>,
    /// Where uploaded source documents are saved before a job starts.
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(manager: Arc<JobManager>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            upload_dir: upload_dir.into(),
        }
    }
}
