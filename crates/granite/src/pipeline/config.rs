use std::path::PathBuf;

use crate::config::Settings;
use crate::retry::RetryPolicy;

pub struct PipelineConfig {
    /// Root under which every job gets its own directory.
    pub output_root: PathBuf,
    pub policy: RetryPolicy,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            output_root: PathBuf::from(&settings.output_directory),
            policy: RetryPolicy::from(&settings.retry),
        }
    }
}
