pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::RunContext;
pub use error::{PipelineError, WorkflowError};
pub use progress::{
    NoopProgress, ProgressEvent, ProgressReporter, Stage, StageInfo, StoreProgress,
    FINALIZING_PERCENT, STAGE_TABLE,
};
pub use runner::{PipelineRunner, Workflow, WorkflowFactory};
