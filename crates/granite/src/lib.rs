pub mod broadcast;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod sanitize;
pub mod secrets;
pub mod worker;
pub mod workflow;

pub use broadcast::{
    JobCounts, JobProgressBroadcaster, JobProgressEvent, JobRecord, JobStage, JobStatus, JobStore,
    JobStoreError, MemoryJobStore,
};
pub use config::{load_settings, Credentials, Settings};
pub use error::{ConfigError, StorageError, WorkerError};
pub use pipeline::{PipelineConfig, PipelineError, PipelineRunner, RunContext, Stage, WorkflowError};
pub use retry::{classify, is_transient, ErrorKind, RetryPolicy};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use worker::{GenerationRequest, JobManager};
pub use workflow::build_factory;
