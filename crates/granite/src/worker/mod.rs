pub mod job;
pub mod manager;

pub use job::GenerationRequest;
pub use manager::JobManager;
