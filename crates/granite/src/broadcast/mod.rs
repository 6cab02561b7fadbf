//! Job tracking and real-time progress streaming.
//!
//! The store holds the authoritative record for each job; the broadcaster
//! fans the same updates out to live subscribers such as the SSE endpoint.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent, JobStage, JobStatus};
pub use job_store::{JobCounts, JobRecord, JobStore, JobStoreError, MemoryJobStore};
