//! Transient/fatal classification of stage failures and the backoff
//! schedule used between pipeline attempts.

pub mod backoff;
pub mod classifier;

pub use backoff::{backoff, RetryPolicy};
pub use classifier::{
    classify, is_transient, suggested_wait, ErrorKind, DAILY_QUOTA_FLOOR, SUGGESTED_WAIT_MARGIN,
    TRANSIENT_MARKERS,
};
