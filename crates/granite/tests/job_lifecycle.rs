//! End-to-end job lifecycle tests: submission, retries, failure and the
//! records a polling client would see.

mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use granite::broadcast::{JobStage, JobStatus};
use granite::pipeline::Stage;
use granite::retry::RetryPolicy;

use common::{JobHarness, ScriptedFactory};

#[tokio::test]
async fn test_explain_gravity() {
    let harness =
        JobHarness::new(ScriptedFactory::new().stage_delay(Duration::from_millis(100)));

    let job_id = harness.submit("explain gravity");

    let record = harness.get(&job_id);
    assert!(matches!(record.status, JobStatus::Queued | JobStatus::Processing));
    assert_eq!(record.progress, 0);
    assert!(matches!(
        record.current_stage,
        JobStage::Queued | JobStage::Extraction
    ));

    let record = harness.wait_finished(&job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.current_stage, JobStage::Done);
    assert!(record.error.is_none());

    let output = PathBuf::from(record.output_path.expect("output path"));
    assert!(output.is_file());
    let job_dirs = harness.job_dirs();
    assert_eq!(job_dirs.len(), 1);
    assert_eq!(output.parent(), Some(job_dirs[0].as_path()));
    assert!(job_dirs[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("explain-gravity_"));
}

#[tokio::test]
async fn test_identical_concurrent_submissions_do_not_collide() {
    let harness = JobHarness::new(ScriptedFactory::new());

    let first = harness.submit("explain gravity");
    let second = harness.submit("explain gravity");
    assert_ne!(first, second);

    let a = harness.wait_finished(&first).await;
    let b = harness.wait_finished(&second).await;
    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(b.status, JobStatus::Completed);

    let dir_a = PathBuf::from(a.output_path.unwrap()).parent().unwrap().to_path_buf();
    let dir_b = PathBuf::from(b.output_path.unwrap()).parent().unwrap().to_path_buf();
    assert_ne!(dir_a, dir_b);
    assert_eq!(harness.job_dirs().len(), 2);
}

#[tokio::test]
async fn test_two_transient_failures_then_success() {
    let factory = ScriptedFactory::new().failing(2, Stage::Narration, "503 Service Unavailable");
    let attempts = factory.attempts();
    let harness = JobHarness::new(factory);

    let job_id = harness.submit("orbits");
    let record = harness.wait_finished(&job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
    assert!(record.output_path.is_some());
    assert_eq!(record.attempts, 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_wait_is_visible_to_pollers() {
    let policy = RetryPolicy {
        base_wait: Duration::from_millis(400),
        ..common::harness::fast_policy()
    };
    let harness = JobHarness::with_policy(
        ScriptedFactory::new().failing(1, Stage::Planning, "connection reset by peer"),
        policy,
    );

    let job_id = harness.submit("waves");
    let waiting = harness
        .wait_until(&job_id, |r| r.message.contains("before retry"))
        .await;

    assert_eq!(waiting.status, JobStatus::Processing);
    assert_eq!(
        waiting.message,
        "Transient error on attempt 1/3; waiting 0.4s before retry"
    );
    // The extraction stage already finished before the failure.
    assert_eq!(waiting.progress, 10);
    assert!(waiting.error.is_none());

    let record = harness.wait_finished(&job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_fatal_error_fails_after_one_attempt() {
    let factory = ScriptedFactory::new().failing(1, Stage::Planning, "lesson plan is not valid JSON");
    let attempts = factory.attempts();
    let harness = JobHarness::new(factory);

    let job_id = harness.submit("entropy");
    let record = harness.wait_finished(&job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(
        record.error.as_deref(),
        Some("Planning failed: lesson plan is not valid JSON")
    );
    assert!(record.output_path.is_none());
    assert_eq!(record.attempts, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_errors_exhaust_attempts() {
    let factory = ScriptedFactory::new().failing(u32::MAX, Stage::Extraction, "429 Too Many Requests");
    let attempts = factory.attempts();
    let harness = JobHarness::new(factory);

    let job_id = harness.submit("quasars");
    let record = harness.wait_finished(&job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error.unwrap().contains("429 Too Many Requests"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_long_errors_are_truncated_for_display() {
    let message = format!("manim crashed: {}", "x".repeat(2000));
    let harness = JobHarness::new(ScriptedFactory::new().failing(1, Stage::Animation, &message));

    let job_id = harness.submit("long failure");
    let record = harness.wait_finished(&job_id).await;

    let error = record.error.unwrap();
    assert!(error.chars().count() <= 503);
    assert!(error.ends_with("..."));
}

#[tokio::test]
async fn test_progress_resets_on_retry_when_not_held() {
    let policy = RetryPolicy {
        hold_progress: false,
        base_wait: Duration::from_millis(300),
        ..common::harness::fast_policy()
    };
    let harness = JobHarness::with_policy(
        ScriptedFactory::new()
            .failing(1, Stage::Composition, "timed out")
            .stage_delay(Duration::from_millis(100)),
        policy,
    );

    let job_id = harness.submit("reset");
    let before = harness
        .wait_until(&job_id, |r| r.message.contains("before retry"))
        .await;
    assert_eq!(before.progress, 70);

    let after = harness.wait_until(&job_id, |r| r.attempts == 2).await;
    assert!(after.progress < 70);

    let record = harness.wait_finished(&job_id).await;
    assert_eq!(record.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_panicking_stage_fails_job_instead_of_hanging() {
    let harness = JobHarness::new(ScriptedFactory::new().panicking_at(Stage::Planning));

    let job_id = harness.submit("panics");
    let record = harness.wait_finished(&job_id).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 10);
    assert!(record.output_path.is_none());
    assert_eq!(
        record.error.as_deref(),
        Some("Internal error: Planning stage panicked")
    );

    let mut remaining = harness.manager.active_jobs();
    for _ in 0..100 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        remaining = harness.manager.active_jobs();
    }
    assert_eq!(remaining, 0);
}
