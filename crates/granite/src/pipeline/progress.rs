use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, JobStage, JobStore};

/// The six steps of the generation workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Planning,
    Animation,
    Narration,
    Composition,
    Quality,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Extraction,
        Stage::Planning,
        Stage::Animation,
        Stage::Narration,
        Stage::Composition,
        Stage::Quality,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn info(self) -> &'static StageInfo {
        &STAGE_TABLE[self.index()]
    }

    pub fn key(self) -> &'static str {
        self.info().key
    }

    pub fn job_stage(self) -> JobStage {
        match self {
            Stage::Extraction => JobStage::Extraction,
            Stage::Planning => JobStage::Planning,
            Stage::Animation => JobStage::Animation,
            Stage::Narration => JobStage::Narration,
            Stage::Composition => JobStage::Composition,
            Stage::Quality => JobStage::Quality,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.job_stage())
    }
}

/// Fixed label and progress percentage reported once a stage completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInfo {
    pub stage: Stage,
    pub key: &'static str,
    pub label: &'static str,
    pub percent: u8,
}

/// Indexed by number of completed stages minus one.
pub const STAGE_TABLE: [StageInfo; 6] = [
    StageInfo {
        stage: Stage::Extraction,
        key: "extraction",
        label: "Content extracted",
        percent: 10,
    },
    StageInfo {
        stage: Stage::Planning,
        key: "planning",
        label: "Lesson planned",
        percent: 25,
    },
    StageInfo {
        stage: Stage::Animation,
        key: "animation",
        label: "Animation rendered",
        percent: 50,
    },
    StageInfo {
        stage: Stage::Narration,
        key: "narration",
        label: "Narration synthesised",
        percent: 70,
    },
    StageInfo {
        stage: Stage::Composition,
        key: "composition",
        label: "Video composed",
        percent: 85,
    },
    StageInfo {
        stage: Stage::Quality,
        key: "quality",
        label: "Quality checked",
        percent: 95,
    },
];

pub const FINALIZING_PERCENT: u8 = 98;
pub const FINALIZING_LABEL: &str = "Finalizing";

/// Events emitted by the pipeline runner.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    StageCompleted {
        stage: Stage,
    },
    Retrying {
        attempt: u32,
        max_attempts: u32,
        wait: Duration,
        error: String,
    },
    Finalizing,
    Completed {
        output_path: String,
    },
    Failed {
        error: String,
    },
}

impl ProgressEvent {
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => format!("Starting attempt {}/{}", attempt, max_attempts),
            ProgressEvent::StageCompleted { stage } => stage.info().label.to_string(),
            ProgressEvent::Retrying {
                attempt,
                max_attempts,
                wait,
                ..
            } => format!(
                "Transient error on attempt {}/{}; waiting {}s before retry",
                attempt,
                max_attempts,
                display_secs(*wait)
            ),
            ProgressEvent::Finalizing => FINALIZING_LABEL.to_string(),
            ProgressEvent::Completed { .. } => "Video generated successfully".to_string(),
            ProgressEvent::Failed { error } => format!("Generation failed: {}", error),
        }
    }
}

fn display_secs(wait: Duration) -> String {
    if wait.subsec_nanos() == 0 {
        wait.as_secs().to_string()
    } else {
        format!("{:.1}", wait.as_secs_f64())
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Applies pipeline events to the job store and republishes the resulting
/// state on the broadcast channel.
pub struct StoreProgress {
    job_id: String,
    store: Arc<dyn JobStore>,
    broadcaster: JobProgressBroadcaster,
    reset_on_retry: bool,
}

impl StoreProgress {
    pub fn new(
        job_id: &str,
        store: Arc<dyn JobStore>,
        broadcaster: JobProgressBroadcaster,
        reset_on_retry: bool,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            store,
            broadcaster,
            reset_on_retry,
        }
    }

    fn publish_current(&self) {
        match self.store.get(&self.job_id) {
            Ok(job) => {
                let mut event =
                    JobProgressEvent::new(&job.job_id, job.current_stage, job.progress, &job.message);
                event.status = job.status;
                self.broadcaster.send(event);
            }
            Err(e) => log::warn!("Cannot publish progress for job {}: {}", self.job_id, e),
        }
    }

    fn apply(&self, event: &ProgressEvent) -> Result<(), crate::broadcast::JobStoreError> {
        let id = self.job_id.as_str();
        match event {
            ProgressEvent::AttemptStarted { attempt, .. } => {
                let reset = self.reset_on_retry && *attempt > 1;
                self.store.begin_attempt(id, *attempt, reset)?;
                self.store.note(id, &event.message())?;
                self.publish_current();
            }
            ProgressEvent::StageCompleted { stage } => {
                let info = stage.info();
                self.store
                    .update_stage(id, stage.job_stage(), info.percent, info.label)?;
                self.publish_current();
            }
            ProgressEvent::Retrying { .. } => {
                self.store.note(id, &event.message())?;
                self.publish_current();
            }
            ProgressEvent::Finalizing => {
                self.store
                    .update_stage(id, JobStage::Quality, FINALIZING_PERCENT, FINALIZING_LABEL)?;
                self.publish_current();
            }
            ProgressEvent::Completed { output_path } => {
                self.store.complete(id, output_path)?;
                self.broadcaster
                    .send(JobProgressEvent::completed(id, output_path));
            }
            ProgressEvent::Failed { error } => {
                let job = self.store.fail(id, error)?;
                let stored_error = job.error.as_deref().unwrap_or(error);
                self.broadcaster.send(JobProgressEvent::failed(
                    id,
                    job.current_stage,
                    job.progress,
                    stored_error,
                ));
            }
        }
        Ok(())
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, event: ProgressEvent) {
        if let Err(e) = self.apply(&event) {
            log::warn!("Failed to record progress for job {}: {}", self.job_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{JobStatus, MemoryJobStore};

    #[test]
    fn test_stage_table_is_ordered_and_increasing() {
        let mut previous = 0;
        for (i, info) in STAGE_TABLE.iter().enumerate() {
            assert_eq!(info.stage, Stage::ALL[i]);
            assert_eq!(info.stage.index(), i);
            assert!(info.percent > previous);
            previous = info.percent;
        }
        assert!(FINALIZING_PERCENT > previous);
        assert!(FINALIZING_PERCENT < 100);
    }

    #[test]
    fn test_stage_percentages() {
        let percents: Vec<u8> = Stage::ALL.iter().map(|s| s.info().percent).collect();
        assert_eq!(percents, vec![10, 25, 50, 70, 85, 95]);
        assert_eq!(Stage::Narration.key(), "narration");
    }

    #[test]
    fn test_retry_message() {
        let event = ProgressEvent::Retrying {
            attempt: 1,
            max_attempts: 3,
            wait: Duration::from_secs(30),
            error: "503".to_string(),
        };
        assert_eq!(
            event.message(),
            "Transient error on attempt 1/3; waiting 30s before retry"
        );

        let fractional = ProgressEvent::Retrying {
            attempt: 2,
            max_attempts: 3,
            wait: Duration::from_millis(22_500),
            error: "429".to_string(),
        };
        assert_eq!(
            fractional.message(),
            "Transient error on attempt 2/3; waiting 22.5s before retry"
        );
    }

    fn reporter(reset: bool) -> (Arc<MemoryJobStore>, StoreProgress, JobProgressBroadcaster) {
        let store = Arc::new(MemoryJobStore::new());
        store.create("job-1", "explain gravity", None).unwrap();
        store.start("job-1").unwrap();
        let broadcaster = JobProgressBroadcaster::new(32);
        let progress = StoreProgress::new("job-1", store.clone(), broadcaster.clone(), reset);
        (store, progress, broadcaster)
    }

    #[test]
    fn test_store_progress_applies_events() {
        let (store, progress, broadcaster) = reporter(false);
        let mut rx = broadcaster.subscribe();

        progress.report(ProgressEvent::AttemptStarted {
            attempt: 1,
            max_attempts: 3,
        });
        progress.report(ProgressEvent::StageCompleted {
            stage: Stage::Extraction,
        });
        progress.report(ProgressEvent::StageCompleted {
            stage: Stage::Planning,
        });

        let job = store.get("job-1").unwrap();
        assert_eq!(job.current_stage, JobStage::Planning);
        assert_eq!(job.progress, 25);
        assert_eq!(job.message, "Lesson planned");
        assert_eq!(job.attempts, 1);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.status, JobStatus::Processing);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.progress, 10);
    }

    #[test]
    fn test_store_progress_holds_on_retry() {
        let (store, progress, _b) = reporter(false);
        progress.report(ProgressEvent::StageCompleted {
            stage: Stage::Animation,
        });
        progress.report(ProgressEvent::Retrying {
            attempt: 1,
            max_attempts: 3,
            wait: Duration::from_secs(30),
            error: "timeout".to_string(),
        });
        progress.report(ProgressEvent::AttemptStarted {
            attempt: 2,
            max_attempts: 3,
        });
        progress.report(ProgressEvent::StageCompleted {
            stage: Stage::Extraction,
        });

        let job = store.get("job-1").unwrap();
        assert_eq!(job.progress, 50);
        assert_eq!(job.current_stage, JobStage::Animation);
        assert_eq!(job.attempts, 2);
    }

    #[test]
    fn test_store_progress_resets_when_configured() {
        let (store, progress, _b) = reporter(true);
        progress.report(ProgressEvent::StageCompleted {
            stage: Stage::Animation,
        });
        progress.report(ProgressEvent::AttemptStarted {
            attempt: 2,
            max_attempts: 3,
        });

        let job = store.get("job-1").unwrap();
        assert_eq!(job.progress, 0);
        assert_eq!(job.current_stage, JobStage::Queued);
    }

    #[test]
    fn test_store_progress_terminal_events() {
        let (store, progress, broadcaster) = reporter(false);
        let mut rx = broadcaster.subscribe();

        progress.report(ProgressEvent::Finalizing);
        progress.report(ProgressEvent::Completed {
            output_path: "/out/final_video.mp4".to_string(),
        });

        let job = store.get("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);

        let finalizing = rx.try_recv().unwrap();
        assert_eq!(finalizing.progress, FINALIZING_PERCENT);
        let done = rx.try_recv().unwrap();
        assert!(done.is_terminal());

        // late failure on a finished job is logged, not applied
        progress.report(ProgressEvent::Failed {
            error: "late".to_string(),
        });
        assert_eq!(store.get("job-1").unwrap().status, JobStatus::Completed);
    }
}
