//! Job lifecycle state machine.
//!
//! Every mutation of a [`Job`] goes through [`apply_transition`]. Stores load
//! the current record, apply the transition, and persist the result; a
//! rejected transition leaves the record untouched.
//!
//! ```text
//! pending ──Start──▶ started ──BeginProcessing──▶ processing ──Complete──▶ completed
//!                       │                              │
//!                       └────────────Fail──────────────┴──────────▶ failed
//! ```

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{Job, JobStage, JobStatus};

/// A requested change to a job record.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// A worker slot claimed the job.
    Start,
    /// The thread was fetched and flattened.
    BeginProcessing { total_items: i64 },
    /// Coarse progress update; never changes status.
    Checkpoint {
        processed_items: i64,
        stage: JobStage,
        percent: i32,
    },
    /// All insights were stored.
    Complete { insight_count: i64 },
    /// The pipeline failed; `insight_count` rows were stored before it did.
    Fail { error: String, insight_count: i64 },
}

impl JobTransition {
    pub fn name(&self) -> &'static str {
        match self {
            JobTransition::Start => "start",
            JobTransition::BeginProcessing { .. } => "begin_processing",
            JobTransition::Checkpoint { .. } => "checkpoint",
            JobTransition::Complete { .. } => "complete",
            JobTransition::Fail { .. } => "fail",
        }
    }
}

fn reject(job: &Job, reason: impl Into<String>) -> Error {
    Error::InvalidTransition {
        job_id: job.id,
        reason: reason.into(),
    }
}

/// Apply `transition` to `job` in place, or reject it without side effects.
pub fn apply_transition(job: &mut Job, transition: JobTransition, now: DateTime<Utc>) -> Result<()> {
    if job.status.is_terminal() {
        return Err(reject(
            job,
            format!("{} after terminal status {}", transition.name(), job.status.as_str()),
        ));
    }

    match transition {
        JobTransition::Start => {
            if job.status != JobStatus::Pending {
                return Err(reject(job, format!("start from {}", job.status.as_str())));
            }
            job.status = JobStatus::Started;
            job.stage = Some(JobStage::Scraping);
            job.progress_percent = 0;
            job.started_at = Some(now);
        }
        JobTransition::BeginProcessing { total_items } => {
            if job.status != JobStatus::Started {
                return Err(reject(
                    job,
                    format!("begin_processing from {}", job.status.as_str()),
                ));
            }
            if total_items < 0 {
                return Err(reject(job, "negative total_items"));
            }
            job.status = JobStatus::Processing;
            job.total_items = Some(total_items);
        }
        JobTransition::Checkpoint {
            processed_items,
            stage,
            percent,
        } => {
            match job.status {
                JobStatus::Started if processed_items != 0 => {
                    return Err(reject(job, "items processed before total is known"));
                }
                JobStatus::Started => {}
                JobStatus::Processing => {
                    if processed_items < job.processed_items {
                        return Err(reject(
                            job,
                            format!(
                                "processed_items moved backwards ({} -> {})",
                                job.processed_items, processed_items
                            ),
                        ));
                    }
                    let total = job.total_items.unwrap_or(0);
                    if processed_items > total {
                        return Err(reject(
                            job,
                            format!("processed_items {} exceeds total {}", processed_items, total),
                        ));
                    }
                }
                _ => {
                    return Err(reject(job, format!("checkpoint while {}", job.status.as_str())));
                }
            }
            job.processed_items = processed_items;
            job.stage = Some(stage);
            job.progress_percent = percent.clamp(0, 100);
        }
        JobTransition::Complete { insight_count } => {
            if job.status != JobStatus::Processing {
                return Err(reject(job, format!("complete from {}", job.status.as_str())));
            }
            job.status = JobStatus::Completed;
            job.processed_items = job.total_items.unwrap_or(job.processed_items);
            job.insight_count = insight_count;
            job.progress_percent = 100;
            job.stage = None;
            job.error = None;
            job.completed_at = Some(now);
        }
        JobTransition::Fail {
            error,
            insight_count,
        } => {
            if job.status == JobStatus::Pending {
                return Err(reject(job, "fail before start"));
            }
            job.status = JobStatus::Failed;
            job.insight_count = insight_count;
            job.error = Some(error);
            job.completed_at = Some(now);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewJob;
    use uuid::Uuid;

    fn pending_job() -> Job {
        Job::new(
            &NewJob {
                id: Uuid::now_v7(),
                task_handle: Uuid::now_v7(),
                source_url: "https://www.reddit.com/r/rust/comments/abc/x".into(),
                max_items: 100,
            },
            Utc::now(),
        )
    }

    fn processing_job(total: i64) -> Job {
        let mut job = pending_job();
        apply_transition(&mut job, JobTransition::Start, Utc::now()).unwrap();
        apply_transition(
            &mut job,
            JobTransition::BeginProcessing { total_items: total },
            Utc::now(),
        )
        .unwrap();
        job
    }

    fn checkpoint(processed: i64) -> JobTransition {
        JobTransition::Checkpoint {
            processed_items: processed,
            stage: JobStage::Analyzing,
            percent: 50,
        }
    }

    #[test]
    fn test_happy_path_moves_forward() {
        let mut job = processing_job(20);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.total_items, Some(20));

        apply_transition(&mut job, checkpoint(10), Utc::now()).unwrap();
        apply_transition(&mut job, checkpoint(20), Utc::now()).unwrap();
        apply_transition(
            &mut job,
            JobTransition::Complete { insight_count: 31 },
            Utc::now(),
        )
        .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_items, 20);
        assert_eq!(job.insight_count, 31);
        assert_eq!(job.progress_percent, 100);
        assert!(job.completed_at.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_start_sets_scraping_stage() {
        let mut job = pending_job();
        apply_transition(&mut job, JobTransition::Start, Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Started);
        assert_eq!(job.stage, Some(JobStage::Scraping));
        assert!(job.started_at.is_some());
    }

    #[test]
    fn test_out_of_order_transitions_rejected_without_effect() {
        let mut job = pending_job();
        let before = job.clone();

        for t in [
            JobTransition::BeginProcessing { total_items: 3 },
            JobTransition::Complete { insight_count: 1 },
            JobTransition::Fail {
                error: "x".into(),
                insight_count: 0,
            },
            checkpoint(0),
        ] {
            let err = apply_transition(&mut job, t, Utc::now()).unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }));
        }
        assert_eq!(job.status, before.status);
        assert_eq!(job.stage, before.stage);
        assert_eq!(job.started_at, before.started_at);
    }

    #[test]
    fn test_double_start_rejected() {
        let mut job = pending_job();
        apply_transition(&mut job, JobTransition::Start, Utc::now()).unwrap();
        assert!(apply_transition(&mut job, JobTransition::Start, Utc::now()).is_err());
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut job = pending_job();
        apply_transition(&mut job, JobTransition::Start, Utc::now()).unwrap();
        let err = apply_transition(
            &mut job,
            JobTransition::Complete { insight_count: 0 },
            Utc::now(),
        );
        assert!(err.is_err());
        assert_eq!(job.status, JobStatus::Started);
    }

    #[test]
    fn test_fail_from_started_allowed() {
        let mut job = pending_job();
        apply_transition(&mut job, JobTransition::Start, Utc::now()).unwrap();
        apply_transition(
            &mut job,
            JobTransition::Fail {
                error: "fetch failed".into(),
                insight_count: 0,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("fetch failed"));
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut job = processing_job(5);
        apply_transition(
            &mut job,
            JobTransition::Fail {
                error: "storage down".into(),
                insight_count: 100,
            },
            Utc::now(),
        )
        .unwrap();
        let snapshot = job.clone();

        for t in [
            JobTransition::Start,
            checkpoint(5),
            JobTransition::Complete { insight_count: 200 },
            JobTransition::Fail {
                error: "again".into(),
                insight_count: 0,
            },
        ] {
            assert!(apply_transition(&mut job, t, Utc::now()).is_err());
        }
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.insight_count, snapshot.insight_count);
        assert_eq!(job.error, snapshot.error);
        assert_eq!(job.completed_at, snapshot.completed_at);
    }

    #[test]
    fn test_processed_items_monotonic_and_bounded() {
        let mut job = processing_job(15);
        apply_transition(&mut job, checkpoint(10), Utc::now()).unwrap();

        assert!(apply_transition(&mut job, checkpoint(9), Utc::now()).is_err());
        assert_eq!(job.processed_items, 10);

        assert!(apply_transition(&mut job, checkpoint(16), Utc::now()).is_err());
        assert_eq!(job.processed_items, 10);

        apply_transition(&mut job, checkpoint(10), Utc::now()).unwrap();
        apply_transition(&mut job, checkpoint(15), Utc::now()).unwrap();
        assert_eq!(job.processed_items, 15);
    }

    #[test]
    fn test_checkpoint_in_started_only_at_zero() {
        let mut job = pending_job();
        apply_transition(&mut job, JobTransition::Start, Utc::now()).unwrap();
        assert!(apply_transition(&mut job, checkpoint(0), Utc::now()).is_ok());
        assert!(apply_transition(&mut job, checkpoint(1), Utc::now()).is_err());
    }

    #[test]
    fn test_checkpoint_clamps_percent() {
        let mut job = processing_job(10);
        apply_transition(
            &mut job,
            JobTransition::Checkpoint {
                processed_items: 1,
                stage: JobStage::Analyzing,
                percent: 140,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(job.progress_percent, 100);
    }
}
