//! Bounded worker pool that claims and runs thread analysis jobs.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use threadlens_core::defaults::{
    JOB_EVENT_CHANNEL_CAPACITY, JOB_MAX_CONCURRENT, JOB_POLL_INTERVAL_MS, JOB_TIMEOUT_SECS,
};
use threadlens_core::{Error, Job, JobRepository, JobStage, JobTransition, Result};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of worker slots; each runs one job at a time.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
    /// Wall-clock limit for one job.
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: JOB_MAX_CONCURRENT,
            enabled: true,
            job_timeout: Duration::from_secs(JOB_TIMEOUT_SECS),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Worker slots |
    /// | `JOB_POLL_INTERVAL_MS` | `5000` | Idle poll interval |
    /// | `JOB_TIMEOUT_SECS` | `3600` | Per-job wall-clock limit |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(JOB_POLL_INTERVAL_MS);

        let job_timeout = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(JOB_TIMEOUT_SECS));

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
            job_timeout,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A slot claimed a job.
    JobStarted { job_id: Uuid },
    /// A progress checkpoint was persisted.
    JobProgress {
        job_id: Uuid,
        stage: JobStage,
        percent: i32,
    },
    /// A job reached `completed`.
    JobCompleted { job_id: Uuid, insight_count: i64 },
    /// A job reached `failed`.
    JobFailed {
        job_id: Uuid,
        error: String,
        insight_count: i64,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal every slot to stop after its current job.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(true)
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Wait until every slot has exited.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!(error = ?e, "Job worker task panicked");
        }
    }
}

/// Job worker running a fixed number of slots against one job store.
///
/// Each slot claims one job, runs it to a terminal status, then claims the
/// next. Idle slots wake on a new submission, the poll interval, or shutdown.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(JOB_EVENT_CHANNEL_CAPACITY);
        Self {
            jobs,
            handler,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        let join = tokio::spawn(async move {
            worker.run(shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            join,
        }
    }

    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(self: Arc<Self>, shutdown_rx: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let slots: Vec<_> = (0..self.config.max_concurrent_jobs.max(1))
            .map(|slot| {
                let worker = self.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move { worker.run_slot(slot, shutdown_rx).await })
            })
            .collect();

        for result in futures::future::join_all(slots).await {
            if let Err(e) = result {
                error!(error = ?e, "Worker slot panicked");
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn run_slot(&self, slot: usize, mut shutdown_rx: watch::Receiver<bool>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let notify = self.jobs.notifier();

        loop {
            if *shutdown_rx.borrow() {
                debug!(slot, "Worker slot received shutdown signal");
                break;
            }

            match self.jobs.claim_next().await {
                Ok(Some(job)) => {
                    self.execute_job(job).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!(slot, error = %e, "Failed to claim job"),
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        debug!(slot, "Worker handle dropped");
                        break;
                    }
                }
                _ = notify.notified() => {}
                _ = sleep(poll_interval) => {}
            }
        }
    }

    /// Run one claimed job and apply its terminal transition.
    async fn execute_job(&self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;

        info!(%job_id, source_url = %job.source_url, "Processing job");
        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id });

        let event_tx = self.event_tx.clone();
        let ctx = JobContext::new(job, self.jobs.clone()).with_progress_callback(
            move |stage, percent| {
                let _ = event_tx.send(WorkerEvent::JobProgress {
                    job_id,
                    stage,
                    percent,
                });
            },
        );
        let stored_rows = ctx.stored_rows();

        let result = match tokio::time::timeout(self.config.job_timeout, self.handler.execute(ctx))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                let secs = self.config.job_timeout.as_secs_f64();
                let insight_count = stored_rows.load(Ordering::SeqCst);
                warn!(%job_id, insight_count, "Job exceeded timeout of {}s", secs);
                JobResult::Failed {
                    error: format!("Job exceeded timeout of {}s", secs),
                    insight_count,
                }
            }
        };

        match result {
            JobResult::Success { insight_count } => {
                match self
                    .jobs
                    .transition(job_id, JobTransition::Complete { insight_count })
                    .await
                {
                    Ok(_) => {
                        info!(
                            %job_id,
                            insight_count,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Job completed successfully"
                        );
                        let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                            job_id,
                            insight_count,
                        });
                    }
                    Err(e) => error!(error = %e, %job_id, "Failed to mark job as completed"),
                }
            }
            JobResult::Failed {
                error,
                insight_count,
            } => {
                let transition = JobTransition::Fail {
                    error: error.clone(),
                    insight_count,
                };
                match self.jobs.transition(job_id, transition).await {
                    Ok(_) => {
                        warn!(
                            %job_id,
                            %error,
                            insight_count,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Job failed"
                        );
                        let _ = self.event_tx.send(WorkerEvent::JobFailed {
                            job_id,
                            error,
                            insight_count,
                        });
                    }
                    Err(e) => error!(error = %e, %job_id, "Failed to mark job as failed"),
                }
            }
        }
    }
}

/// Builder for creating a job worker.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handler: Option<Arc<dyn JobHandler>>,
}

impl WorkerBuilder {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            jobs,
            config: WorkerConfig::default(),
            handler: None,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<JobWorker> {
        let handler = self
            .handler
            .ok_or_else(|| Error::Config("Job worker needs a handler".into()))?;
        Ok(JobWorker::new(self.jobs, handler, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, JOB_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent_jobs, JOB_MAX_CONCURRENT);
        assert!(config.enabled);
        assert_eq!(config.job_timeout, Duration::from_secs(JOB_TIMEOUT_SECS));
    }

    #[test]
    fn test_worker_config_builders() {
        let config = WorkerConfig::default()
            .with_poll_interval(50)
            .with_max_concurrent(0)
            .with_enabled(false)
            .with_job_timeout(Duration::from_millis(10));
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.max_concurrent_jobs, 1);
        assert!(!config.enabled);
        assert_eq!(config.job_timeout, Duration::from_millis(10));
    }

    #[test]
    fn test_builder_requires_handler() {
        let jobs: Arc<dyn JobRepository> = Arc::new(threadlens_db::InMemoryJobRepository::new());
        assert!(matches!(
            WorkerBuilder::new(jobs).build(),
            Err(Error::Config(_))
        ));
    }
}
