//! Job handler trait and execution context.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use threadlens_core::{Job, JobRepository, JobStage, JobTransition, Result};

/// Progress callback type for job handlers: `(stage, percent)`.
pub type ProgressCallback = Box<dyn Fn(JobStage, i32) + Send + Sync>;

/// Context provided to job handlers.
///
/// Status writes go through the job store's transition function; the
/// handler never touches status fields directly.
pub struct JobContext {
    job: Job,
    jobs: Arc<dyn JobRepository>,
    progress_callback: Option<ProgressCallback>,
    stored_rows: Arc<AtomicI64>,
}

impl JobContext {
    pub fn new(job: Job, jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            job,
            jobs,
            progress_callback: None,
            stored_rows: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(JobStage, i32) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Latest known state of the job.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Counter of insight rows acknowledged by the store for this job.
    ///
    /// Shared with the worker so a job cut off by its timeout still reports
    /// the rows written before it stopped.
    pub fn stored_rows(&self) -> Arc<AtomicI64> {
        self.stored_rows.clone()
    }

    pub fn stored_count(&self) -> i64 {
        self.stored_rows.load(Ordering::SeqCst)
    }

    /// Record that the thread was fetched and flattened (`started -> processing`).
    pub async fn begin_processing(&mut self, total_items: i64) -> Result<()> {
        self.job = self
            .jobs
            .transition(self.job.id, JobTransition::BeginProcessing { total_items })
            .await?;
        Ok(())
    }

    /// Persist a progress checkpoint and notify the callback.
    pub async fn checkpoint(
        &mut self,
        processed_items: i64,
        stage: JobStage,
        percent: i32,
    ) -> Result<()> {
        self.job = self
            .jobs
            .transition(
                self.job.id,
                JobTransition::Checkpoint {
                    processed_items,
                    stage,
                    percent,
                },
            )
            .await?;
        if let Some(ref callback) = self.progress_callback {
            callback(stage, self.job.progress_percent);
        }
        Ok(())
    }
}

/// Result of job execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// Every insight was stored.
    Success { insight_count: i64 },
    /// The pipeline stopped; `insight_count` rows were stored before it did.
    Failed { error: String, insight_count: i64 },
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the job. Terminal status is applied by the worker.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use threadlens_core::{new_v7, JobStatus, NewJob};
    use threadlens_db::InMemoryJobRepository;

    async fn started_job(repo: &Arc<InMemoryJobRepository>) -> Job {
        repo.create(NewJob {
            id: new_v7(),
            task_handle: new_v7(),
            source_url: "https://www.reddit.com/r/x/comments/1/t".into(),
            max_items: 10,
        })
        .await
        .unwrap();
        repo.claim_next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_context_checkpoint_updates_store_and_callback() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = started_job(&repo).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let mut ctx = JobContext::new(job.clone(), repo.clone()).with_progress_callback(
            move |stage, percent| seen_clone.lock().unwrap().push((stage, percent)),
        );

        ctx.begin_processing(20).await.unwrap();
        assert_eq!(ctx.job().status, JobStatus::Processing);
        ctx.checkpoint(10, JobStage::Analyzing, 50).await.unwrap();

        let stored = repo.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.processed_items, 10);
        assert_eq!(*seen.lock().unwrap(), vec![(JobStage::Analyzing, 50)]);
    }

    #[tokio::test]
    async fn test_rejected_checkpoint_skips_callback() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = started_job(&repo).await;
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();

        let mut ctx = JobContext::new(job, repo.clone())
            .with_progress_callback(move |_, _| *calls_clone.lock().unwrap() += 1);
        ctx.begin_processing(5).await.unwrap();

        assert!(ctx.checkpoint(6, JobStage::Analyzing, 50).await.is_err());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stored_rows_counter_is_shared() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job = started_job(&repo).await;
        let ctx = JobContext::new(job, repo);

        let counter = ctx.stored_rows();
        counter.fetch_add(40, Ordering::SeqCst);

        assert_eq!(ctx.stored_count(), 40);
    }
}
