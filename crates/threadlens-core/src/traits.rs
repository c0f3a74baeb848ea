//! Core traits for threadlens abstractions.
//!
//! The job pipeline talks to storage and to model providers only through
//! these traits, so workers receive their collaborators as injected
//! `Arc<dyn ...>` handles.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::Result;
use crate::job_state::JobTransition;
use crate::models::{Insight, Job, NewJob, StoredInsightRow};

// =============================================================================
// JOB REPOSITORY TRAITS
// =============================================================================

/// Persisted job records.
///
/// Status fields change only through [`JobRepository::transition`] and
/// [`JobRepository::claim_next`], both of which run
/// [`crate::apply_transition`] against the stored record.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a `pending` job. If a job with the same id already exists it
    /// is returned unchanged and nothing is inserted.
    async fn create(&self, job: NewJob) -> Result<Job>;

    /// Atomically move the oldest `pending` job to `started` and return it.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Apply a transition to a stored job and return the updated record.
    async fn transition(&self, job_id: Uuid, transition: JobTransition) -> Result<Job>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Get job by the handle returned at submission.
    async fn get_by_task_handle(&self, task_handle: Uuid) -> Result<Option<Job>>;

    /// Get pending jobs count.
    async fn pending_count(&self) -> Result<i64>;

    /// Wakeup handle signalled whenever a job is created.
    fn notifier(&self) -> Arc<Notify>;
}

// =============================================================================
// INSIGHT REPOSITORY TRAITS
// =============================================================================

/// Persisted insight rows.
#[async_trait]
pub trait InsightRepository: Send + Sync {
    /// Store one batch; returns the number of rows acknowledged.
    async fn insert_batch(&self, rows: &[StoredInsightRow]) -> Result<usize>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<crate::Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Content analysis applied to each flattened comment.
///
/// Returned insights carry aspect, sentiment and excerpt; the caller
/// attaches source URL and metadata. An error aborts the whole job.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<Vec<Insight>>;
}
