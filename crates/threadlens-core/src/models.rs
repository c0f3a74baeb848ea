//! Core data models for threadlens.
//!
//! These types are shared across all threadlens crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use pgvector::Vector;

// =============================================================================
// JOB TYPES
// =============================================================================

/// Lifecycle status of a thread analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Started,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Started => "started",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "started" => Some(JobStatus::Started),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Completed and failed jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Status string exposed to pollers.
    pub fn external(&self) -> &'static str {
        match self {
            JobStatus::Completed => "success",
            JobStatus::Failed => "failure",
            other => other.as_str(),
        }
    }
}

/// Coarse pipeline stage reported alongside progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Scraping,
    Analyzing,
    Storing,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Scraping => "scraping",
            JobStage::Analyzing => "analyzing",
            JobStage::Storing => "storing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scraping" => Some(JobStage::Scraping),
            "analyzing" => Some(JobStage::Analyzing),
            "storing" => Some(JobStage::Storing),
            _ => None,
        }
    }
}

/// A thread analysis job as persisted in the job store.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Job {
    pub id: Uuid,
    /// Opaque handle returned to the submitter.
    pub task_handle: Uuid,
    pub source_url: String,
    pub max_items: i64,
    pub status: JobStatus,
    pub stage: Option<JobStage>,
    pub progress_percent: i32,
    /// Qualifying items found in the thread, before `max_items` truncation.
    pub total_items: Option<i64>,
    pub processed_items: i64,
    pub insight_count: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh `pending` job.
    pub fn new(request: &NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: request.id,
            task_handle: request.task_handle,
            source_url: request.source_url.clone(),
            max_items: request.max_items,
            status: JobStatus::Pending,
            stage: None,
            progress_percent: 0,
            total_items: None,
            processed_items: 0,
            insight_count: 0,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Request to create a job record.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: Uuid,
    pub task_handle: Uuid,
    pub source_url: String,
    pub max_items: i64,
}

/// Aggregate counts carried by a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobResultSummary {
    pub total_items: i64,
    pub processed_items: i64,
    pub insight_count: i64,
}

/// Progress snapshot of a running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobProgress {
    pub stage: Option<JobStage>,
    pub percent: i32,
    pub processed_items: i64,
    pub total_items: Option<i64>,
}

/// Poller-facing view of a job.
///
/// Terminal jobs carry either `result` (success) or `error` (failure).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TaskStatus {
    pub task_handle: Uuid,
    pub job_id: Uuid,
    /// One of `pending`, `started`, `processing`, `success`, `failure`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for TaskStatus {
    fn from(job: &Job) -> Self {
        let (progress, result, error) = match job.status {
            JobStatus::Completed => (
                None,
                Some(JobResultSummary {
                    total_items: job.total_items.unwrap_or(0),
                    processed_items: job.processed_items,
                    insight_count: job.insight_count,
                }),
                None,
            ),
            JobStatus::Failed => (None, None, job.error.clone()),
            _ => (
                Some(JobProgress {
                    stage: job.stage,
                    percent: job.progress_percent,
                    processed_items: job.processed_items,
                    total_items: job.total_items,
                }),
                None,
                None,
            ),
        };

        Self {
            task_handle: job.task_handle,
            job_id: job.id,
            status: job.status.external().to_string(),
            progress,
            result,
            error,
        }
    }
}

// =============================================================================
// THREAD TYPES
// =============================================================================

/// Root post metadata of a fetched thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMetadata {
    pub title: String,
    pub subreddit: String,
    pub author: String,
    pub created_utc: f64,
    pub num_comments: i64,
    pub score: i64,
    pub selftext: String,
}

impl PostMetadata {
    /// Placeholder used when the post listing is missing entirely.
    pub fn unknown() -> Self {
        Self {
            title: "Unknown".to_string(),
            subreddit: "unknown".to_string(),
            author: "unknown".to_string(),
            created_utc: 0.0,
            num_comments: 0,
            score: 0,
            selftext: String::new(),
        }
    }
}

/// Raw fetched thread: post metadata plus the untouched comment listing.
#[derive(Debug, Clone)]
pub struct ThreadPayload {
    pub source_url: String,
    pub post: PostMetadata,
    /// Second element of the upstream array; `Null` when absent.
    pub comments: JsonValue,
}

/// One flattened comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentItem {
    pub text: String,
    pub author: String,
    pub score: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub external_id: String,
}

// =============================================================================
// INSIGHT TYPES
// =============================================================================

/// Sentiment polarity attached to an aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    /// Lenient parse of a model answer; anything unrecognized is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

/// An aspect/sentiment finding derived from one comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub aspect: String,
    pub sentiment: Sentiment,
    pub excerpt: String,
    pub source_url: String,
    pub metadata: JsonValue,
}

impl Insight {
    /// Finding without source attribution; the pipeline fills that in.
    pub fn new(aspect: impl Into<String>, sentiment: Sentiment, excerpt: impl Into<String>) -> Self {
        Self {
            aspect: aspect.into(),
            sentiment,
            excerpt: excerpt.into(),
            source_url: String::new(),
            metadata: JsonValue::Object(Default::default()),
        }
    }

    pub fn with_source(mut self, source_url: impl Into<String>, metadata: JsonValue) -> Self {
        self.source_url = source_url.into();
        self.metadata = metadata;
        self
    }

    /// Text handed to the embedding provider.
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.aspect, self.excerpt)
    }
}

/// Insight plus embedding and identifier; the unit of persistence.
#[derive(Debug, Clone)]
pub struct StoredInsightRow {
    pub id: Uuid,
    pub source_url: String,
    pub aspect: String,
    pub sentiment: Sentiment,
    pub text: String,
    pub embedding: Vector,
    pub metadata: JsonValue,
}

/// Keep the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
    }
}
