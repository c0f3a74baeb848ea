//! Thread analysis handler: fetch, flatten, analyze, store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use threadlens_core::defaults::CHECKPOINT_INTERVAL;
use threadlens_core::{
    AnalysisBackend, CommentItem, Error, Insight, JobStage, PostMetadata, Result,
};

use crate::batcher::PersistenceBatcher;
use crate::extractor::flatten;
use crate::fetcher::ThreadFetcher;
use crate::handler::{JobContext, JobHandler, JobResult};

/// Overall percent when analysis begins.
const ANALYZING_START_PERCENT: i32 = 10;
/// Overall percent span covered by analysis.
const ANALYZING_SPAN_PERCENT: i64 = 80;
/// Overall percent while storing.
const STORING_PERCENT: i32 = 90;

/// Runs one thread analysis job end to end.
///
/// Collaborators are shared by every worker slot for the life of the pool.
pub struct ThreadAnalysisHandler {
    fetcher: Arc<ThreadFetcher>,
    analyzer: Arc<dyn AnalysisBackend>,
    batcher: Arc<PersistenceBatcher>,
    checkpoint_interval: usize,
}

impl ThreadAnalysisHandler {
    pub fn new(
        fetcher: Arc<ThreadFetcher>,
        analyzer: Arc<dyn AnalysisBackend>,
        batcher: Arc<PersistenceBatcher>,
    ) -> Self {
        Self {
            fetcher,
            analyzer,
            batcher,
            checkpoint_interval: CHECKPOINT_INTERVAL,
        }
    }

    pub fn with_checkpoint_interval(mut self, items: usize) -> Self {
        self.checkpoint_interval = items.max(1);
        self
    }

    async fn run(&self, ctx: &mut JobContext) -> Result<i64> {
        let source_url = ctx.job().source_url.clone();
        let max_items = usize::try_from(ctx.job().max_items).unwrap_or(0);

        let payload = self.fetcher.fetch(&source_url).await?;
        let extraction = flatten(&payload, max_items);
        info!(
            subsystem = "jobs",
            component = "pipeline",
            job_id = %ctx.job().id,
            total_found = extraction.total_found,
            kept = extraction.items.len(),
            "Thread flattened"
        );

        ctx.begin_processing(extraction.total_found as i64).await?;
        ctx.checkpoint(0, JobStage::Analyzing, ANALYZING_START_PERCENT)
            .await?;

        let total = extraction.items.len();
        let mut insights = Vec::new();
        for (index, item) in extraction.items.iter().enumerate() {
            let found = self
                .analyzer
                .analyze(&item.text)
                .await
                .map_err(|e| match e {
                    Error::Analysis(msg) => Error::Analysis(format!("item {}: {}", index, msg)),
                    other => Error::Analysis(format!("item {}: {}", index, other)),
                })?;
            insights.extend(
                found
                    .into_iter()
                    .map(|insight| attribute(insight, &source_url, &payload.post, item)),
            );

            let processed = index + 1;
            if processed % self.checkpoint_interval == 0 && processed < total {
                ctx.checkpoint(
                    processed as i64,
                    JobStage::Analyzing,
                    analyzing_percent(processed, total),
                )
                .await?;
            }
        }

        ctx.checkpoint(total as i64, JobStage::Storing, STORING_PERCENT)
            .await?;

        let acknowledged = ctx.stored_rows();
        let stored = self.batcher.store_tracked(&insights, &acknowledged).await?;
        Ok(stored as i64)
    }
}

#[async_trait]
impl JobHandler for ThreadAnalysisHandler {
    async fn execute(&self, mut ctx: JobContext) -> JobResult {
        match self.run(&mut ctx).await {
            Ok(insight_count) => JobResult::Success { insight_count },
            Err(e) => {
                let insight_count = match &e {
                    Error::Persistence { stored, .. } => *stored as i64,
                    _ => 0,
                };
                warn!(
                    subsystem = "jobs",
                    component = "pipeline",
                    job_id = %ctx.job().id,
                    insight_count,
                    error = %e,
                    "Thread analysis failed"
                );
                JobResult::Failed {
                    error: e.to_string(),
                    insight_count,
                }
            }
        }
    }
}

fn analyzing_percent(processed: usize, total: usize) -> i32 {
    if total == 0 {
        return ANALYZING_START_PERCENT;
    }
    let span = ANALYZING_SPAN_PERCENT * processed as i64 / total as i64;
    ANALYZING_START_PERCENT + span as i32
}

fn attribute(insight: Insight, source_url: &str, post: &PostMetadata, item: &CommentItem) -> Insight {
    let metadata = json!({
        "submission_title": post.title,
        "subreddit": post.subreddit,
        "comment_author": item.author,
        "comment_score": item.score,
        "comment_id": item.external_id,
    });
    insight.with_source(source_url, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyzing_percent_range() {
        assert_eq!(analyzing_percent(0, 100), 10);
        assert_eq!(analyzing_percent(50, 100), 50);
        assert_eq!(analyzing_percent(100, 100), 90);
        assert_eq!(analyzing_percent(0, 0), 10);
    }

    #[test]
    fn test_attribute_sets_source_and_metadata() {
        let post = PostMetadata {
            title: "Headphones?".into(),
            subreddit: "audio".into(),
            ..PostMetadata::unknown()
        };
        let item = CommentItem {
            text: "bass is muddy".into(),
            author: "listener".into(),
            score: 7,
            created_at: None,
            external_id: "c1".into(),
        };
        let insight = attribute(
            Insight::new("bass", threadlens_core::Sentiment::Negative, "bass is muddy"),
            "https://www.reddit.com/r/audio/comments/1/h",
            &post,
            &item,
        );

        assert_eq!(insight.source_url, "https://www.reddit.com/r/audio/comments/1/h");
        assert_eq!(insight.metadata["subreddit"], "audio");
        assert_eq!(insight.metadata["comment_score"], 7);
        assert_eq!(insight.metadata["comment_id"], "c1");
    }
}
