//! Batched embedding and persistence of insights.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use threadlens_core::defaults::{INSIGHT_BATCH_SIZE, INSIGHT_TEXT_MAX_CHARS};
use threadlens_core::{
    new_v7, truncate_chars, EmbeddingBackend, Error, Insight, InsightRepository, Result,
    StoredInsightRow,
};

/// Embeds and stores insights in fixed-size batches.
///
/// Batches are written in order. A failing batch stops the run, and the
/// returned [`Error::Persistence`] carries the rows stored before it.
pub struct PersistenceBatcher {
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn InsightRepository>,
    batch_size: usize,
}

impl PersistenceBatcher {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, store: Arc<dyn InsightRepository>) -> Self {
        Self {
            embedder,
            store,
            batch_size: INSIGHT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Batch size from `INSIGHT_BATCH_SIZE` (default 100).
    pub fn batch_size_from_env() -> usize {
        std::env::var("INSIGHT_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(INSIGHT_BATCH_SIZE)
            .max(1)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Store all insights; returns the number of rows acknowledged.
    pub async fn store(&self, insights: &[Insight]) -> Result<usize> {
        self.store_tracked(insights, &AtomicI64::new(0)).await
    }

    /// Like [`store`](Self::store), adding each acknowledged batch to
    /// `acknowledged` as soon as the store returns.
    pub async fn store_tracked(
        &self,
        insights: &[Insight],
        acknowledged: &AtomicI64,
    ) -> Result<usize> {
        let mut stored = 0;
        for (index, chunk) in insights.chunks(self.batch_size).enumerate() {
            match self.store_batch(chunk).await {
                Ok(count) => {
                    stored += count;
                    acknowledged.fetch_add(count as i64, Ordering::SeqCst);
                    debug!(batch = index, rows = count, stored, "Stored insight batch");
                }
                Err(e) => {
                    warn!(batch = index, stored, error = %e, "Insight batch failed");
                    return Err(Error::Persistence {
                        stored,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(stored)
    }

    async fn store_batch(&self, chunk: &[Insight]) -> Result<usize> {
        let texts: Vec<String> = chunk.iter().map(Insight::embedding_text).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        if vectors.len() != chunk.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                chunk.len(),
                vectors.len()
            )));
        }

        let rows: Vec<StoredInsightRow> = chunk
            .iter()
            .zip(vectors)
            .map(|(insight, embedding)| StoredInsightRow {
                id: new_v7(),
                source_url: insight.source_url.clone(),
                aspect: insight.aspect.clone(),
                sentiment: insight.sentiment,
                text: truncate_chars(&insight.excerpt, INSIGHT_TEXT_MAX_CHARS),
                embedding,
                metadata: insight.metadata.clone(),
            })
            .collect();

        self.store.insert_batch(&rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use threadlens_core::Sentiment;
    use threadlens_db::InMemoryInsightRepository;
    use threadlens_inference::mock::MockInferenceBackend;

    fn insights(n: usize) -> Vec<Insight> {
        (0..n)
            .map(|i| {
                Insight::new("price", Sentiment::Neutral, format!("comment {}", i))
                    .with_source("https://www.reddit.com/r/x/comments/1/t", serde_json::json!({}))
            })
            .collect()
    }

    /// Accepts the first batch and rejects every later one.
    #[derive(Default)]
    struct FirstBatchOnly {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl InsightRepository for FirstBatchOnly {
        async fn insert_batch(&self, rows: &[StoredInsightRow]) -> Result<usize> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls > 1 {
                return Err(Error::Internal("disk full".into()));
            }
            Ok(rows.len())
        }
    }

    #[tokio::test]
    async fn test_store_splits_into_batches() {
        let embedder = Arc::new(MockInferenceBackend::new().with_dimension(4));
        let store = Arc::new(InMemoryInsightRepository::new());
        let batcher = PersistenceBatcher::new(embedder.clone(), store.clone()).with_batch_size(100);

        let stored = batcher.store(&insights(250)).await.unwrap();

        assert_eq!(stored, 250);
        assert_eq!(store.rows().await.len(), 250);
        assert_eq!(embedder.embed_call_count(), 250);
    }

    #[tokio::test]
    async fn test_store_reports_rows_before_failing_batch() {
        let embedder = Arc::new(MockInferenceBackend::new().with_dimension(4));
        let store = Arc::new(FirstBatchOnly::default());
        let batcher = PersistenceBatcher::new(embedder, store.clone()).with_batch_size(100);

        let acknowledged = AtomicI64::new(0);
        let err = batcher
            .store_tracked(&insights(250), &acknowledged)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Persistence { stored: 100, .. }), "got {:?}", err);
        assert_eq!(acknowledged.load(Ordering::SeqCst), 100);
        // no batch is attempted after the failure
        assert_eq!(*store.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_embedding_failure_on_first_batch() {
        let embedder = Arc::new(MockInferenceBackend::new().failing());
        let store = Arc::new(InMemoryInsightRepository::new());
        let batcher = PersistenceBatcher::new(embedder, store.clone());

        let err = batcher.store(&insights(3)).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { stored: 0, .. }));
        assert!(store.rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_stored_text_capped_at_max_chars() {
        let embedder = Arc::new(MockInferenceBackend::new().with_dimension(4));
        let store = Arc::new(InMemoryInsightRepository::new());
        let batcher = PersistenceBatcher::new(embedder, store.clone());
        let long = Insight::new(
            "bass",
            Sentiment::Positive,
            "é".repeat(INSIGHT_TEXT_MAX_CHARS + 80),
        );

        batcher.store(&[long]).await.unwrap();

        let rows = store.rows().await;
        assert_eq!(rows[0].text.chars().count(), INSIGHT_TEXT_MAX_CHARS);
        assert!(!rows[0].text.ends_with("..."));
    }

    #[tokio::test]
    async fn test_empty_input_stores_nothing() {
        let embedder = Arc::new(MockInferenceBackend::new());
        let store = Arc::new(InMemoryInsightRepository::new());
        let batcher = PersistenceBatcher::new(embedder.clone(), store);
        assert_eq!(batcher.store(&[]).await.unwrap(), 0);
        assert_eq!(embedder.embed_call_count(), 0);
    }
}
