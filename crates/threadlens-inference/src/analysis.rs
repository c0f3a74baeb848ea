//! LLM-backed aspect-based sentiment analysis.
//!
//! For each comment the analyzer asks the generation model for the aspects
//! discussed, then classifies the sentiment toward each aspect. Comments
//! with no recognizable aspect produce a single `general` insight scored by
//! a keyword lexicon.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use threadlens_core::defaults;
use threadlens_core::{
    truncate_chars, AnalysisBackend, Error, GenerationBackend, Insight, Result, Sentiment,
};

const ASPECT_SYSTEM_PROMPT: &str = "You extract the product features, topics, or entities a \
     comment expresses an opinion about. Reply with a JSON array of short lowercase noun \
     phrases and nothing else. Reply [] if there are none.";

const SENTIMENT_SYSTEM_PROMPT: &str =
    "You classify sentiment. Reply with exactly one word: positive, negative, or neutral.";

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "love", "amazing", "best", "perfect",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad",
    "terrible",
    "awful",
    "hate",
    "worst",
    "poor",
    "disappointing",
];

/// Tuning knobs for [`AspectSentimentAnalyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub min_text_chars: usize,
    pub max_aspects: usize,
    pub max_aspect_words: usize,
    /// Excerpt length stored with each insight.
    pub max_excerpt_chars: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_text_chars: defaults::ANALYSIS_MIN_TEXT_CHARS,
            max_aspects: defaults::ANALYSIS_MAX_ASPECTS,
            max_aspect_words: defaults::ANALYSIS_MAX_ASPECT_WORDS,
            max_excerpt_chars: defaults::INSIGHT_TEXT_MAX_CHARS,
        }
    }
}

/// Aspect extraction plus per-aspect sentiment over a generation backend.
pub struct AspectSentimentAnalyzer {
    backend: Arc<dyn GenerationBackend>,
    config: AnalyzerConfig,
    json_array: Regex,
    sentiment_word: Regex,
}

impl AspectSentimentAnalyzer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Result<Self> {
        Self::with_config(backend, AnalyzerConfig::default())
    }

    pub fn with_config(backend: Arc<dyn GenerationBackend>, config: AnalyzerConfig) -> Result<Self> {
        let json_array = Regex::new(r"\[[\s\S]*?\]")
            .map_err(|e| Error::Config(format!("aspect pattern: {}", e)))?;
        let sentiment_word = Regex::new(r"(?i)\b(positive|negative|neutral)\b")
            .map_err(|e| Error::Config(format!("sentiment pattern: {}", e)))?;
        Ok(Self {
            backend,
            config,
            json_array,
            sentiment_word,
        })
    }

    /// Ask the model for aspects; a failed call is an analysis error.
    async fn extract_aspects(&self, text: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "List at most {} aspects discussed in this comment.\n\nComment: {}",
            self.config.max_aspects, text
        );
        let answer = self
            .backend
            .generate_with_system(ASPECT_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| Error::Analysis(format!("aspect extraction failed: {}", e)))?;

        Ok(self.parse_aspects(&answer))
    }

    /// Parse the first JSON array in a model answer into cleaned aspects.
    fn parse_aspects(&self, answer: &str) -> Vec<String> {
        let Some(found) = self.json_array.find(answer) else {
            debug!(answer_len = answer.len(), "No aspect array in model answer");
            return Vec::new();
        };
        let raw: Vec<String> = match serde_json::from_str(found.as_str()) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Unparseable aspect array");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        raw.into_iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| a.chars().count() > 2)
            .filter(|a| a.split_whitespace().count() <= self.config.max_aspect_words)
            .filter(|a| seen.insert(a.clone()))
            .take(self.config.max_aspects)
            .collect()
    }

    /// Sentiment toward one aspect; falls back to the lexicon if the call fails.
    async fn classify(&self, text: &str, aspect: &str) -> Sentiment {
        let prompt = format!(
            "What is the sentiment toward \"{}\" in this comment?\n\nComment: {}",
            aspect, text
        );
        match self
            .backend
            .generate_with_system(SENTIMENT_SYSTEM_PROMPT, &prompt)
            .await
        {
            Ok(answer) => self.parse_sentiment(&answer),
            Err(e) => {
                warn!(aspect, error = %e, "Sentiment call failed, using lexicon fallback");
                lexicon_sentiment(text)
            }
        }
    }

    fn parse_sentiment(&self, answer: &str) -> Sentiment {
        self.sentiment_word
            .captures(answer)
            .and_then(|c| c.get(1))
            .and_then(|m| Sentiment::parse(m.as_str()))
            .unwrap_or(Sentiment::Neutral)
    }
}

#[async_trait]
impl AnalysisBackend for AspectSentimentAnalyzer {
    async fn analyze(&self, text: &str) -> Result<Vec<Insight>> {
        let text = text.trim();
        if text.chars().count() < self.config.min_text_chars {
            return Ok(Vec::new());
        }

        let excerpt = truncate_chars(text, self.config.max_excerpt_chars);
        let aspects = self.extract_aspects(text).await?;

        if aspects.is_empty() {
            return Ok(vec![Insight::new(
                defaults::ANALYSIS_FALLBACK_ASPECT,
                lexicon_sentiment(text),
                excerpt,
            )]);
        }

        let mut insights = Vec::with_capacity(aspects.len());
        for aspect in aspects {
            let sentiment = self.classify(text, &aspect).await;
            insights.push(Insight::new(aspect, sentiment, excerpt.clone()));
        }
        Ok(insights)
    }
}

/// Keyword-count sentiment used when the model is unavailable.
pub fn lexicon_sentiment(text: &str) -> Sentiment {
    let lowered = text.to_lowercase();
    let (mut positive, mut negative) = (0usize, 0usize);
    for word in lowered.split(|c: char| !c.is_alphanumeric()) {
        if POSITIVE_WORDS.contains(&word) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&word) {
            negative += 1;
        }
    }
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}
