//! # threadlens-inference
//!
//! Model-facing backends for threadlens:
//!
//! - [`openai`]: OpenAI-compatible embeddings and chat completions
//! - [`analysis`]: aspect-based sentiment analysis over any generation backend
//! - `mock` (feature `mock`): deterministic backend for tests

pub mod analysis;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;

pub use analysis::{lexicon_sentiment, AnalyzerConfig, AspectSentimentAnalyzer};
pub use openai::{OpenAIBackend, OpenAIConfig};
