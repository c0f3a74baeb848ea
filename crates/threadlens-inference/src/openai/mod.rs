//! OpenAI-compatible inference backend.
//!
//! Works with any endpoint speaking the OpenAI embeddings and chat
//! completions API (OpenAI, Azure OpenAI, Ollama, vLLM, LM Studio).
//!
//! # Example
//!
//! ```rust,no_run
//! use threadlens_inference::openai::{OpenAIBackend, OpenAIConfig};
//! use threadlens_core::EmbeddingBackend;
//!
//! # async fn run() -> threadlens_core::Result<()> {
//! let backend = OpenAIBackend::new(OpenAIConfig {
//!     base_url: "http://localhost:11434/v1".to_string(),
//!     ..OpenAIConfig::default()
//! })?;
//! let vectors = backend.embed_texts(&["price: too high".to_string()]).await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{OpenAIBackend, OpenAIConfig};
pub use error::{to_threadlens_error, OpenAIErrorCode, OpenAIOperation};
pub use types::*;
