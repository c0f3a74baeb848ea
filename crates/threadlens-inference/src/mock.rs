//! Mock inference backend for deterministic testing.
//!
//! Embeddings are derived from a hash of the input text, so the same text
//! always maps to the same unit-length vector. Generation answers come from
//! substring mappings checked in insertion order.
//!
//! ```rust,ignore
//! use threadlens_inference::mock::MockInferenceBackend;
//!
//! let backend = MockInferenceBackend::new()
//!     .with_dimension(8)
//!     .with_response_mapping("aspects", r#"["price"]"#)
//!     .with_fixed_response("neutral");
//! assert_eq!(backend.embed_call_count(), 0);
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use threadlens_core::{EmbeddingBackend, Error, GenerationBackend, Result, Vector};

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    mappings: Vec<(String, String)>,
    default_response: String,
    fail: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 16,
            mappings: Vec::new(),
            default_response: "neutral".to_string(),
            fail: false,
        }
    }
}

/// Which trait method a logged call went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Embed,
    Generate,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: MockOperation,
    pub input: String,
}

/// Mock backend implementing both embedding and generation.
#[derive(Clone, Default)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension.max(1);
        self
    }

    /// Answer used when no mapping matches.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Answer `output` whenever the prompt contains `needle`.
    pub fn with_response_mapping(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .mappings
            .push((needle.into(), output.into()));
        self
    }

    /// Make every call fail.
    pub fn failing(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail = true;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn embed_call_count(&self) -> usize {
        self.count(MockOperation::Embed)
    }

    pub fn generate_call_count(&self) -> usize {
        self.count(MockOperation::Generate)
    }

    fn count(&self, op: MockOperation) -> usize {
        self.call_log
            .lock()
            .map(|l| l.iter().filter(|c| c.operation == op).count())
            .unwrap_or(0)
    }

    fn log(&self, operation: MockOperation, input: &str) {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(MockCall {
                operation,
                input: input.to_string(),
            });
        }
    }

    /// Deterministic unit vector for `text` (FNV-1a seeded LCG).
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let mut state = text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
        let mut values: Vec<f32> = (0..self.config.dimension)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) - 0.5
            })
            .collect();
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        values
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        for text in texts {
            self.log(MockOperation::Embed, text);
        }
        if self.config.fail {
            return Err(Error::Embedding("mock embedding failure".into()));
        }
        Ok(texts
            .iter()
            .map(|t| Vector::from(self.embedding_for(t)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.log(MockOperation::Generate, prompt);
        if self.config.fail {
            return Err(Error::Inference("mock generation failure".into()));
        }
        Ok(self
            .config
            .mappings
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| self.config.default_response.clone()))
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}
