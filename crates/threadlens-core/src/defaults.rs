//! Centralized default constants for threadlens.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Environment overrides are applied by each component's
//! `from_env()` constructor.

// =============================================================================
// THREAD FETCH
// =============================================================================

/// Client identifier sent with every upstream request.
pub const FETCH_USER_AGENT: &str = "ThreadLens/1.0 (Discussion analysis; open source)";

/// Per-request timeout for upstream fetches.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// Total attempts (not retries after the first) for one fetch.
pub const FETCH_MAX_RETRIES: u32 = 3;

/// Base delay after a 429; attempt `n` waits `base * (n + 1)`.
pub const FETCH_RATE_LIMIT_DELAY_SECS: u64 = 60;

/// Fixed delay after a transient network failure.
pub const FETCH_NETWORK_BACKOFF_SECS: u64 = 5;

/// Suffix of the structured-data endpoint.
pub const FETCH_DATA_SUFFIX: &str = ".json";

/// Hosts accepted at submission.
pub const ALLOWED_THREAD_HOSTS: &[&str] = &["reddit.com", "redd.it"];

// =============================================================================
// JOBS
// =============================================================================

/// Default `max_items` for a submission that omits it.
pub const MAX_ITEMS_DEFAULT: i64 = 1000;

/// Upper bound accepted for `max_items`.
pub const MAX_ITEMS_LIMIT: i64 = 10_000;

/// Progress is written to the job store after this many analyzed items.
pub const CHECKPOINT_INTERVAL: usize = 10;

/// Hard wall-clock limit for one job.
pub const JOB_TIMEOUT_SECS: u64 = 3600;

/// Worker slots per process.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Idle poll interval when no wakeup arrives.
pub const JOB_POLL_INTERVAL_MS: u64 = 5000;

/// Capacity of the worker event broadcast channel.
pub const JOB_EVENT_CHANNEL_CAPACITY: usize = 100;

// =============================================================================
// ANALYSIS
// =============================================================================

/// Texts shorter than this (after trimming) produce no insights.
pub const ANALYSIS_MIN_TEXT_CHARS: usize = 10;

/// Maximum aspects extracted per item.
pub const ANALYSIS_MAX_ASPECTS: usize = 5;

/// Maximum words in one aspect phrase.
pub const ANALYSIS_MAX_ASPECT_WORDS: usize = 4;

/// Aspect used when none could be extracted.
pub const ANALYSIS_FALLBACK_ASPECT: &str = "general";

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Maximum rows per storage call.
pub const INSIGHT_BATCH_SIZE: usize = 100;

/// Stored insight text is truncated to this many characters.
pub const INSIGHT_TEXT_MAX_CHARS: usize = 500;

// =============================================================================
// EMBEDDING / GENERATION
// =============================================================================

/// Default OpenAI-compatible endpoint.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Embedding dimension for `EMBED_MODEL`.
pub const EMBED_DIMENSION: usize = 1536;

/// Default generation model for the analyzer.
pub const GEN_MODEL: &str = "gpt-4o-mini";

/// Request timeout for inference calls.
pub const INFERENCE_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// SERVER
// =============================================================================

/// Default bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const SERVER_PORT: u16 = 3000;
