//! Upstream thread fetch with rate-limit and network retry.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value as JsonValue;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use threadlens_core::defaults::{
    ALLOWED_THREAD_HOSTS, FETCH_DATA_SUFFIX, FETCH_MAX_RETRIES, FETCH_NETWORK_BACKOFF_SECS,
    FETCH_RATE_LIMIT_DELAY_SECS, FETCH_TIMEOUT_SECS, FETCH_USER_AGENT,
};
use threadlens_core::{Error, FetchErrorKind, PostMetadata, Result, ThreadPayload};

/// Configuration for [`ThreadFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    /// Total attempts per fetch.
    pub max_retries: u32,
    /// Attempt `n` after a 429 waits `rate_limit_base_delay * (n + 1)`.
    pub rate_limit_base_delay: Duration,
    pub network_backoff: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            max_retries: FETCH_MAX_RETRIES,
            rate_limit_base_delay: Duration::from_secs(FETCH_RATE_LIMIT_DELAY_SECS),
            network_backoff: Duration::from_secs(FETCH_NETWORK_BACKOFF_SECS),
            user_agent: FETCH_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FETCH_TIMEOUT_SECS` | `30` | Per-request timeout |
    /// | `FETCH_MAX_RETRIES` | `3` | Total attempts per fetch |
    /// | `FETCH_RATE_LIMIT_DELAY_SECS` | `60` | Base delay after a 429 |
    /// | `FETCH_NETWORK_BACKOFF_SECS` | `5` | Delay after a network failure |
    /// | `FETCH_USER_AGENT` | `ThreadLens/1.0 (...)` | Client identifier |
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(default))
        };

        let max_retries = std::env::var("FETCH_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(FETCH_MAX_RETRIES)
            .max(1);

        Self {
            timeout: secs("FETCH_TIMEOUT_SECS", FETCH_TIMEOUT_SECS),
            max_retries,
            rate_limit_base_delay: secs("FETCH_RATE_LIMIT_DELAY_SECS", FETCH_RATE_LIMIT_DELAY_SECS),
            network_backoff: secs("FETCH_NETWORK_BACKOFF_SECS", FETCH_NETWORK_BACKOFF_SECS),
            user_agent: std::env::var("FETCH_USER_AGENT")
                .unwrap_or_else(|_| FETCH_USER_AGENT.to_string()),
        }
    }

    pub fn with_max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts.max(1);
        self
    }

    pub fn with_rate_limit_base_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_base_delay = delay;
        self
    }

    pub fn with_network_backoff(mut self, delay: Duration) -> Self {
        self.network_backoff = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for the structured-data form of a discussion thread.
pub struct ThreadFetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl ThreadFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(FetcherConfig::from_env())
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch using the configured timeout and retry budget.
    pub async fn fetch(&self, url: &str) -> Result<ThreadPayload> {
        self.fetch_with(url, self.config.timeout, self.config.max_retries)
            .await
    }

    /// Fetch with an explicit timeout and attempt budget.
    ///
    /// 429 answers back off linearly and end in `RateLimited`; transport
    /// failures back off by a fixed delay and end in `Network`; any other
    /// non-success status fails at once with `BadStatus`.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "fetcher"))]
    pub async fn fetch_with(
        &self,
        url: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<ThreadPayload> {
        let data_url = to_data_url(url)?;
        let attempts = max_retries.max(1);

        for attempt in 0..attempts {
            let last = attempt + 1 == attempts;
            let response = self
                .client
                .get(data_url.clone())
                .timeout(timeout)
                .send()
                .await;

            let transport_error = match response {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if last {
                        return Err(Error::fetch(
                            FetchErrorKind::RateLimited,
                            format!("{} still rate limited after {} attempts", data_url, attempts),
                        ));
                    }
                    let delay = self.config.rate_limit_base_delay * (attempt + 1);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    sleep(delay).await;
                    continue;
                }
                Ok(resp) if !resp.status().is_success() => {
                    let status = resp.status();
                    return Err(Error::fetch(
                        FetchErrorKind::BadStatus(status.as_u16()),
                        format!("{} returned {}", data_url, status),
                    ));
                }
                Ok(resp) => match resp.bytes().await {
                    Ok(body) => {
                        debug!(bytes = body.len(), "Fetched thread payload");
                        return parse_thread_payload(url, &body);
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };

            if last {
                return Err(Error::fetch(
                    FetchErrorKind::Network,
                    format!("{} failed after {} attempts: {}", data_url, attempts, transport_error),
                ));
            }
            warn!(
                attempt = attempt + 1,
                error = %transport_error,
                "Network failure, retrying"
            );
            sleep(self.config.network_backoff).await;
        }

        Err(Error::Internal("fetch loop ended without a result".into()))
    }
}

/// Whether `host` is one of the public discussion hosts or a subdomain of one.
pub fn is_thread_host(host: &str, allowed: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    allowed
        .iter()
        .any(|a| host == *a || host.ends_with(&format!(".{}", a)))
}

fn is_public_thread_host(host: &str) -> bool {
    let allowed: Vec<String> = ALLOWED_THREAD_HOSTS.iter().map(|h| h.to_string()).collect();
    is_thread_host(host, &allowed)
}

/// Upgrade plain-http public thread hosts to https.
pub(crate) fn upgrade_scheme(url: &mut Url) {
    let public = url.host_str().map(is_public_thread_host).unwrap_or(false);
    if url.scheme() == "http" && public {
        // http -> https is always a permitted scheme change
        let _ = url.set_scheme("https");
    }
}

/// Structured-data URL for a thread: query and fragment removed, trailing
/// slash removed, `.json` appended.
pub fn to_data_url(url: &str) -> Result<Url> {
    let mut parsed = Url::parse(url.trim())
        .map_err(|e| Error::InvalidInput(format!("Invalid thread URL '{}': {}", url, e)))?;
    parsed.set_query(None);
    parsed.set_fragment(None);
    upgrade_scheme(&mut parsed);

    let path = parsed.path().trim_end_matches('/').to_string();
    if !path.ends_with(FETCH_DATA_SUFFIX) {
        parsed.set_path(&format!("{}{}", path, FETCH_DATA_SUFFIX));
    }
    Ok(parsed)
}

/// Decode an upstream body into post metadata plus the raw comment listing.
///
/// Only a body that is not JSON at all is an error. A missing post listing
/// yields [`PostMetadata::unknown`]; missing fields default individually.
pub fn parse_thread_payload(source_url: &str, body: &[u8]) -> Result<ThreadPayload> {
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|e| Error::Parse(format!("Thread payload is not JSON: {}", e)))?;

    let (post_listing, comments) = match value {
        JsonValue::Array(mut parts) => {
            let comments = if parts.len() > 1 {
                parts.swap_remove(1)
            } else {
                JsonValue::Null
            };
            (parts.into_iter().next().unwrap_or(JsonValue::Null), comments)
        }
        other => {
            warn!(kind = json_kind(&other), "Unexpected thread payload shape");
            (JsonValue::Null, JsonValue::Null)
        }
    };

    let post = post_listing
        .pointer("/data/children/0/data")
        .map(post_metadata)
        .unwrap_or_else(PostMetadata::unknown);

    Ok(ThreadPayload {
        source_url: source_url.to_string(),
        post,
        comments,
    })
}

fn post_metadata(data: &JsonValue) -> PostMetadata {
    let text = |key: &str| {
        data.get(key)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    PostMetadata {
        title: text("title"),
        subreddit: text("subreddit"),
        author: text("author"),
        created_utc: data
            .get("created_utc")
            .and_then(JsonValue::as_f64)
            .unwrap_or(0.0),
        num_comments: lenient_i64(data.get("num_comments")),
        score: lenient_i64(data.get("score")),
        selftext: text("selftext"),
    }
}

/// Integer field that upstream sometimes sends as a float.
pub(crate) fn lenient_i64(value: Option<&JsonValue>) -> i64 {
    match value {
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        None => 0,
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
