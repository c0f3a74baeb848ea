//! Connection pool sized for the worker pool.
//!
//! Every worker slot may hold one connection while it claims or transitions
//! a job, and the API handlers need a few more for submissions and status
//! polls. The pool is sized from the slot count so a busy worker pool never
//! starves status reads.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use threadlens_core::defaults::JOB_MAX_CONCURRENT;
use threadlens_core::{Error, Result};

/// Connections reserved for API handlers on top of the worker slots.
pub const API_CONNECTION_HEADROOM: u32 = 4;

const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub worker_slots: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_worker_slots(JOB_MAX_CONCURRENT)
    }
}

impl PoolConfig {
    /// One connection per slot plus [`API_CONNECTION_HEADROOM`].
    pub fn for_worker_slots(slots: usize) -> Self {
        let worker_slots = u32::try_from(slots.max(1)).unwrap_or(u32::MAX);
        Self {
            worker_slots,
            max_connections: worker_slots.saturating_add(API_CONNECTION_HEADROOM),
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }

    /// Smallest pool that still leaves the API one connection.
    pub fn min_connections_required(&self) -> u32 {
        self.worker_slots.saturating_add(1)
    }

    /// Cap the pool size. Values below
    /// [`min_connections_required`](Self::min_connections_required) are raised.
    pub fn with_max_connections(mut self, n: u32) -> Self {
        let floor = self.min_connections_required();
        if n < floor {
            warn!(
                subsystem = "database",
                component = "pool",
                requested = n,
                worker_slots = self.worker_slots,
                max_connections = floor,
                "Pool smaller than worker slots, raising"
            );
        }
        self.max_connections = n.max(floor);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Configuration from the environment.
    ///
    /// | Variable | Default | Meaning |
    /// |----------|---------|---------|
    /// | `JOB_MAX_CONCURRENT` | `4` | Worker slots the pool must serve |
    /// | `DB_MAX_CONNECTIONS` | slots + 4 | Pool cap, never below slots + 1 |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `30` | Wait for a free connection |
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let slots = var("JOB_MAX_CONCURRENT")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(JOB_MAX_CONCURRENT);
        let mut config = Self::for_worker_slots(slots);

        if let Some(n) = var("DB_MAX_CONNECTIONS").and_then(|v| v.parse::<u32>().ok()) {
            config = config.with_max_connections(n);
        }
        if let Some(secs) = var("DB_ACQUIRE_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config = config.with_acquire_timeout(Duration::from_secs(secs));
        }
        config
    }
}

/// Open a pool with the default sizing.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        worker_slots = config.worker_slots,
        max_connections = config.max_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_sized_from_worker_slots() {
        let config = PoolConfig::default();
        assert_eq!(config.worker_slots, JOB_MAX_CONCURRENT as u32);
        assert_eq!(
            config.max_connections,
            JOB_MAX_CONCURRENT as u32 + API_CONNECTION_HEADROOM
        );
    }

    #[test]
    fn test_slot_count_from_env_drives_pool_size() {
        let config = PoolConfig::from_vars(vars(&[("JOB_MAX_CONCURRENT", "12")]));
        assert_eq!(config.worker_slots, 12);
        assert_eq!(config.max_connections, 16);
    }

    #[test]
    fn test_cap_below_slots_is_raised() {
        let config = PoolConfig::from_vars(vars(&[
            ("JOB_MAX_CONCURRENT", "8"),
            ("DB_MAX_CONNECTIONS", "3"),
        ]));
        assert_eq!(config.max_connections, 9);
    }

    #[test]
    fn test_cap_above_floor_is_kept() {
        let config = PoolConfig::for_worker_slots(2).with_max_connections(20);
        assert_eq!(config.max_connections, 20);
    }

    #[test]
    fn test_zero_slots_treated_as_one() {
        let config = PoolConfig::for_worker_slots(0);
        assert_eq!(config.worker_slots, 1);
        assert_eq!(config.min_connections_required(), 2);
    }

    #[test]
    fn test_acquire_timeout_override_and_garbage_ignored() {
        let config = PoolConfig::from_vars(vars(&[
            ("DB_ACQUIRE_TIMEOUT_SECS", "5"),
            ("DB_MAX_CONNECTIONS", "lots"),
        ]));
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(
            config.max_connections,
            JOB_MAX_CONCURRENT as u32 + API_CONNECTION_HEADROOM
        );
    }
}
