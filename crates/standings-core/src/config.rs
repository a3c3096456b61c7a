//! Tunables for scoring, caching and attempt submission.
//!
//! These types are plain data with serde defaults; loading them from disk is
//! the job of `standings-store::config`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How attempts become module scores and module scores become standings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Best-attempt percentage at or above which a module counts as completed.
    #[serde(default = "default_passing_threshold")]
    pub passing_threshold: u8,
    /// Weighted score a fully-completed student must exceed to reach Expert.
    #[serde(default = "default_elite_threshold")]
    pub elite_threshold: u32,
    /// Modules every student is scored on, in display order.
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,
    /// Per-module weights. Unlisted modules use `default_weight`.
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, u32>,
    #[serde(default = "default_weight")]
    pub default_weight: u32,
    /// Days of inactivity after which a student leaves the `active` category.
    #[serde(default = "default_active_window_days")]
    pub active_window_days: i64,
}

fn default_passing_threshold() -> u8 {
    70
}
fn default_elite_threshold() -> u32 {
    85
}
fn default_modules() -> Vec<String> {
    (1..=4).map(|i| format!("module{i}")).collect()
}
fn default_weights() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("module1".to_string(), 70),
        ("module2".to_string(), 30),
        ("module3".to_string(), 100),
        ("module4".to_string(), 100),
    ])
}
fn default_weight() -> u32 {
    100
}
fn default_active_window_days() -> i64 {
    7
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            passing_threshold: default_passing_threshold(),
            elite_threshold: default_elite_threshold(),
            modules: default_modules(),
            weights: default_weights(),
            default_weight: default_weight(),
            active_window_days: default_active_window_days(),
        }
    }
}

/// Pre-aggregation cache behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Deadline for each individual store call.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Deadline for regenerating one scope, all of its store calls included.
    #[serde(default = "default_regeneration_timeout_ms")]
    pub regeneration_timeout_ms: u64,
    /// Snapshots older than this are served with a staleness warning.
    #[serde(default = "default_staleness_threshold_secs")]
    pub staleness_threshold_secs: u64,
    /// Lifetime of entries in the short-lived read cache strategy.
    #[serde(default = "default_read_cache_ttl_ms")]
    pub read_cache_ttl_ms: u64,
    /// Scopes regenerated concurrently by `regenerate_all`.
    #[serde(default = "default_regeneration_parallelism")]
    pub regeneration_parallelism: usize,
}

fn default_store_timeout_ms() -> u64 {
    5_000
}
fn default_regeneration_timeout_ms() -> u64 {
    60_000
}
fn default_staleness_threshold_secs() -> u64 {
    300
}
fn default_read_cache_ttl_ms() -> u64 {
    2_000
}
fn default_regeneration_parallelism() -> usize {
    4
}

impl CacheConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn regeneration_timeout(&self) -> Duration {
        Duration::from_millis(self.regeneration_timeout_ms)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn read_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.read_cache_ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            regeneration_timeout_ms: default_regeneration_timeout_ms(),
            staleness_threshold_secs: default_staleness_threshold_secs(),
            read_cache_ttl_ms: default_read_cache_ttl_ms(),
            regeneration_parallelism: default_regeneration_parallelism(),
        }
    }
}

/// Optimistic-retry budget for attempt submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    20
}

impl SubmissionConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}
