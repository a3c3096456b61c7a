//! Scripted store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use standings_core::error::StoreError;
use standings_core::model::{AttemptRecord, Scope, StudentProfile};
use standings_core::traits::{AttemptStore, VersionedAttempts};

use crate::memory::{Dataset, InMemoryStore};

/// An in-memory store whose latency, failures and write conflicts can be
/// scripted, for exercising the cache and submission paths.
pub struct ScriptedStore {
    inner: InMemoryStore,
    latency_ms: AtomicU64,
    unavailable: AtomicBool,
    /// Calls that fail before the store recovers on its own.
    failures_left: AtomicU32,
    forced_conflicts: AtomicU32,
    calls: Mutex<HashMap<&'static str, u32>>,
}

impl ScriptedStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            inner: InMemoryStore::from_dataset(dataset),
            latency_ms: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            failures_left: AtomicU32::new(0),
            forced_conflicts: AtomicU32::new(0),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail every call until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` calls, whatever they are.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Reject the next `n` appends with a version conflict.
    pub fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Number of calls made to one trait method, by method name.
    pub fn call_count(&self, method: &str) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    async fn enter(&self, method: &'static str) -> Result<(), StoreError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(method)
            .or_default() += 1;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted outage".into()));
        }
        if take_one(&self.failures_left) {
            return Err(StoreError::Unavailable(format!("scripted failure in {method}")));
        }
        Ok(())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl AttemptStore for ScriptedStore {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn attempts_for(
        &self,
        student_id: &str,
        module_id: &str,
    ) -> Result<VersionedAttempts, StoreError> {
        self.enter("attempts_for").await?;
        self.inner.attempts_for(student_id, module_id).await
    }

    async fn attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttemptRecord>, StoreError> {
        self.enter("attempts_by_student").await?;
        self.inner.attempts_by_student(student_id).await
    }

    async fn append_attempt(
        &self,
        attempt: AttemptRecord,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.enter("append_attempt").await?;
        if take_one(&self.forced_conflicts) {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.inner.append_attempt(attempt, expected_version).await
    }

    async fn roster(&self, scope: &Scope) -> Result<Vec<StudentProfile>, StoreError> {
        self.enter("roster").await?;
        self.inner.roster(scope).await
    }

    async fn student(&self, student_id: &str) -> Result<StudentProfile, StoreError> {
        self.enter("student").await?;
        self.inner.student(student_id).await
    }

    async fn class_ids(&self) -> Result<Vec<String>, StoreError> {
        self.enter("class_ids").await?;
        self.inner.class_ids().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use standings_core::cache::SnapshotCache;
    use standings_core::config::{CacheConfig, ScoringPolicy, SubmissionConfig};
    use standings_core::error::StandingsError;
    use standings_core::pipeline::RankingPipeline;
    use standings_core::submission::Submitter;

    fn store() -> ScriptedStore {
        ScriptedStore::new(Dataset::sample(
            Utc.with_ymd_and_hms(2025, 4, 10, 12, 0, 0).unwrap(),
        ))
    }

    fn cache_over(store: Arc<ScriptedStore>, config: CacheConfig) -> Arc<SnapshotCache> {
        let pipeline = Arc::new(RankingPipeline::new(
            store,
            ScoringPolicy::default(),
            config.store_timeout(),
        ));
        Arc::new(SnapshotCache::new(pipeline, config))
    }

    #[tokio::test]
    async fn counts_calls_per_method() {
        let store = store();
        store.roster(&Scope::Global).await.unwrap();
        store.roster(&Scope::class("turma-a")).await.unwrap();
        store.student("ana.souza").await.unwrap();
        assert_eq!(store.call_count("roster"), 2);
        assert_eq!(store.call_count("student"), 1);
        assert_eq!(store.call_count("append_attempt"), 0);
        assert_eq!(store.total_calls(), 3);
    }

    #[tokio::test]
    async fn scripted_failures_recover() {
        let store = store();
        store.fail_next(2);
        assert!(store.class_ids().await.is_err());
        assert!(store.class_ids().await.is_err());
        assert_eq!(store.class_ids().await.unwrap(), ["turma-a", "turma-b"]);

        store.set_unavailable(true);
        let err = store.student("ana.souza").await.unwrap_err();
        assert!(!err.is_permanent());
        store.set_unavailable(false);
        assert!(store.student("ana.souza").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_to_stale_snapshot() {
        let store = Arc::new(store());
        let cache = cache_over(
            Arc::clone(&store),
            CacheConfig {
                store_timeout_ms: 100,
                ..CacheConfig::default()
            },
        );

        let first = cache.get(&Scope::Global, false).await.unwrap();
        assert!(!first.stale);

        store.set_latency(Duration::from_secs(5));
        cache.invalidate(&Scope::Global);
        let served = cache.get(&Scope::Global, false).await.unwrap();
        assert!(served.stale);
        assert_eq!(served.snapshot.version, first.snapshot.version);
        assert!(served.warning.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn forced_conflicts_drive_submission_retries() {
        let store = Arc::new(store());
        let cache = cache_over(Arc::clone(&store), CacheConfig::default());
        let submitter = Submitter::new(cache, SubmissionConfig::default());

        let attempt = AttemptRecord {
            student_id: "elisa.melo".into(),
            module_id: "module1".into(),
            raw_score: 15.0,
            max_score: 20.0,
            timestamp: Utc.with_ymd_and_hms(2025, 4, 10, 13, 0, 0).unwrap(),
            attempt_index: 0,
        };

        store.force_conflicts(1);
        let outcome = submitter.submit(attempt.clone()).await.unwrap();
        assert_eq!(outcome.tries, 2);
        assert!(outcome.newly_completed);
        assert_eq!(store.call_count("append_attempt"), 2);

        store.force_conflicts(10);
        let err = submitter.submit(attempt).await.unwrap_err();
        assert!(matches!(err, StandingsError::Concurrency { attempts: 3, .. }));
    }
}
