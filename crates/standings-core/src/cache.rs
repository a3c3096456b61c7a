//! Pre-aggregation cache of ranking snapshots.
//!
//! The cache keeps one slot per scope. A slot holds the latest snapshot, an
//! invalidation flag and an async regeneration lock:
//!
//! - Reads of a valid slot take a short read lock and never wait on other
//!   scopes or on regenerations.
//! - Regenerations of one scope are serialized by the slot's lock. Callers
//!   that queued behind a regeneration reuse its outcome instead of running
//!   another one, so a burst of reads after an invalidation costs a single
//!   pipeline run.
//! - Invalidation only flags the slot. The old snapshot stays in place and
//!   is served, marked stale, if the next regeneration fails or times out.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::CacheConfig;
use crate::error::{Result, StandingsError};
use crate::model::{RankingSnapshot, Scope, SourceStrategy};
use crate::pipeline::RankingPipeline;
use crate::traits::with_timeout;

/// Why a served snapshot is flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StaleReason {
    /// Regeneration failed; this is the last good snapshot.
    RegenerationFailed(String),
    /// The snapshot is valid but older than the staleness threshold.
    OlderThanThreshold,
}

/// Non-fatal notice attached to a cache read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessWarning {
    pub scope: Scope,
    pub last_updated: DateTime<Utc>,
    pub age_secs: i64,
    pub reason: StaleReason,
}

impl fmt::Display for StalenessWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ranking for {} last updated at {}",
            self.scope,
            self.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        match &self.reason {
            StaleReason::RegenerationFailed(reason) => write!(f, " (refresh failed: {reason})"),
            StaleReason::OlderThanThreshold => write!(f, " ({}s old)", self.age_secs),
        }
    }
}

/// A snapshot as served by the cache.
#[derive(Debug, Clone)]
pub struct CachedRanking {
    pub snapshot: Arc<RankingSnapshot>,
    /// Set when the snapshot is a fallback for a failed regeneration.
    pub stale: bool,
    pub warning: Option<StalenessWarning>,
}

/// Outcome of a batch regeneration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub regenerated: Vec<Scope>,
    pub errors: Vec<ScopeFailure>,
    pub duration_ms: u64,
}

/// A scope whose regeneration failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFailure {
    pub scope: Scope,
    pub reason: String,
}

impl fmt::Display for ScopeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.reason)
    }
}

/// Handle returned by [`SnapshotCache::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&RankingSnapshot) + Send + Sync>;

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    regenerations: AtomicU64,
    regeneration_failures: AtomicU64,
    coalesced: AtomicU64,
    stale_serves: AtomicU64,
    invalidations: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub regenerations: u64,
    pub regeneration_failures: u64,
    /// Reads that waited on another caller's regeneration.
    pub coalesced: u64,
    pub stale_serves: u64,
    pub invalidations: u64,
    pub defaulted_weights: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    snapshot: Option<Arc<RankingSnapshot>>,
    invalidated: bool,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct ScopeSlot {
    state: RwLock<SlotState>,
    regen: tokio::sync::Mutex<()>,
    /// Bumped after every finished regeneration, successful or not.
    generation: AtomicU64,
    /// Bumped by every invalidation, under the state write lock.
    invalidations: AtomicU64,
}

impl ScopeSlot {
    fn read(&self) -> RwLockReadGuard<'_, SlotState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SlotState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn valid_snapshot(&self) -> Option<Arc<RankingSnapshot>> {
        let state = self.read();
        if state.invalidated {
            None
        } else {
            state.snapshot.clone()
        }
    }

    /// Outcome of the most recent regeneration.
    fn last_outcome(&self) -> Resolved {
        let state = self.read();
        match (&state.last_error, &state.snapshot) {
            (None, Some(snapshot)) => Resolved::Ready(Arc::clone(snapshot)),
            (Some(reason), fallback) => Resolved::Failed {
                fallback: fallback.clone(),
                reason: reason.clone(),
            },
            (None, None) => Resolved::Failed {
                fallback: None,
                reason: "no snapshot available".into(),
            },
        }
    }
}

enum Resolved {
    Ready(Arc<RankingSnapshot>),
    Failed {
        fallback: Option<Arc<RankingSnapshot>>,
        reason: String,
    },
}

/// Scope-keyed store of immutable ranking snapshots.
pub struct SnapshotCache {
    pipeline: Arc<RankingPipeline>,
    config: CacheConfig,
    slots: RwLock<HashMap<Scope, Arc<ScopeSlot>>>,
    subscribers: Mutex<HashMap<Scope, Vec<(SubscriptionId, Callback)>>>,
    next_subscription: AtomicU64,
    counters: CacheCounters,
}

impl SnapshotCache {
    pub fn new(pipeline: Arc<RankingPipeline>, config: CacheConfig) -> Self {
        Self {
            pipeline,
            config,
            slots: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            counters: CacheCounters::default(),
        }
    }

    pub fn pipeline(&self) -> &Arc<RankingPipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn slot(&self, scope: &Scope) -> Arc<ScopeSlot> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(scope.clone()).or_default())
    }

    /// The stored snapshot for `scope`, valid or not, without regenerating.
    pub fn peek(&self, scope: &Scope) -> Option<Arc<RankingSnapshot>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(scope).and_then(|slot| slot.read().snapshot.clone())
    }

    /// Scopes that currently hold a snapshot, sorted.
    pub fn cached_scopes(&self) -> Vec<Scope> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut scopes: Vec<Scope> = slots
            .iter()
            .filter(|(_, slot)| slot.read().snapshot.is_some())
            .map(|(scope, _)| scope.clone())
            .collect();
        scopes.sort();
        scopes
    }

    /// Serve the snapshot for `scope`, regenerating it when it is missing,
    /// invalidated or `force_refresh` is set.
    ///
    /// A failed regeneration falls back to the previous snapshot flagged
    /// stale; only a scope that never produced a snapshot returns an error.
    pub async fn get(&self, scope: &Scope, force_refresh: bool) -> Result<CachedRanking> {
        match self.resolve(scope, force_refresh).await {
            Resolved::Ready(snapshot) => Ok(self.serve(snapshot, None)),
            Resolved::Failed {
                fallback: Some(snapshot),
                reason,
            } => {
                bump(&self.counters.stale_serves);
                tracing::warn!(
                    scope = %scope,
                    version = snapshot.version,
                    generated_at = %snapshot.generated_at,
                    "serving stale snapshot: {reason}"
                );
                Ok(self.serve(snapshot, Some(reason)))
            }
            Resolved::Failed {
                fallback: None,
                reason,
            } => Err(StandingsError::Regeneration {
                scope: scope.key(),
                reason,
            }),
        }
    }

    async fn resolve(&self, scope: &Scope, force_refresh: bool) -> Resolved {
        let slot = self.slot(scope);
        let seen = slot.generation.load(Ordering::SeqCst);

        if !force_refresh {
            if let Some(snapshot) = slot.valid_snapshot() {
                bump(&self.counters.hits);
                return Resolved::Ready(snapshot);
            }
        }
        bump(&self.counters.misses);

        let _regen = slot.regen.lock().await;

        if slot.generation.load(Ordering::SeqCst) != seen {
            let outcome = slot.last_outcome();
            // A success invalidated again while we waited must not be reused.
            let superseded = matches!(outcome, Resolved::Ready(_)) && slot.read().invalidated;
            if !superseded {
                bump(&self.counters.coalesced);
                return outcome;
            }
        }
        if !force_refresh {
            if let Some(snapshot) = slot.valid_snapshot() {
                bump(&self.counters.coalesced);
                return Resolved::Ready(snapshot);
            }
        }

        self.regenerate(scope, &slot).await
    }

    /// Run the pipeline for `scope`. The caller holds the slot's lock.
    async fn regenerate(&self, scope: &Scope, slot: &ScopeSlot) -> Resolved {
        let (previous, epoch) = {
            let state = slot.read();
            (
                state.snapshot.clone(),
                slot.invalidations.load(Ordering::SeqCst),
            )
        };
        let now = Utc::now();
        let generated_at = match &previous {
            Some(p) if now <= p.generated_at => p.generated_at + chrono::Duration::milliseconds(1),
            _ => now,
        };

        tracing::debug!(scope = %scope, "regenerating snapshot");
        let start = Instant::now();
        let timeout = self.config.regeneration_timeout();
        let result = match tokio::time::timeout(
            timeout,
            self.pipeline.snapshot(
                scope,
                previous.as_deref(),
                SourceStrategy::PreAggregated,
                generated_at,
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StandingsError::Timeout {
                operation: format!("regenerating {scope}"),
                after_ms: timeout.as_millis() as u64,
            }),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                {
                    let mut state = slot.write();
                    state.snapshot = Some(Arc::clone(&snapshot));
                    // Writes invalidated after the pipeline read the store
                    // keep the slot due for another regeneration.
                    state.invalidated = slot.invalidations.load(Ordering::SeqCst) != epoch;
                    state.last_error = None;
                }
                slot.generation.fetch_add(1, Ordering::SeqCst);
                bump(&self.counters.regenerations);
                tracing::info!(
                    scope = %scope,
                    version = snapshot.version,
                    entries = snapshot.len(),
                    elapsed_ms,
                    "snapshot regenerated"
                );
                self.notify(&snapshot);
                Resolved::Ready(snapshot)
            }
            Err(e) => {
                let reason = e.to_string();
                slot.write().last_error = Some(reason.clone());
                slot.generation.fetch_add(1, Ordering::SeqCst);
                bump(&self.counters.regeneration_failures);
                tracing::error!(
                    scope = %scope,
                    elapsed_ms,
                    "snapshot regeneration failed: {reason}"
                );
                Resolved::Failed {
                    fallback: previous,
                    reason,
                }
            }
        }
    }

    fn serve(&self, snapshot: Arc<RankingSnapshot>, failure: Option<String>) -> CachedRanking {
        let age = Utc::now() - snapshot.generated_at;
        let too_old = age
            .to_std()
            .is_ok_and(|age| age > self.config.staleness_threshold());

        let reason = match failure {
            Some(reason) => Some(StaleReason::RegenerationFailed(reason)),
            None if too_old => Some(StaleReason::OlderThanThreshold),
            None => None,
        };
        let stale = matches!(reason, Some(StaleReason::RegenerationFailed(_)));
        let warning = reason.map(|reason| StalenessWarning {
            scope: snapshot.scope.clone(),
            last_updated: snapshot.generated_at,
            age_secs: age.num_seconds(),
            reason,
        });

        CachedRanking {
            snapshot,
            stale,
            warning,
        }
    }

    /// Mark `scope` for regeneration on its next read. Returns `false` when
    /// the scope had no snapshot yet.
    pub fn invalidate(&self, scope: &Scope) -> bool {
        bump(&self.counters.invalidations);
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        match slots.get(scope) {
            Some(slot) => {
                let mut state = slot.write();
                state.invalidated = true;
                slot.invalidations.fetch_add(1, Ordering::SeqCst);
                state.snapshot.is_some()
            }
            None => false,
        }
    }

    pub fn invalidate_many(&self, scopes: &[Scope]) {
        for scope in scopes {
            self.invalidate(scope);
        }
        tracing::debug!(count = scopes.len(), "scopes invalidated");
    }

    /// Regenerate every scope the store knows about.
    ///
    /// Up to `regeneration_parallelism` scopes run at once. A failing scope
    /// is recorded in the report and does not stop the others; only failing
    /// to list the scopes is an error.
    pub async fn regenerate_all(&self) -> Result<RegenerationReport> {
        let start = Instant::now();
        let scopes = with_timeout(
            self.config.store_timeout(),
            self.pipeline.store().known_scopes(),
        )
        .await?;

        let semaphore = Arc::new(Semaphore::new(self.config.regeneration_parallelism.max(1)));
        let mut futures = FuturesUnordered::new();
        for scope in scopes {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = self.resolve(&scope, true).await;
                (scope, outcome)
            });
        }

        let mut report = RegenerationReport::default();
        while let Some((scope, outcome)) = futures.next().await {
            match outcome {
                Resolved::Ready(_) => {
                    report.success_count += 1;
                    report.regenerated.push(scope);
                }
                Resolved::Failed { reason, .. } => {
                    report.failure_count += 1;
                    report.errors.push(ScopeFailure { scope, reason });
                }
            }
        }
        report.regenerated.sort();
        report.errors.sort_by(|a, b| a.scope.cmp(&b.scope));
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            succeeded = report.success_count,
            failed = report.failure_count,
            duration_ms = report.duration_ms,
            "regenerated all scopes"
        );
        Ok(report)
    }

    /// Call `callback` once for every new snapshot of `scope`.
    pub fn subscribe<F>(&self, scope: Scope, callback: F) -> SubscriptionId
    where
        F: Fn(&RankingSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(scope)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        for callbacks in subscribers.values_mut() {
            if let Some(pos) = callbacks.iter().position(|(sid, _)| *sid == id) {
                callbacks.remove(pos);
                return true;
            }
        }
        false
    }

    fn notify(&self, snapshot: &RankingSnapshot) {
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&snapshot.scope)
            .map(|cbs| cbs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(snapshot);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            regenerations: c.regenerations.load(Ordering::Relaxed),
            regeneration_failures: c.regeneration_failures.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            stale_serves: c.stale_serves.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
            defaulted_weights: self.pipeline.defaulted_weight_uses(),
        }
    }
}
