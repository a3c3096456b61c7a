//! Interchangeable ranking backends.
//!
//! All three run the same pipeline; they differ in what they remember
//! between requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use crate::cache::SnapshotCache;
use crate::error::Result;
use crate::model::{RankingSnapshot, Scope, SourceStrategy};
use crate::pipeline::RankingPipeline;

/// A way of producing a ranking snapshot for a scope.
#[async_trait]
pub trait RankingBackend: Send + Sync {
    fn strategy(&self) -> SourceStrategy;

    async fn ranking(&self, scope: &Scope) -> Result<Arc<RankingSnapshot>>;
}

/// Full aggregation on every request.
pub struct OnDemandBackend {
    pipeline: Arc<RankingPipeline>,
}

impl OnDemandBackend {
    pub fn new(pipeline: Arc<RankingPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl RankingBackend for OnDemandBackend {
    fn strategy(&self) -> SourceStrategy {
        SourceStrategy::OnDemand
    }

    async fn ranking(&self, scope: &Scope) -> Result<Arc<RankingSnapshot>> {
        let snapshot = self
            .pipeline
            .snapshot(scope, None, SourceStrategy::OnDemand, Utc::now())
            .await?;
        Ok(Arc::new(snapshot))
    }
}

/// On-demand aggregation behind a short-lived, time-expired read cache.
///
/// Entries are never invalidated explicitly; they simply expire after the
/// TTL.
pub struct ReadCachedBackend {
    pipeline: Arc<RankingPipeline>,
    ttl: Duration,
    entries: tokio::sync::Mutex<HashMap<Scope, (Instant, Arc<RankingSnapshot>)>>,
}

impl ReadCachedBackend {
    pub fn new(pipeline: Arc<RankingPipeline>, ttl: Duration) -> Self {
        Self {
            pipeline,
            ttl,
            entries: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[async_trait]
impl RankingBackend for ReadCachedBackend {
    fn strategy(&self) -> SourceStrategy {
        SourceStrategy::ReadCached
    }

    async fn ranking(&self, scope: &Scope) -> Result<Arc<RankingSnapshot>> {
        // Held across the computation so concurrent misses compute once.
        let mut entries = self.entries.lock().await;
        if let Some((stored_at, snapshot)) = entries.get(scope) {
            if stored_at.elapsed() < self.ttl {
                return Ok(Arc::clone(snapshot));
            }
        }

        let previous = entries.get(scope).map(|(_, snap)| Arc::clone(snap));
        let snapshot = Arc::new(
            self.pipeline
                .snapshot(
                    scope,
                    previous.as_deref(),
                    SourceStrategy::ReadCached,
                    Utc::now(),
                )
                .await?,
        );
        entries.insert(scope.clone(), (Instant::now(), Arc::clone(&snapshot)));
        Ok(snapshot)
    }
}

/// Served from the pre-aggregation cache.
pub struct PreAggregatedBackend {
    cache: Arc<SnapshotCache>,
}

impl PreAggregatedBackend {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RankingBackend for PreAggregatedBackend {
    fn strategy(&self) -> SourceStrategy {
        SourceStrategy::PreAggregated
    }

    async fn ranking(&self, scope: &Scope) -> Result<Arc<RankingSnapshot>> {
        let served = self.cache.get(scope, false).await?;
        if served.stale {
            tracing::warn!(scope = %scope, "pre-aggregated backend returned a stale snapshot");
        }
        Ok(served.snapshot)
    }
}

/// The three standard backends over one pipeline and cache, in
/// [`SourceStrategy::ALL`] order.
pub fn standard_backends(cache: &Arc<SnapshotCache>) -> Vec<Arc<dyn RankingBackend>> {
    let pipeline = Arc::clone(cache.pipeline());
    let ttl = cache.config().read_cache_ttl();
    vec![
        Arc::new(OnDemandBackend::new(Arc::clone(&pipeline))),
        Arc::new(ReadCachedBackend::new(pipeline, ttl)),
        Arc::new(PreAggregatedBackend::new(Arc::clone(cache))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, ScoringPolicy};
    use crate::testing::FixtureStore;

    fn setup() -> (Arc<FixtureStore>, Arc<SnapshotCache>) {
        let store = Arc::new(
            FixtureStore::new()
                .student("a", &["c1"])
                .student("b", &["c1"])
                .attempt("a", "module1", 70.0, 0)
                .attempt("b", "module3", 90.0, 0),
        );
        let pipeline = Arc::new(RankingPipeline::new(
            store.clone(),
            ScoringPolicy::default(),
            Duration::from_secs(1),
        ));
        let cache = Arc::new(SnapshotCache::new(pipeline, CacheConfig::default()));
        (store, cache)
    }

    #[tokio::test]
    async fn backends_agree_and_tag_their_strategy() {
        let (_, cache) = setup();
        let backends = standard_backends(&cache);
        let strategies: Vec<SourceStrategy> = backends.iter().map(|b| b.strategy()).collect();
        assert_eq!(strategies, SourceStrategy::ALL.to_vec());

        let mut orders = Vec::new();
        for backend in &backends {
            let snap = backend.ranking(&Scope::Global).await.unwrap();
            assert_eq!(snap.source_strategy, backend.strategy());
            orders.push(
                snap.entries
                    .iter()
                    .map(|e| (e.student_id.clone(), e.total_weighted_score))
                    .collect::<Vec<_>>(),
            );
        }
        assert!(orders.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(orders[0][0].0, "b");
    }

    #[tokio::test]
    async fn on_demand_hits_the_store_every_time() {
        let (store, cache) = setup();
        let backend = OnDemandBackend::new(Arc::clone(cache.pipeline()));
        backend.ranking(&Scope::Global).await.unwrap();
        backend.ranking(&Scope::Global).await.unwrap();
        assert_eq!(store.roster_calls(), 2);
    }

    #[tokio::test]
    async fn read_cache_reuses_until_ttl() {
        let (store, cache) = setup();
        let backend =
            ReadCachedBackend::new(Arc::clone(cache.pipeline()), Duration::from_secs(60));
        let first = backend.ranking(&Scope::Global).await.unwrap();
        let second = backend.ranking(&Scope::Global).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.roster_calls(), 1);

        backend.clear().await;
        backend.ranking(&Scope::Global).await.unwrap();
        assert_eq!(store.roster_calls(), 2);

        let expired = ReadCachedBackend::new(Arc::clone(cache.pipeline()), Duration::ZERO);
        let one = expired.ranking(&Scope::Global).await.unwrap();
        let two = expired.ranking(&Scope::Global).await.unwrap();
        assert_eq!(two.version, one.version + 1);
    }
}
