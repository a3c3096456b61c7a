//! Dashboard and operations facade over the cache, submitter and harness.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{
    CacheStats, RegenerationReport, SnapshotCache, StalenessWarning, SubscriptionId,
};
use crate::config::{CacheConfig, ScoringPolicy, SubmissionConfig};
use crate::error::Result;
use crate::harness::{BenchmarkReport, ConsistencyReport, Harness};
use crate::model::{AttemptRecord, RankingEntry, RankingSnapshot, Scope};
use crate::pipeline::RankingPipeline;
use crate::statistics::{ranking_stats, RankingStats};
use crate::submission::{SubmissionOutcome, Submitter};
use crate::traits::{with_timeout, AttemptStore};

/// Rows on either side of a student returned by
/// [`StandingsService::get_nearby_rankings`] when no range is given.
pub const DEFAULT_NEARBY_RANGE: usize = 5;

/// The top of a ranking as shown on a dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingPage {
    pub scope: Scope,
    /// Entries ordered by rank, starting at 1.
    pub entries: Vec<RankingEntry>,
    /// Size of the whole ranking, not just this page.
    pub total_students: usize,
    pub generated_at: DateTime<Utc>,
    pub version: u64,
    pub stale: bool,
    pub warning: Option<StalenessWarning>,
}

/// A student's place within one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRank {
    pub rank: u32,
    pub total_students: usize,
    pub percentile: u32,
}

/// The rows around one student.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Nearby {
    /// Better-ranked neighbours, closest last.
    pub above: Vec<RankingEntry>,
    pub current: Option<RankingEntry>,
    /// Worse-ranked neighbours, closest first.
    pub below: Vec<RankingEntry>,
}

fn nearby(snapshot: &RankingSnapshot, student_id: &str, range: usize) -> Nearby {
    let Some(index) = snapshot.position_of(student_id) else {
        return Nearby::default();
    };
    let entries = &snapshot.entries;
    let below_end = index
        .saturating_add(1)
        .saturating_add(range)
        .min(entries.len());
    Nearby {
        above: entries[index.saturating_sub(range)..index].to_vec(),
        current: Some(entries[index].clone()),
        below: entries[index + 1..below_end].to_vec(),
    }
}

/// Everything dashboards and operators call, wired over one store.
pub struct StandingsService {
    cache: Arc<SnapshotCache>,
    submitter: Submitter,
    harness: Harness,
}

impl StandingsService {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        policy: ScoringPolicy,
        cache_config: CacheConfig,
        submission: SubmissionConfig,
    ) -> Self {
        let pipeline = Arc::new(RankingPipeline::new(
            store,
            policy,
            cache_config.store_timeout(),
        ));
        let cache = Arc::new(SnapshotCache::new(pipeline, cache_config));
        Self {
            submitter: Submitter::new(Arc::clone(&cache), submission),
            harness: Harness::standard(&cache),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn policy(&self) -> &ScoringPolicy {
        self.cache.pipeline().policy()
    }

    /// Top `limit` entries of `scope`.
    pub async fn get_ranking(&self, scope: &Scope, limit: usize) -> Result<RankingPage> {
        let served = self.cache.get(scope, false).await?;
        let snapshot = &served.snapshot;
        Ok(RankingPage {
            scope: scope.clone(),
            entries: snapshot.top(limit).to_vec(),
            total_students: snapshot.len(),
            generated_at: snapshot.generated_at,
            version: snapshot.version,
            stale: served.stale,
            warning: served.warning,
        })
    }

    /// `None` when the student is not ranked in `scope`.
    pub async fn get_student_rank(
        &self,
        student_id: &str,
        scope: &Scope,
    ) -> Result<Option<StudentRank>> {
        let served = self.cache.get(scope, false).await?;
        let snapshot = &served.snapshot;
        Ok(snapshot.entry_for(student_id).map(|entry| StudentRank {
            rank: entry.rank,
            total_students: snapshot.len(),
            percentile: entry.percentile,
        }))
    }

    /// Up to `range` rows either side of the student in the global ranking.
    pub async fn get_nearby_rankings(&self, student_id: &str, range: usize) -> Result<Nearby> {
        self.nearby_in(&Scope::Global, student_id, range).await
    }

    /// Up to `range` rows either side of the student within `scope`.
    pub async fn nearby_in(
        &self,
        scope: &Scope,
        student_id: &str,
        range: usize,
    ) -> Result<Nearby> {
        let served = self.cache.get(scope, false).await?;
        Ok(nearby(&served.snapshot, student_id, range))
    }

    pub fn subscribe<F>(&self, scope: Scope, callback: F) -> SubscriptionId
    where
        F: Fn(&RankingSnapshot) + Send + Sync + 'static,
    {
        self.cache.subscribe(scope, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.cache.unsubscribe(id)
    }

    pub async fn submit(&self, attempt: AttemptRecord) -> Result<SubmissionOutcome> {
        self.submitter.submit(attempt).await
    }

    pub fn invalidate(&self, scope: &Scope) -> bool {
        self.cache.invalidate(scope)
    }

    pub async fn regenerate_all(&self) -> Result<RegenerationReport> {
        self.cache.regenerate_all().await
    }

    pub async fn benchmark(&self, scope: &Scope, iterations: u32) -> BenchmarkReport {
        self.harness.benchmark(scope, iterations).await
    }

    /// Benchmark several scopes concurrently.
    pub async fn benchmark_scopes(
        &self,
        scopes: &[Scope],
        iterations: u32,
    ) -> Vec<BenchmarkReport> {
        self.harness.benchmark_scopes(scopes, iterations).await
    }

    /// Global, every class and every category.
    pub async fn known_scopes(&self) -> Result<Vec<Scope>> {
        let pipeline = self.cache.pipeline();
        Ok(with_timeout(pipeline.store_timeout(), pipeline.store().known_scopes()).await?)
    }

    pub async fn validate_consistency(&self, scope: &Scope) -> ConsistencyReport {
        self.harness.validate_consistency(scope).await
    }

    pub async fn ranking_stats(&self, scope: &Scope) -> Result<RankingStats> {
        let served = self.cache.get(scope, false).await?;
        Ok(ranking_stats(
            &served.snapshot,
            Utc::now(),
            self.policy().active_window_days,
        ))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
