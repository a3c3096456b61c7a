//! The single normalization → aggregation → ranking pipeline.
//!
//! Every ranking strategy, cached or not, ends up here; they differ only in
//! when they call it and what they keep afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::aggregator::{aggregate, resolve_weight};
use crate::config::ScoringPolicy;
use crate::error::Result;
use crate::model::{
    AttemptRecord, Category, ModuleScore, RankingSnapshot, Scope, SourceStrategy, Standing,
    StudentProfile,
};
use crate::normalizer::normalize_module;
use crate::ranker::assign_ranks;
use crate::traits::{with_timeout, AttemptStore};

/// Students whose attempts are fetched concurrently.
const FETCH_PARALLELISM: usize = 16;

/// Computes standings and snapshots straight from the attempt store.
pub struct RankingPipeline {
    store: Arc<dyn AttemptStore>,
    policy: ScoringPolicy,
    store_timeout: Duration,
    defaulted_weights: AtomicU64,
}

impl RankingPipeline {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        policy: ScoringPolicy,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            store_timeout,
            defaulted_weights: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn AttemptStore> {
        &self.store
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Number of times a module weight fell back to the default.
    pub fn defaulted_weight_uses(&self) -> u64 {
        self.defaulted_weights.load(Ordering::Relaxed)
    }

    /// Normalized score for every module in the policy, weights filled in.
    pub async fn module_scores(&self, student_id: &str) -> Result<Vec<ModuleScore>> {
        let attempts = with_timeout(
            self.store_timeout,
            self.store.attempts_by_student(student_id),
        )
        .await?;
        self.score_attempts(student_id, attempts)
    }

    fn score_attempts(
        &self,
        student_id: &str,
        attempts: Vec<AttemptRecord>,
    ) -> Result<Vec<ModuleScore>> {
        let mut by_module: HashMap<String, Vec<AttemptRecord>> = HashMap::new();
        for attempt in attempts {
            by_module
                .entry(attempt.module_id.clone())
                .or_default()
                .push(attempt);
        }

        self.policy
            .modules
            .iter()
            .map(|module_id| {
                let attempts = by_module.get(module_id).map(Vec::as_slice).unwrap_or(&[]);
                let mut score = normalize_module(
                    student_id,
                    module_id,
                    attempts,
                    self.policy.passing_threshold,
                )?;
                score.weight = resolve_weight(&self.policy, module_id).0;
                Ok(score)
            })
            .collect()
    }

    /// Aggregated standing of one student.
    pub async fn standing(&self, profile: &StudentProfile) -> Result<Standing> {
        let scores = self.module_scores(&profile.student_id).await?;
        let standing = aggregate(profile, &scores, &self.policy);
        if !standing.defaulted_weights.is_empty() {
            self.defaulted_weights
                .fetch_add(standing.defaulted_weights.len() as u64, Ordering::Relaxed);
        }
        Ok(standing)
    }

    /// Unranked standings of every student in `scope`, evaluated at `now`.
    pub async fn standings(&self, scope: &Scope, now: DateTime<Utc>) -> Result<Vec<Standing>> {
        let roster = with_timeout(self.store_timeout, self.store.roster(scope)).await?;

        let standings: Vec<Standing> = stream::iter(roster)
            .map(|profile| async move { self.standing(&profile).await })
            .buffer_unordered(FETCH_PARALLELISM)
            .try_collect()
            .await?;

        Ok(match scope {
            Scope::Category(category) => standings
                .into_iter()
                .filter(|s| in_category(s, *category, now, self.policy.active_window_days))
                .collect(),
            Scope::Global | Scope::Class(_) => standings,
        })
    }

    /// Build a ranked snapshot of `scope`.
    ///
    /// `previous` supplies the rank deltas and the version the new snapshot
    /// follows; without it every entry is `new` and the version starts at 1.
    pub async fn snapshot(
        &self,
        scope: &Scope,
        previous: Option<&RankingSnapshot>,
        source_strategy: SourceStrategy,
        generated_at: DateTime<Utc>,
    ) -> Result<RankingSnapshot> {
        let standings = self.standings(scope, generated_at).await?;

        let previous_ranks: HashMap<String, u32> = previous
            .map(|snap| {
                snap.entries
                    .iter()
                    .map(|e| (e.student_id.clone(), e.rank))
                    .collect()
            })
            .unwrap_or_default();

        Ok(RankingSnapshot {
            scope: scope.clone(),
            entries: assign_ranks(standings, &previous_ranks, scope, generated_at),
            generated_at,
            version: previous.map_or(1, |snap| snap.version + 1),
            source_strategy,
        })
    }
}

/// Whether a standing belongs to a derived category at `now`.
pub fn in_category(
    standing: &Standing,
    category: Category,
    now: DateTime<Utc>,
    active_window_days: i64,
) -> bool {
    match category {
        Category::Active => is_active(standing.last_activity, now, active_window_days),
        Category::Beginners => standing.overall_progress_pct < 25,
        Category::Intermediate => (25..75).contains(&standing.overall_progress_pct),
        Category::Advanced => standing.overall_progress_pct >= 75,
    }
}

/// Activity within the last `window_days` days.
pub fn is_active(
    last_activity: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_days: i64,
) -> bool {
    last_activity.is_some_and(|t| t >= now - chrono::Duration::days(window_days))
}
