//! Summary statistics over a ranking snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::rounded_pct;
use crate::model::{AchievementTier, RankingSnapshot, Scope};
use crate::pipeline::is_active;

/// Dashboard figures for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingStats {
    pub scope: Scope,
    pub total_students: usize,
    /// Students with activity inside the active window.
    pub active_students: usize,
    /// Mean overall progress, rounded.
    pub average_progress: u32,
    /// Mean weighted score, rounded.
    pub average_score: u32,
    pub top_score: u32,
    /// Percentage of students with every module completed.
    pub completion_rate: u32,
    pub tiers: BTreeMap<AchievementTier, usize>,
    pub generated_at: DateTime<Utc>,
}

fn rounded_mean(values: impl Iterator<Item = u32>, count: usize) -> u32 {
    if count == 0 {
        return 0;
    }
    let sum: u64 = values.map(u64::from).sum();
    let n = count as u64;
    ((2 * sum + n) / (2 * n)) as u32
}

/// Compute [`RankingStats`] for `snapshot`, judging activity at `now`.
pub fn ranking_stats(
    snapshot: &RankingSnapshot,
    now: DateTime<Utc>,
    active_window_days: i64,
) -> RankingStats {
    let entries = &snapshot.entries;
    let total = entries.len();

    let mut tiers: BTreeMap<AchievementTier, usize> = BTreeMap::new();
    for entry in entries {
        *tiers.entry(entry.achievement_tier).or_default() += 1;
    }

    let fully_completed = entries
        .iter()
        .filter(|e| e.overall_progress_pct >= 100)
        .count();

    RankingStats {
        scope: snapshot.scope.clone(),
        total_students: total,
        active_students: entries
            .iter()
            .filter(|e| is_active(e.last_activity, now, active_window_days))
            .count(),
        average_progress: rounded_mean(entries.iter().map(|e| e.overall_progress_pct), total),
        average_score: rounded_mean(entries.iter().map(|e| e.total_weighted_score), total),
        top_score: snapshot.top_score(),
        completion_rate: rounded_pct(fully_completed as u32, total as u32),
        tiers,
        generated_at: snapshot.generated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RankDelta, RankingEntry, SourceStrategy};
    use crate::testing::at;

    fn entry(
        id: &str,
        rank: u32,
        score: u32,
        progress: u32,
        active_minute: Option<i64>,
    ) -> RankingEntry {
        RankingEntry {
            student_id: id.into(),
            display_id: id.into(),
            module_scores: BTreeMap::new(),
            total_weighted_score: score,
            overall_progress_pct: progress,
            completed_modules: progress / 25,
            total_modules: 4,
            achievement_tier: crate::aggregator::achievement_tier(progress, score, 85),
            rank,
            previous_rank: None,
            rank_delta: RankDelta::New,
            percentile: 0,
            scope: Scope::Global,
            generated_at: at(0),
            earliest_perfect_at: None,
            last_activity: active_minute.map(at),
        }
    }

    #[test]
    fn stats_over_snapshot() {
        let snapshot = RankingSnapshot {
            scope: Scope::Global,
            entries: vec![
                entry("a", 1, 95, 100, Some(0)),
                entry("b", 2, 60, 75, Some(-60 * 24 * 10)),
                entry("c", 3, 33, 50, None),
            ],
            generated_at: at(0),
            version: 4,
            source_strategy: SourceStrategy::PreAggregated,
        };
        let stats = ranking_stats(&snapshot, at(0), 7);
        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.active_students, 1);
        assert_eq!(stats.average_progress, 75);
        // (95 + 60 + 33) / 3 = 62.67
        assert_eq!(stats.average_score, 63);
        assert_eq!(stats.top_score, 95);
        assert_eq!(stats.completion_rate, 33);
        assert_eq!(stats.tiers[&AchievementTier::Expert], 1);
        assert_eq!(stats.tiers[&AchievementTier::Advanced], 1);
        assert_eq!(stats.tiers[&AchievementTier::Intermediate], 1);
        assert!(!stats.tiers.contains_key(&AchievementTier::Beginner));
    }

    #[test]
    fn empty_snapshot_has_zero_stats() {
        let snapshot = RankingSnapshot {
            scope: Scope::class("empty"),
            entries: vec![],
            generated_at: at(0),
            version: 1,
            source_strategy: SourceStrategy::OnDemand,
        };
        let stats = ranking_stats(&snapshot, at(0), 7);
        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.average_score, 0);
        assert_eq!(stats.completion_rate, 0);
        assert!(stats.tiers.is_empty());
    }
}
