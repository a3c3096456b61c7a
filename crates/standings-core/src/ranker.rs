//! Deterministic rank assignment.
//!
//! Ordering: weighted score (desc), overall progress (desc), earliest 100%
//! attempt (asc, students without one last), student id (asc). The final
//! key is unique, so no two students ever share a rank.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::{RankDelta, RankingEntry, Scope, Standing};

/// Total order over standings; `Less` means ranked higher.
pub fn standing_order(a: &Standing, b: &Standing) -> Ordering {
    b.total_weighted_score
        .cmp(&a.total_weighted_score)
        .then_with(|| b.overall_progress_pct.cmp(&a.overall_progress_pct))
        .then_with(|| match (a.earliest_perfect_at, b.earliest_perfect_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.student_id.cmp(&b.student_id))
}

/// `round((N − rank) / N × 100)`, halves rounded up.
pub fn percentile(rank: u32, total: u32) -> u32 {
    if total == 0 || rank > total {
        return 0;
    }
    let (above, total) = (u64::from(total - rank), u64::from(total));
    ((200 * above + total) / (2 * total)) as u32
}

/// Sort `standings` and turn them into ranked entries.
///
/// `previous_ranks` maps student ids to their rank in the scope's previous
/// snapshot; students absent from it are marked `new`.
pub fn assign_ranks(
    mut standings: Vec<Standing>,
    previous_ranks: &HashMap<String, u32>,
    scope: &Scope,
    generated_at: DateTime<Utc>,
) -> Vec<RankingEntry> {
    standings.sort_by(standing_order);
    let total = standings.len() as u32;

    standings
        .into_iter()
        .enumerate()
        .map(|(idx, s)| {
            let rank = idx as u32 + 1;
            let previous_rank = previous_ranks.get(&s.student_id).copied();
            RankingEntry {
                student_id: s.student_id,
                display_id: s.display_id,
                module_scores: s.module_scores,
                total_weighted_score: s.total_weighted_score,
                overall_progress_pct: s.overall_progress_pct,
                completed_modules: s.completed_modules,
                total_modules: s.total_modules,
                achievement_tier: s.achievement_tier,
                rank,
                previous_rank,
                rank_delta: RankDelta::between(rank, previous_rank),
                percentile: percentile(rank, total),
                scope: scope.clone(),
                generated_at,
                earliest_perfect_at: s.earliest_perfect_at,
                last_activity: s.last_activity,
            }
        })
        .collect()
}
