//! Weighted aggregation of module scores into a single standing.
//!
//! Every module listed by the scoring policy contributes to the weighted
//! average; a module the student never attempted contributes a score of 0
//! with its full weight.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::config::ScoringPolicy;
use crate::model::{AchievementTier, ModuleScore, Standing, StudentProfile};

/// Resolve a module's weight, reporting whether the default was used.
pub fn resolve_weight(policy: &ScoringPolicy, module_id: &str) -> (u32, bool) {
    match policy.weights.get(module_id) {
        Some(&w) => (w, false),
        None => (policy.default_weight, true),
    }
}

/// `round(Σ(score·weight) / Σweight)`, rounding halves up. Returns 0 when
/// the weights sum to 0.
pub fn weighted_score(scores_and_weights: &[(u8, u32)]) -> u32 {
    let (numerator, denominator) = scores_and_weights.iter().fold(
        (0u64, 0u64),
        |(num, den), &(score, weight)| {
            (
                num + u64::from(score) * u64::from(weight),
                den + u64::from(weight),
            )
        },
    );
    if denominator == 0 {
        return 0;
    }
    ((2 * numerator + denominator) / (2 * denominator)) as u32
}

/// `round(part / whole × 100)`, 0 for an empty whole.
pub fn rounded_pct(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let (part, whole) = (u64::from(part), u64::from(whole));
    ((200 * part + whole) / (2 * whole)) as u32
}

/// Tier from overall progress, with Expert gated on the elite threshold.
pub fn achievement_tier(
    overall_progress_pct: u32,
    total_weighted_score: u32,
    elite_threshold: u32,
) -> AchievementTier {
    if overall_progress_pct >= 100 && total_weighted_score > elite_threshold {
        AchievementTier::Expert
    } else if overall_progress_pct >= 75 {
        AchievementTier::Advanced
    } else if overall_progress_pct >= 25 {
        AchievementTier::Intermediate
    } else {
        AchievementTier::Beginner
    }
}

/// Aggregate one student's module scores under `policy`.
///
/// Scores for modules outside `policy.modules` are ignored; modules with no
/// score are treated as unattempted. Each module whose weight is missing
/// from the policy is logged and listed in `Standing::defaulted_weights`.
pub fn aggregate(
    profile: &StudentProfile,
    scores: &[ModuleScore],
    policy: &ScoringPolicy,
) -> Standing {
    let by_module: HashMap<&str, &ModuleScore> =
        scores.iter().map(|s| (s.module_id.as_str(), s)).collect();

    let mut module_scores = BTreeMap::new();
    let mut weighted = Vec::with_capacity(policy.modules.len());
    let mut defaulted_weights = Vec::new();
    let mut completed_modules = 0u32;
    let mut earliest_perfect_at: Option<DateTime<Utc>> = None;
    let mut last_activity = profile.last_activity;

    for module_id in &policy.modules {
        let (weight, defaulted) = resolve_weight(policy, module_id);
        if defaulted {
            tracing::warn!(
                module_id = %module_id,
                default_weight = weight,
                "module weight missing from configuration, using default"
            );
            defaulted_weights.push(module_id.clone());
        }

        let score = by_module.get(module_id.as_str());
        let normalized = score.map(|s| s.normalized_score.min(100)).unwrap_or(0);
        module_scores.insert(module_id.clone(), normalized);
        weighted.push((normalized, weight));

        if let Some(s) = score {
            if s.completed {
                completed_modules += 1;
            }
            if let Some(t) = s.perfect_at {
                earliest_perfect_at = Some(earliest_perfect_at.map_or(t, |e| e.min(t)));
            }
            if let Some(t) = s.last_attempt_at {
                last_activity = Some(last_activity.map_or(t, |l| l.max(t)));
            }
        }
    }

    let total_modules = policy.modules.len() as u32;
    let total_weighted_score = weighted_score(&weighted);
    let overall_progress_pct = rounded_pct(completed_modules, total_modules);

    Standing {
        student_id: profile.student_id.clone(),
        display_id: profile.display_id(),
        module_scores,
        total_weighted_score,
        overall_progress_pct,
        completed_modules,
        total_modules,
        achievement_tier: achievement_tier(
            overall_progress_pct,
            total_weighted_score,
            policy.elite_threshold,
        ),
        earliest_perfect_at,
        last_activity,
        defaulted_weights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttemptRecord;
    use crate::normalizer::normalize_module;
    use chrono::TimeZone;

    fn profile(id: &str) -> StudentProfile {
        StudentProfile {
            student_id: id.into(),
            display_name: String::new(),
            anonymous_id: None,
            class_ids: vec![],
            last_activity: None,
        }
    }

    fn attempt(module: &str, pct: f64, minute: u32) -> AttemptRecord {
        AttemptRecord {
            student_id: "s".into(),
            module_id: module.into(),
            raw_score: pct,
            max_score: 100.0,
            timestamp: Utc.with_ymd_and_hms(2025, 4, 2, 9, minute, 0).unwrap(),
            attempt_index: 0,
        }
    }

    #[test]
    fn scenario_a_weighted_standing() {
        let policy = ScoringPolicy::default();
        let m1 = normalize_module(
            "s",
            "module1",
            &[attempt("module1", 40.0, 0), attempt("module1", 85.0, 1)],
            policy.passing_threshold,
        )
        .unwrap();
        let m2 = normalize_module(
            "s",
            "module2",
            &[attempt("module2", 60.0, 2)],
            policy.passing_threshold,
        )
        .unwrap();
        assert_eq!(m1.normalized_score, 85);
        assert!(m1.completed);
        assert_eq!(m2.normalized_score, 60);
        assert!(!m2.completed);

        let standing = aggregate(&profile("s"), &[m1, m2], &policy);
        assert_eq!(standing.module_scores["module3"], 0);
        assert_eq!(standing.module_scores["module4"], 0);
        // (85·70 + 60·30 + 0 + 0) / 300 = 25.83
        assert_eq!(standing.total_weighted_score, 26);
        assert_eq!(standing.completed_modules, 1);
        assert_eq!(standing.total_modules, 4);
        assert_eq!(standing.overall_progress_pct, 25);
        assert_eq!(standing.achievement_tier, AchievementTier::Intermediate);
        assert!(standing.defaulted_weights.is_empty());
        assert_eq!(
            standing.last_activity,
            Some(Utc.with_ymd_and_hms(2025, 4, 2, 9, 2, 0).unwrap())
        );
    }

    #[test]
    fn unlisted_weight_defaults_and_is_reported() {
        let policy = ScoringPolicy {
            modules: vec!["module1".into(), "extra".into()],
            ..ScoringPolicy::default()
        };
        let standing = aggregate(&profile("s"), &[], &policy);
        assert_eq!(standing.defaulted_weights, vec!["extra".to_string()]);
        assert_eq!(resolve_weight(&policy, "extra"), (100, true));
        assert_eq!(resolve_weight(&policy, "module1"), (70, false));
    }

    #[test]
    fn weighted_score_matches_formula_for_synthetic_tables() {
        // Deterministic pseudo-random weight tables.
        let mut seed = 0x2545_f491_u64;
        let mut next = move |bound: u64| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed % bound
        };
        for _ in 0..500 {
            let n = 1 + next(8) as usize;
            let table: Vec<(u8, u32)> = (0..n)
                .map(|_| (next(101) as u8, 1 + next(200) as u32))
                .collect();
            let exact = table
                .iter()
                .map(|&(s, w)| f64::from(s) * f64::from(w))
                .sum::<f64>()
                / table.iter().map(|&(_, w)| f64::from(w)).sum::<f64>();
            let got = weighted_score(&table);
            assert!(
                (f64::from(got) - exact).abs() <= 0.5 + 1e-9,
                "table {table:?}: got {got}, exact {exact}"
            );
            assert!(got <= 100);
        }
    }

    #[test]
    fn zero_weights_yield_zero() {
        assert_eq!(weighted_score(&[(90, 0), (80, 0)]), 0);
        assert_eq!(weighted_score(&[]), 0);
    }

    #[test]
    fn tiers_follow_progress_thresholds() {
        assert_eq!(achievement_tier(0, 0, 85), AchievementTier::Beginner);
        assert_eq!(achievement_tier(24, 90, 85), AchievementTier::Beginner);
        assert_eq!(achievement_tier(25, 10, 85), AchievementTier::Intermediate);
        assert_eq!(achievement_tier(74, 10, 85), AchievementTier::Intermediate);
        assert_eq!(achievement_tier(75, 10, 85), AchievementTier::Advanced);
        assert_eq!(achievement_tier(100, 85, 85), AchievementTier::Advanced);
        assert_eq!(achievement_tier(100, 86, 85), AchievementTier::Expert);
    }

    #[test]
    fn rounded_pct_rounds_half_up() {
        assert_eq!(rounded_pct(1, 4), 25);
        assert_eq!(rounded_pct(1, 3), 33);
        assert_eq!(rounded_pct(2, 3), 67);
        assert_eq!(rounded_pct(1, 8), 13);
        assert_eq!(rounded_pct(0, 0), 0);
    }

    #[test]
    fn earliest_perfect_spans_modules() {
        let policy = ScoringPolicy::default();
        let a = normalize_module("s", "module1", &[attempt("module1", 100.0, 30)], 70).unwrap();
        let b = normalize_module("s", "module3", &[attempt("module3", 100.0, 10)], 70).unwrap();
        let standing = aggregate(&profile("s"), &[a, b], &policy);
        assert_eq!(
            standing.earliest_perfect_at,
            Some(Utc.with_ymd_and_hms(2025, 4, 2, 9, 10, 0).unwrap())
        );
    }
}
