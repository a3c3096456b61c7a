//! Best-attempt-wins module score normalization.
//!
//! A module's normalized score is the rounded best percentage over every
//! attempt the student made, so adding an attempt can never lower it.

use crate::error::{Result, StandingsError};
use crate::model::{AttemptRecord, ModuleScore};

/// Score of a pair before and after its newest attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalization {
    pub previous: ModuleScore,
    pub current: ModuleScore,
}

impl Normalization {
    /// The newest attempt lifted the module to 100 for the first time.
    pub fn reached_perfect(&self) -> bool {
        self.previous.normalized_score < 100 && self.current.normalized_score == 100
    }

    /// The newest attempt crossed the passing threshold.
    pub fn newly_completed(&self) -> bool {
        !self.previous.completed && self.current.completed
    }

    pub fn improved(&self) -> bool {
        self.current.normalized_score > self.previous.normalized_score
    }
}

/// Reject attempts that cannot be scored.
pub fn validate_attempt(attempt: &AttemptRecord) -> Result<()> {
    if attempt.student_id.trim().is_empty() {
        return Err(StandingsError::validation("attempt has an empty student id"));
    }
    if attempt.module_id.trim().is_empty() {
        return Err(StandingsError::validation("attempt has an empty module id"));
    }
    if !attempt.max_score.is_finite() || attempt.max_score <= 0.0 {
        return Err(StandingsError::validation(format!(
            "max_score must be positive for {}/{} (got {})",
            attempt.student_id, attempt.module_id, attempt.max_score
        )));
    }
    if !attempt.raw_score.is_finite()
        || attempt.raw_score < 0.0
        || attempt.raw_score > attempt.max_score
    {
        return Err(StandingsError::validation(format!(
            "raw_score {} outside 0..={} for {}/{}",
            attempt.raw_score, attempt.max_score, attempt.student_id, attempt.module_id
        )));
    }
    Ok(())
}

/// Percentage of one attempt, rounded to the nearest integer.
fn rounded_percentage(attempt: &AttemptRecord) -> u8 {
    attempt.percentage().round().clamp(0.0, 100.0) as u8
}

/// Normalize every attempt of one (student, module) pair into a module score.
///
/// Zero attempts yield an unattempted, not-completed score of 0. Any attempt
/// belonging to a different pair, or with a non-positive `max_score`, fails
/// the whole call.
pub fn normalize_module(
    student_id: &str,
    module_id: &str,
    attempts: &[AttemptRecord],
    passing_threshold: u8,
) -> Result<ModuleScore> {
    let mut score = ModuleScore::unattempted(student_id, module_id);
    let mut best_pct = f64::NEG_INFINITY;

    for attempt in attempts {
        if attempt.student_id != student_id || attempt.module_id != module_id {
            return Err(StandingsError::validation(format!(
                "attempt for {}/{} passed while normalizing {student_id}/{module_id}",
                attempt.student_id, attempt.module_id
            )));
        }
        validate_attempt(attempt)?;

        best_pct = best_pct.max(attempt.percentage());

        if rounded_percentage(attempt) == 100 {
            score.perfect_at = Some(match score.perfect_at {
                Some(t) if t <= attempt.timestamp => t,
                _ => attempt.timestamp,
            });
        }
        score.last_attempt_at = Some(match score.last_attempt_at {
            Some(t) if t >= attempt.timestamp => t,
            _ => attempt.timestamp,
        });
    }

    if best_pct.is_finite() {
        score.normalized_score = best_pct.round().clamp(0.0, 100.0) as u8;
        score.completed = best_pct >= f64::from(passing_threshold);
    }

    Ok(score)
}

/// Score a pair before and after appending `new_attempt` to `existing`.
pub fn apply_attempt(
    existing: &[AttemptRecord],
    new_attempt: &AttemptRecord,
    passing_threshold: u8,
) -> Result<Normalization> {
    let student_id = new_attempt.student_id.as_str();
    let module_id = new_attempt.module_id.as_str();

    let previous = normalize_module(student_id, module_id, existing, passing_threshold)?;

    let mut all = existing.to_vec();
    all.push(new_attempt.clone());
    let current = normalize_module(student_id, module_id, &all, passing_threshold)?;

    Ok(Normalization { previous, current })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn attempt(raw: f64, max: f64, minute: u32, index: u32) -> AttemptRecord {
        AttemptRecord {
            student_id: "s1".into(),
            module_id: "module1".into(),
            raw_score: raw,
            max_score: max,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap(),
            attempt_index: index,
        }
    }

    #[test]
    fn zero_attempts_score_zero() {
        let score = normalize_module("s1", "module1", &[], 70).unwrap();
        assert_eq!(score.normalized_score, 0);
        assert!(!score.completed);
        assert!(score.perfect_at.is_none());
        assert!(score.last_attempt_at.is_none());
    }

    #[test]
    fn best_attempt_wins() {
        let attempts = vec![attempt(4.0, 10.0, 0, 1), attempt(8.5, 10.0, 5, 2)];
        let score = normalize_module("s1", "module1", &attempts, 70).unwrap();
        assert_eq!(score.normalized_score, 85);
        assert!(score.completed);

        // A later, worse attempt does not pull the score down.
        let mut more = attempts.clone();
        more.push(attempt(1.0, 10.0, 9, 3));
        let score = normalize_module("s1", "module1", &more, 70).unwrap();
        assert_eq!(score.normalized_score, 85);
    }

    #[test]
    fn completion_uses_unrounded_best_percentage() {
        // 69.6% rounds to 70 for display but does not pass a 70 threshold.
        let score = normalize_module("s1", "module1", &[attempt(69.6, 100.0, 0, 1)], 70).unwrap();
        assert_eq!(score.normalized_score, 70);
        assert!(!score.completed);
    }

    #[test]
    fn zero_max_score_is_rejected() {
        let err = normalize_module("s1", "module1", &[attempt(0.0, 0.0, 0, 1)], 70).unwrap_err();
        assert!(matches!(err, StandingsError::Validation(_)));
    }

    #[test]
    fn raw_above_max_is_rejected() {
        let err = validate_attempt(&attempt(11.0, 10.0, 0, 1)).unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn foreign_attempt_is_rejected() {
        let mut other = attempt(5.0, 10.0, 0, 1);
        other.student_id = "s2".into();
        assert!(normalize_module("s1", "module1", &[other], 70).is_err());
    }

    #[test]
    fn earliest_perfect_timestamp_is_kept() {
        let attempts = vec![
            attempt(10.0, 10.0, 30, 3),
            attempt(10.0, 10.0, 10, 1),
            attempt(7.0, 10.0, 20, 2),
        ];
        let score = normalize_module("s1", "module1", &attempts, 70).unwrap();
        assert_eq!(score.normalized_score, 100);
        assert_eq!(
            score.perfect_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 10, 0).unwrap())
        );
        assert_eq!(
            score.last_attempt_at,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn apply_attempt_reports_crossings() {
        let existing = vec![attempt(6.0, 10.0, 0, 1)];
        let result = apply_attempt(&existing, &attempt(10.0, 10.0, 5, 2), 70).unwrap();
        assert_eq!(result.previous.normalized_score, 60);
        assert_eq!(result.current.normalized_score, 100);
        assert!(result.reached_perfect());
        assert!(result.newly_completed());
        assert!(result.improved());

        let again = apply_attempt(
            &[attempt(10.0, 10.0, 0, 1)],
            &attempt(10.0, 10.0, 5, 2),
            70,
        )
        .unwrap();
        assert!(!again.reached_perfect());
        assert!(!again.newly_completed());
    }

    #[test]
    fn scores_stay_bounded_and_monotonic() {
        let mut attempts = Vec::new();
        let mut last = 0u8;
        for (i, raw) in [3.0, 0.0, 7.25, 7.0, 9.99, 2.0, 10.0, 0.5].iter().enumerate() {
            attempts.push(attempt(*raw, 10.0, i as u32, i as u32 + 1));
            let score = normalize_module("s1", "module1", &attempts, 70).unwrap();
            assert!(score.normalized_score <= 100);
            assert!(score.normalized_score >= last, "score decreased at attempt {i}");
            last = score.normalized_score;
        }
        assert_eq!(last, 100);
    }
}
