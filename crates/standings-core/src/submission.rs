//! Attempt submission: validate, append with optimistic concurrency, report
//! threshold crossings and invalidate every scope the student appears in.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::SnapshotCache;
use crate::config::SubmissionConfig;
use crate::error::{Result, StandingsError, StoreError};
use crate::model::{AttemptRecord, Category, Scope, StudentProfile};
use crate::normalizer::{apply_attempt, validate_attempt};
use crate::traits::with_timeout;

const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// What a successful submission changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// The stored attempt, with its assigned `attempt_index`.
    pub attempt: AttemptRecord,
    /// Version of the (student, module) pair after the append.
    pub pair_version: u64,
    /// Compare-and-set attempts used, starting at 1.
    pub tries: u32,
    pub previous_score: u8,
    pub new_score: u8,
    pub completed: bool,
    /// The module hit 100 for the first time.
    pub reached_perfect: bool,
    /// The module crossed the passing threshold with this attempt.
    pub newly_completed: bool,
    /// Scopes whose snapshots were invalidated.
    pub invalidated: Vec<Scope>,
}

/// Every scope a student's standing appears in.
pub fn affected_scopes(profile: &StudentProfile) -> Vec<Scope> {
    let mut scopes = vec![Scope::Global];
    scopes.extend(profile.class_ids.iter().cloned().map(Scope::Class));
    // Category membership may change with any attempt.
    scopes.extend(Category::ALL.into_iter().map(Scope::Category));
    scopes
}

/// Writes attempts and keeps the cache honest about them.
pub struct Submitter {
    cache: Arc<SnapshotCache>,
    config: SubmissionConfig,
}

impl Submitter {
    pub fn new(cache: Arc<SnapshotCache>, config: SubmissionConfig) -> Self {
        Self { cache, config }
    }

    /// Record one attempt.
    ///
    /// Malformed attempts, unknown students and modules outside the scoring
    /// policy are rejected before anything is written. Write conflicts are
    /// retried up to `max_attempts` times with doubling backoff, then
    /// surface as `StandingsError::Concurrency`.
    pub async fn submit(&self, attempt: AttemptRecord) -> Result<SubmissionOutcome> {
        validate_attempt(&attempt)?;

        let pipeline = self.cache.pipeline();
        let policy = pipeline.policy();
        let store = pipeline.store();
        let timeout = pipeline.store_timeout();

        if !policy.modules.contains(&attempt.module_id) {
            return Err(StandingsError::validation(format!(
                "module {} is not part of the scoring policy",
                attempt.module_id
            )));
        }

        let profile = match with_timeout(timeout, store.student(&attempt.student_id)).await {
            Ok(profile) => profile,
            Err(StoreError::NotFound(_)) => {
                return Err(StandingsError::validation(format!(
                    "unknown student {}",
                    attempt.student_id
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.retry_backoff();

        for tries in 1..=max_attempts {
            let current = with_timeout(
                timeout,
                store.attempts_for(&attempt.student_id, &attempt.module_id),
            )
            .await?;

            let mut record = attempt.clone();
            record.attempt_index = current.attempts.len() as u32 + 1;
            let normalization =
                apply_attempt(&current.attempts, &record, policy.passing_threshold)?;

            match with_timeout(timeout, store.append_attempt(record.clone(), current.version))
                .await
            {
                Ok(pair_version) => {
                    let invalidated = affected_scopes(&profile);
                    self.cache.invalidate_many(&invalidated);

                    tracing::info!(
                        student_id = %record.student_id,
                        module_id = %record.module_id,
                        attempt_index = record.attempt_index,
                        score = normalization.current.normalized_score,
                        tries,
                        "attempt recorded"
                    );

                    return Ok(SubmissionOutcome {
                        pair_version,
                        tries,
                        previous_score: normalization.previous.normalized_score,
                        new_score: normalization.current.normalized_score,
                        completed: normalization.current.completed,
                        reached_perfect: normalization.reached_perfect(),
                        newly_completed: normalization.newly_completed(),
                        invalidated,
                        attempt: record,
                    });
                }
                Err(StoreError::Conflict { expected, actual }) => {
                    tracing::debug!(
                        student_id = %attempt.student_id,
                        module_id = %attempt.module_id,
                        expected,
                        actual,
                        tries,
                        "compare-and-set conflict"
                    );
                    if tries < max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(
            student_id = %attempt.student_id,
            module_id = %attempt.module_id,
            attempts = max_attempts,
            "retry budget exhausted"
        );
        Err(StandingsError::Concurrency {
            student_id: attempt.student_id,
            module_id: attempt.module_id,
            attempts: max_attempts,
        })
    }
}
