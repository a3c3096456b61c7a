//! Trait definitions for attempt store backends.
//!
//! Implemented by the `standings-store` crate (in-memory store, scripted
//! test store). The core only ever talks to the store through this trait.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{AttemptRecord, Category, Scope, StudentProfile};

/// Attempts of one (student, module) pair together with the pair's version.
///
/// The version is what a compare-and-set append must present; it changes on
/// every successful append to the pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionedAttempts {
    pub attempts: Vec<AttemptRecord>,
    pub version: u64,
}

/// Backend holding attempts and the student directory.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Human-readable backend name (e.g. "memory").
    fn name(&self) -> &str;

    /// All attempts of one (student, module) pair with the pair's version.
    async fn attempts_for(
        &self,
        student_id: &str,
        module_id: &str,
    ) -> Result<VersionedAttempts, StoreError>;

    /// Every attempt a student ever made, across modules.
    async fn attempts_by_student(&self, student_id: &str)
        -> Result<Vec<AttemptRecord>, StoreError>;

    /// Append an attempt if the pair is still at `expected_version`.
    ///
    /// Returns the pair's new version, or `StoreError::Conflict` when another
    /// writer got there first.
    async fn append_attempt(
        &self,
        attempt: AttemptRecord,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Students belonging to a scope.
    ///
    /// Category scopes are filtered downstream, so stores return the whole
    /// directory for them, exactly as for `Scope::Global`.
    async fn roster(&self, scope: &Scope) -> Result<Vec<StudentProfile>, StoreError>;

    /// Directory entry for one student.
    async fn student(&self, student_id: &str) -> Result<StudentProfile, StoreError>;

    /// Ids of every class with at least one student.
    async fn class_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Every scope the standings engine serves: global, each class and each
    /// category.
    async fn known_scopes(&self) -> Result<Vec<Scope>, StoreError> {
        let mut scopes = vec![Scope::Global];
        scopes.extend(self.class_ids().await?.into_iter().map(Scope::Class));
        scopes.extend(Category::ALL.into_iter().map(Scope::Category));
        Ok(scopes)
    }
}

/// Run a store call under a deadline, mapping expiry to `StoreError::Timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_passes_results_through() {
        let ok = with_timeout(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = with_timeout(Duration::from_secs(1), async {
            Err::<u32, _>(StoreError::NotFound("x".into()))
        })
        .await;
        assert_eq!(err, Err(StoreError::NotFound("x".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_expires() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        };
        let result = with_timeout(Duration::from_millis(250), slow).await;
        assert_eq!(result, Err(StoreError::Timeout(250)));
    }
}
