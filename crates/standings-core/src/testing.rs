//! In-crate attempt store used by unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::StoreError;
use crate::model::{AttemptRecord, Scope, StudentProfile};
use crate::traits::{AttemptStore, VersionedAttempts};

/// Fixture clock: minute `m` of 2025-06-02 12:00 UTC.
pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap() + chrono::Duration::minutes(minute)
}

/// Misbehaviour injected into `roster` calls for one scope.
#[derive(Debug, Clone, Copy)]
pub enum RosterFault {
    Fail,
    Delay(Duration),
}

#[derive(Default)]
struct Data {
    students: Vec<StudentProfile>,
    attempts: HashMap<(String, String), VersionedAttempts>,
    roster_faults: HashMap<Scope, RosterFault>,
}

#[derive(Default)]
pub struct FixtureStore {
    data: Mutex<Data>,
    roster_calls: AtomicU32,
    append_calls: AtomicU32,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    /// Sleep after `attempts_by_student` has read its data.
    read_delay_ms: AtomicU64,
    forced_conflicts: AtomicU32,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn student(self, id: &str, classes: &[&str]) -> Self {
        self.data.lock().unwrap().students.push(StudentProfile {
            student_id: id.into(),
            display_name: id.into(),
            anonymous_id: None,
            class_ids: classes.iter().map(|c| c.to_string()).collect(),
            last_activity: None,
        });
        self
    }

    pub fn attempt(self, student: &str, module: &str, pct: f64, minute: i64) -> Self {
        {
            let mut data = self.data.lock().unwrap();
            let pair = data
                .attempts
                .entry((student.into(), module.into()))
                .or_default();
            pair.attempts.push(AttemptRecord {
                student_id: student.into(),
                module_id: module.into(),
                raw_score: pct,
                max_score: 100.0,
                timestamp: at(minute),
                attempt_index: pair.attempts.len() as u32 + 1,
            });
            pair.version += 1;
        }
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn roster_fault(&self, scope: Scope, fault: Option<RosterFault>) {
        let mut data = self.data.lock().unwrap();
        match fault {
            Some(f) => data.roster_faults.insert(scope, f),
            None => data.roster_faults.remove(&scope),
        };
    }

    pub fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn roster_calls(&self) -> u32 {
        self.roster_calls.load(Ordering::SeqCst)
    }

    pub fn append_calls(&self) -> u32 {
        self.append_calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fixture store is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for FixtureStore {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn attempts_for(
        &self,
        student_id: &str,
        module_id: &str,
    ) -> Result<VersionedAttempts, StoreError> {
        self.gate().await?;
        let data = self.data.lock().unwrap();
        Ok(data
            .attempts
            .get(&(student_id.to_string(), module_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttemptRecord>, StoreError> {
        self.gate().await?;
        let attempts: Vec<AttemptRecord> = {
            let data = self.data.lock().unwrap();
            data.attempts
                .iter()
                .filter(|((s, _), _)| s == student_id)
                .flat_map(|(_, v)| v.attempts.iter().cloned())
                .collect()
        };
        let read_delay = self.read_delay_ms.load(Ordering::SeqCst);
        if read_delay > 0 {
            tokio::time::sleep(Duration::from_millis(read_delay)).await;
        }
        Ok(attempts)
    }

    async fn append_attempt(
        &self,
        attempt: AttemptRecord,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        let mut data = self.data.lock().unwrap();
        let pair = data
            .attempts
            .entry((attempt.student_id.clone(), attempt.module_id.clone()))
            .or_default();
        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced || pair.version != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual: pair.version,
            });
        }
        pair.attempts.push(attempt);
        pair.version += 1;
        Ok(pair.version)
    }

    async fn roster(&self, scope: &Scope) -> Result<Vec<StudentProfile>, StoreError> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        let fault = self.data.lock().unwrap().roster_faults.get(scope).copied();
        match fault {
            Some(RosterFault::Fail) => {
                return Err(StoreError::Unavailable(format!("roster for {scope} failed")))
            }
            Some(RosterFault::Delay(d)) => tokio::time::sleep(d).await,
            None => {}
        }
        let data = self.data.lock().unwrap();
        Ok(data
            .students
            .iter()
            .filter(|p| match scope {
                Scope::Class(id) => p.class_ids.contains(id),
                Scope::Global | Scope::Category(_) => true,
            })
            .cloned()
            .collect())
    }

    async fn student(&self, student_id: &str) -> Result<StudentProfile, StoreError> {
        self.gate().await?;
        let data = self.data.lock().unwrap();
        data.students
            .iter()
            .find(|p| p.student_id == student_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("student {student_id}")))
    }

    async fn class_ids(&self) -> Result<Vec<String>, StoreError> {
        self.gate().await?;
        let data = self.data.lock().unwrap();
        let ids: BTreeSet<String> = data
            .students
            .iter()
            .flat_map(|p| p.class_ids.iter().cloned())
            .collect();
        Ok(ids.into_iter().collect())
    }
}
