//! In-memory attempt store, optionally backed by a JSON dataset file.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use standings_core::error::StoreError;
use standings_core::model::{AttemptRecord, Scope, StudentProfile};
use standings_core::traits::{AttemptStore, VersionedAttempts};

/// On-disk form of the store: the student directory and every attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub students: Vec<StudentProfile>,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

impl Dataset {
    /// Load a dataset from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset from {}", path.display()))?;
        let dataset: Dataset = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dataset: {}", path.display()))?;
        Ok(dataset)
    }

    /// Save the dataset as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize dataset")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write dataset to {}", path.display()))?;
        Ok(())
    }

    /// A small two-class roster with attempts spread over the days before
    /// `now`, used by `standings init`.
    pub fn sample(now: DateTime<Utc>) -> Self {
        let students = [
            ("ana.souza", "Ana Souza", "turma-a"),
            ("bruno.lima", "Bruno Lima", "turma-a"),
            ("carla.dias", "Carla Dias", "turma-a"),
            ("diego.rocha", "Diego Rocha", "turma-b"),
            ("elisa.melo", "Elisa Melo", "turma-b"),
            ("felipe.reis", "Felipe Reis", "turma-b"),
        ];
        // (student, module, raw score out of 20, days ago)
        let attempts: [(usize, &str, f64, i64); 15] = [
            (0, "module1", 14.0, 20),
            (0, "module1", 20.0, 12),
            (0, "module2", 18.0, 10),
            (0, "module3", 20.0, 2),
            (0, "module4", 19.0, 1),
            (1, "module1", 8.0, 15),
            (1, "module1", 17.0, 9),
            (1, "module2", 12.0, 3),
            (2, "module1", 20.0, 30),
            (2, "module3", 16.0, 25),
            (3, "module1", 11.0, 6),
            (3, "module2", 20.0, 4),
            (3, "module3", 15.0, 4),
            (4, "module1", 5.0, 40),
            (5, "module4", 20.0, 0),
        ];

        let mut counts: HashMap<(usize, &str), u32> = HashMap::new();
        let attempts = attempts
            .iter()
            .map(|&(student, module, raw, days_ago)| {
                let index = counts.entry((student, module)).or_default();
                *index += 1;
                AttemptRecord {
                    student_id: students[student].0.to_string(),
                    module_id: module.to_string(),
                    raw_score: raw,
                    max_score: 20.0,
                    timestamp: now - Duration::days(days_ago) - Duration::minutes(student as i64),
                    attempt_index: *index,
                }
            })
            .collect();

        Dataset {
            students: students
                .iter()
                .map(|&(id, name, class)| StudentProfile {
                    student_id: id.to_string(),
                    display_name: name.to_string(),
                    anonymous_id: None,
                    class_ids: vec![class.to_string()],
                    last_activity: None,
                })
                .collect(),
            attempts,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    students: BTreeMap<String, StudentProfile>,
    pairs: HashMap<(String, String), VersionedAttempts>,
}

impl State {
    fn from_dataset(dataset: Dataset) -> Self {
        let mut state = State {
            students: dataset
                .students
                .into_iter()
                .map(|p| (p.student_id.clone(), p))
                .collect(),
            pairs: HashMap::new(),
        };

        for attempt in dataset.attempts {
            state.touch(&attempt);
            state
                .pairs
                .entry((attempt.student_id.clone(), attempt.module_id.clone()))
                .or_default()
                .attempts
                .push(attempt);
        }

        for pair in state.pairs.values_mut() {
            pair.attempts
                .sort_by_key(|a| (a.attempt_index, a.timestamp));
            // Datasets written by hand may leave indices out.
            if pair.attempts.iter().any(|a| a.attempt_index == 0) {
                pair.attempts.sort_by_key(|a| a.timestamp);
                for (i, attempt) in pair.attempts.iter_mut().enumerate() {
                    attempt.attempt_index = i as u32 + 1;
                }
            }
            pair.version = pair.attempts.len() as u64;
        }
        state
    }

    /// Append to the attempt's pair and return the pair's new version.
    fn record(&mut self, attempt: AttemptRecord) -> u64 {
        self.touch(&attempt);
        let pair = self
            .pairs
            .entry((attempt.student_id.clone(), attempt.module_id.clone()))
            .or_default();
        pair.attempts.push(attempt);
        pair.version += 1;
        pair.version
    }

    /// Move the student's last activity forward to the attempt's timestamp.
    fn touch(&mut self, attempt: &AttemptRecord) {
        if let Some(profile) = self.students.get_mut(&attempt.student_id) {
            if profile.last_activity.map_or(true, |t| t < attempt.timestamp) {
                profile.last_activity = Some(attempt.timestamp);
            }
        }
    }

    fn to_dataset(&self) -> Dataset {
        let mut keys: Vec<&(String, String)> = self.pairs.keys().collect();
        keys.sort();
        Dataset {
            students: self.students.values().cloned().collect(),
            attempts: keys
                .into_iter()
                .flat_map(|k| self.pairs[k].attempts.iter().cloned())
                .collect(),
        }
    }
}

/// Attempt store kept in memory.
///
/// When opened with persistence, every successful append rewrites the
/// dataset file before the call returns.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    persist_to: Option<PathBuf>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        Self {
            state: RwLock::new(State::from_dataset(dataset)),
            persist_to: None,
        }
    }

    /// Load `path` and, if `persist` is set, write appends back to it.
    pub fn open(path: &Path, persist: bool) -> Result<Self> {
        let dataset = Dataset::load_json(path)?;
        tracing::debug!(
            path = %path.display(),
            students = dataset.students.len(),
            attempts = dataset.attempts.len(),
            "loaded dataset"
        );
        let mut store = Self::from_dataset(dataset);
        if persist {
            store.persist_to = Some(path.to_path_buf());
        }
        Ok(store)
    }

    /// Current contents in dataset form.
    pub async fn dataset(&self) -> Dataset {
        self.state.read().await.to_dataset()
    }
}

#[async_trait]
impl AttemptStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn attempts_for(
        &self,
        student_id: &str,
        module_id: &str,
    ) -> Result<VersionedAttempts, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .pairs
            .get(&(student_id.to_string(), module_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn attempts_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<AttemptRecord>, StoreError> {
        let state = self.state.read().await;
        let mut attempts: Vec<AttemptRecord> = state
            .pairs
            .iter()
            .filter(|((student, _), _)| student == student_id)
            .flat_map(|(_, pair)| pair.attempts.iter().cloned())
            .collect();
        attempts.sort_by(|a, b| {
            a.module_id
                .cmp(&b.module_id)
                .then(a.attempt_index.cmp(&b.attempt_index))
        });
        Ok(attempts)
    }

    async fn append_attempt(
        &self,
        attempt: AttemptRecord,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let key = (attempt.student_id.clone(), attempt.module_id.clone());
        let actual = state.pairs.get(&key).map_or(0, |p| p.version);
        if actual != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual,
            });
        }

        let Some(path) = &self.persist_to else {
            return Ok(state.record(attempt));
        };

        // The file is written first so a failed write leaves nothing applied.
        let mut next = state.clone();
        let version = next.record(attempt);
        let json = serde_json::to_string_pretty(&next.to_dataset())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
        *state = next;
        Ok(version)
    }

    async fn roster(&self, scope: &Scope) -> Result<Vec<StudentProfile>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .students
            .values()
            .filter(|p| match scope {
                Scope::Class(id) => p.class_ids.contains(id),
                Scope::Global | Scope::Category(_) => true,
            })
            .cloned()
            .collect())
    }

    async fn student(&self, student_id: &str) -> Result<StudentProfile, StoreError> {
        let state = self.state.read().await;
        state
            .students
            .get(student_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("student {student_id}")))
    }

    async fn class_ids(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let ids: BTreeSet<&String> = state
            .students
            .values()
            .flat_map(|p| p.class_ids.iter())
            .collect();
        Ok(ids.into_iter().cloned().collect())
    }
}
