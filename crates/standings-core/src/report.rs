//! Snapshot persistence and snapshot-to-snapshot comparison.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{RankingSnapshot, Scope};

/// File name a scope's snapshot is stored under inside a directory.
pub fn snapshot_file_name(scope: &Scope) -> String {
    format!("{}.json", scope.key().replace(':', "_"))
}

impl RankingSnapshot {
    /// Save the snapshot as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize snapshot")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        Ok(())
    }

    /// Load a snapshot from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot from {}", path.display()))?;
        let snapshot: RankingSnapshot =
            serde_json::from_str(&content).context("failed to parse snapshot JSON")?;
        Ok(snapshot)
    }

    /// Save into `dir` under the scope's file name, returning the path written.
    pub fn save_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(snapshot_file_name(&self.scope));
        self.save_json(&path)?;
        Ok(path)
    }

    /// Compare this snapshot against an earlier one.
    pub fn compare(&self, previous: &RankingSnapshot) -> SnapshotDiff {
        let before: HashMap<&str, (u32, u32)> = previous
            .entries
            .iter()
            .map(|e| (e.student_id.as_str(), (e.rank, e.total_weighted_score)))
            .collect();

        let mut risers = Vec::new();
        let mut fallers = Vec::new();
        let mut unchanged = 0usize;
        let mut joined = Vec::new();

        for entry in &self.entries {
            match before.get(entry.student_id.as_str()) {
                Some(&(previous_rank, previous_score)) => {
                    let movement = RankMovement {
                        student_id: entry.student_id.clone(),
                        display_id: entry.display_id.clone(),
                        previous_rank,
                        current_rank: entry.rank,
                        previous_score,
                        current_score: entry.total_weighted_score,
                    };
                    if entry.rank < previous_rank {
                        risers.push(movement);
                    } else if entry.rank > previous_rank {
                        fallers.push(movement);
                    } else {
                        unchanged += 1;
                    }
                }
                None => joined.push(entry.student_id.clone()),
            }
        }

        let left = previous
            .entries
            .iter()
            .filter(|e| self.position_of(&e.student_id).is_none())
            .map(|e| e.student_id.clone())
            .collect();

        risers.sort_by_key(|m| std::cmp::Reverse(m.places()));
        fallers.sort_by_key(|m| m.places());

        SnapshotDiff {
            scope: self.scope.clone(),
            previous_version: previous.version,
            current_version: self.version,
            risers,
            fallers,
            unchanged,
            joined,
            left,
        }
    }
}

/// Result of comparing two snapshots of the same scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub scope: Scope,
    pub previous_version: u64,
    pub current_version: u64,
    /// Students who moved up, biggest climb first.
    pub risers: Vec<RankMovement>,
    /// Students who moved down, biggest drop first.
    pub fallers: Vec<RankMovement>,
    pub unchanged: usize,
    /// Students present only in the current snapshot.
    pub joined: Vec<String>,
    /// Students present only in the previous snapshot.
    pub left: Vec<String>,
}

/// One student's rank change between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankMovement {
    pub student_id: String,
    pub display_id: String,
    pub previous_rank: u32,
    pub current_rank: u32,
    pub previous_score: u32,
    pub current_score: u32,
}

impl RankMovement {
    /// Places gained; negative when the student fell.
    pub fn places(&self) -> i64 {
        i64::from(self.previous_rank) - i64::from(self.current_rank)
    }
}

impl SnapshotDiff {
    pub fn has_changes(&self) -> bool {
        !self.risers.is_empty()
            || !self.fallers.is_empty()
            || !self.joined.is_empty()
            || !self.left.is_empty()
    }

    /// Format the diff as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**{}** v{} → v{}: {} risers, {} fallers, {} unchanged, {} joined, {} left\n\n",
            self.scope,
            self.previous_version,
            self.current_version,
            self.risers.len(),
            self.fallers.len(),
            self.unchanged,
            self.joined.len(),
            self.left.len()
        ));

        for (title, rows) in [("Risers", &self.risers), ("Fallers", &self.fallers)] {
            if rows.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Student | Previous | Current | Places | Score |\n");
            md.push_str("|---------|----------|---------|--------|-------|\n");
            for m in rows {
                md.push_str(&format!(
                    "| {} | #{} | #{} | {:+} | {} → {} |\n",
                    m.display_id,
                    m.previous_rank,
                    m.current_rank,
                    m.places(),
                    m.previous_score,
                    m.current_score
                ));
            }
            md.push('\n');
        }

        if !self.joined.is_empty() {
            md.push_str(&format!("**Joined:** {}\n\n", self.joined.join(", ")));
        }
        if !self.left.is_empty() {
            md.push_str(&format!("**Left:** {}\n", self.left.join(", ")));
        }

        md
    }
}
