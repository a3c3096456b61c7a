//! Core data model types for standings.
//!
//! Attempts flow in, module scores and standings are derived, and ranking
//! snapshots are the immutable unit that the cache stores and serves.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One submitted attempt at a module. Immutable and append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub student_id: String,
    pub module_id: String,
    /// Points scored in this attempt.
    pub raw_score: f64,
    /// Maximum points available; must be positive.
    pub max_score: f64,
    pub timestamp: DateTime<Utc>,
    /// 1-based position of this attempt for the (student, module) pair.
    #[serde(default)]
    pub attempt_index: u32,
}

impl AttemptRecord {
    /// Percentage of `max_score` achieved, unrounded. Callers must validate
    /// `max_score` first.
    pub fn percentage(&self) -> f64 {
        self.raw_score / self.max_score * 100.0
    }
}

/// Derived per-module score for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleScore {
    pub student_id: String,
    pub module_id: String,
    /// Best attempt, rescaled to 0..=100.
    pub normalized_score: u8,
    /// Whether the best attempt reached the passing threshold.
    pub completed: bool,
    /// Module weight; filled in by the aggregator.
    #[serde(default)]
    pub weight: u32,
    /// Earliest attempt that scored 100%, if any.
    #[serde(default)]
    pub perfect_at: Option<DateTime<Utc>>,
    /// Most recent attempt timestamp.
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl ModuleScore {
    /// Score for a module the student never attempted.
    pub fn unattempted(student_id: &str, module_id: &str) -> Self {
        Self {
            student_id: student_id.to_string(),
            module_id: module_id.to_string(),
            normalized_score: 0,
            completed: false,
            weight: 0,
            perfect_at: None,
            last_attempt_at: None,
        }
    }
}

/// Directory data for one student, owned by the external store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_id: String,
    #[serde(default)]
    pub display_name: String,
    /// Public pseudonym shown on leaderboards.
    #[serde(default)]
    pub anonymous_id: Option<String>,
    #[serde(default)]
    pub class_ids: Vec<String>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

impl StudentProfile {
    /// The id shown publicly: the stored pseudonym, or the last four
    /// characters of the student id upper-cased.
    pub fn display_id(&self) -> String {
        if let Some(anon) = self.anonymous_id.as_deref().filter(|a| !a.is_empty()) {
            return anon.to_string();
        }
        let chars: Vec<char> = self.student_id.chars().collect();
        let start = chars.len().saturating_sub(4);
        chars[start..].iter().collect::<String>().to_uppercase()
    }
}

/// Achievement tier derived from overall progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AchievementTier {
    #[serde(rename = "Iniciante")]
    Beginner,
    #[serde(rename = "Intermediário")]
    Intermediate,
    #[serde(rename = "Avançado")]
    Advanced,
    #[serde(rename = "Expert")]
    Expert,
}

impl AchievementTier {
    /// Label shown to students.
    pub fn label(&self) -> &'static str {
        match self {
            AchievementTier::Beginner => "Iniciante",
            AchievementTier::Intermediate => "Intermediário",
            AchievementTier::Advanced => "Avançado",
            AchievementTier::Expert => "Expert",
        }
    }
}

impl fmt::Display for AchievementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Direction of a student's rank change versus the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankDelta {
    Up,
    Down,
    Same,
    New,
}

impl RankDelta {
    pub fn between(rank: u32, previous: Option<u32>) -> Self {
        match previous {
            None => RankDelta::New,
            Some(prev) if rank < prev => RankDelta::Up,
            Some(prev) if rank > prev => RankDelta::Down,
            Some(_) => RankDelta::Same,
        }
    }
}

impl fmt::Display for RankDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankDelta::Up => write!(f, "up"),
            RankDelta::Down => write!(f, "down"),
            RankDelta::Same => write!(f, "same"),
            RankDelta::New => write!(f, "new"),
        }
    }
}

/// Derived population filters over the global standings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Activity within the configured window.
    Active,
    /// Overall progress below 25%.
    Beginners,
    /// Overall progress in [25, 75).
    Intermediate,
    /// Overall progress at or above 75%.
    Advanced,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Active,
        Category::Beginners,
        Category::Intermediate,
        Category::Advanced,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Active => write!(f, "active"),
            Category::Beginners => write!(f, "beginners"),
            Category::Intermediate => write!(f, "intermediate"),
            Category::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" | "ativos" => Ok(Category::Active),
            "beginners" | "iniciantes" => Ok(Category::Beginners),
            "intermediate" | "intermediarios" => Ok(Category::Intermediate),
            "advanced" | "avancados" => Ok(Category::Advanced),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// The population a ranking is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    Global,
    Class(String),
    Category(Category),
}

impl Scope {
    pub fn class(id: impl Into<String>) -> Self {
        Scope::Class(id.into())
    }

    /// Stable string key used for cache slots and persisted snapshots.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Class(id) => write!(f, "class:{id}"),
            Scope::Category(c) => write!(f, "category:{c}"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("global") || s.eq_ignore_ascii_case("geral") {
            return Ok(Scope::Global);
        }
        match s.split_once(':') {
            Some(("class", id)) if !id.is_empty() => Ok(Scope::Class(id.to_string())),
            Some(("category", name)) => name.parse().map(Scope::Category),
            _ => Err(format!("unknown scope: {s}")),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.key()
    }
}

/// Which computation path produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategy {
    /// Full aggregation on every request.
    OnDemand,
    /// Aggregation behind a short-lived read cache.
    ReadCached,
    /// Served from the pre-aggregation cache.
    PreAggregated,
}

impl SourceStrategy {
    pub const ALL: [SourceStrategy; 3] = [
        SourceStrategy::OnDemand,
        SourceStrategy::ReadCached,
        SourceStrategy::PreAggregated,
    ];
}

impl fmt::Display for SourceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStrategy::OnDemand => write!(f, "on_demand"),
            SourceStrategy::ReadCached => write!(f, "read_cached"),
            SourceStrategy::PreAggregated => write!(f, "pre_aggregated"),
        }
    }
}

/// Aggregated, not yet ranked, standing for one student within a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub student_id: String,
    pub display_id: String,
    /// Normalized score per module, covering every module in scope.
    pub module_scores: BTreeMap<String, u8>,
    pub total_weighted_score: u32,
    pub overall_progress_pct: u32,
    pub completed_modules: u32,
    pub total_modules: u32,
    pub achievement_tier: AchievementTier,
    /// Earliest attempt, across modules, that scored 100%.
    pub earliest_perfect_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
    /// Modules whose weight fell back to the default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted_weights: Vec<String>,
}

/// A ranked row of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub student_id: String,
    pub display_id: String,
    pub module_scores: BTreeMap<String, u8>,
    pub total_weighted_score: u32,
    pub overall_progress_pct: u32,
    pub completed_modules: u32,
    pub total_modules: u32,
    pub achievement_tier: AchievementTier,
    pub rank: u32,
    #[serde(default)]
    pub previous_rank: Option<u32>,
    pub rank_delta: RankDelta,
    pub percentile: u32,
    pub scope: Scope,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub earliest_perfect_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

/// Immutable, timestamped materialization of a scope's ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub scope: Scope,
    /// Entries ordered by rank, starting at 1.
    pub entries: Vec<RankingEntry>,
    pub generated_at: DateTime<Utc>,
    /// Monotonic per scope; the first snapshot of a scope is version 1.
    pub version: u64,
    pub source_strategy: SourceStrategy,
}

impl RankingSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `limit` entries, rank 1 first.
    pub fn top(&self, limit: usize) -> &[RankingEntry] {
        &self.entries[..limit.min(self.entries.len())]
    }

    /// Index of a student within `entries`.
    pub fn position_of(&self, student_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.student_id == student_id)
    }

    pub fn entry_for(&self, student_id: &str) -> Option<&RankingEntry> {
        self.position_of(student_id).map(|i| &self.entries[i])
    }

    pub fn top_score(&self) -> u32 {
        self.entries
            .first()
            .map(|e| e.total_weighted_score)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display_and_parse() {
        assert_eq!(Scope::Global.to_string(), "global");
        assert_eq!(Scope::class("turma-a").to_string(), "class:turma-a");
        assert_eq!(
            Scope::Category(Category::Active).to_string(),
            "category:active"
        );
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert_eq!(
            "class:turma-a".parse::<Scope>().unwrap(),
            Scope::class("turma-a")
        );
        assert_eq!(
            "category:iniciantes".parse::<Scope>().unwrap(),
            Scope::Category(Category::Beginners)
        );
        assert!("class:".parse::<Scope>().is_err());
        assert!("region:north".parse::<Scope>().is_err());
    }

    #[test]
    fn scope_serializes_as_key() {
        let json = serde_json::to_string(&Scope::class("x1")).unwrap();
        assert_eq!(json, "\"class:x1\"");
        let back: Scope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Scope::class("x1"));
    }

    #[test]
    fn rank_delta_between() {
        assert_eq!(RankDelta::between(3, None), RankDelta::New);
        assert_eq!(RankDelta::between(2, Some(5)), RankDelta::Up);
        assert_eq!(RankDelta::between(5, Some(2)), RankDelta::Down);
        assert_eq!(RankDelta::between(4, Some(4)), RankDelta::Same);
    }

    #[test]
    fn display_id_falls_back_to_id_suffix() {
        let mut profile = StudentProfile {
            student_id: "user-abcd9f".into(),
            display_name: "Ana".into(),
            anonymous_id: None,
            class_ids: vec![],
            last_activity: None,
        };
        assert_eq!(profile.display_id(), "CD9F");

        profile.anonymous_id = Some("#4821".into());
        assert_eq!(profile.display_id(), "#4821");

        profile.student_id = "ab".into();
        profile.anonymous_id = Some(String::new());
        assert_eq!(profile.display_id(), "AB");
    }

    #[test]
    fn tier_labels_serialize_in_portuguese() {
        let json = serde_json::to_string(&AchievementTier::Intermediate).unwrap();
        assert_eq!(json, "\"Intermediário\"");
        assert_eq!(AchievementTier::Advanced.to_string(), "Avançado");
    }
}
