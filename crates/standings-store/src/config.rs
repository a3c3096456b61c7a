//! Configuration loading and store factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use standings_core::config::{CacheConfig, ScoringPolicy, SubmissionConfig};
use standings_core::traits::AttemptStore;

use crate::memory::InMemoryStore;

/// Which attempt store backend to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory {
        /// JSON dataset to load. An empty store is used when absent.
        #[serde(default)]
        dataset: Option<String>,
        /// Write appends back to the dataset file.
        #[serde(default = "default_persist")]
        persist: bool,
    },
}

fn default_persist() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory {
            dataset: None,
            persist: default_persist(),
        }
    }
}

/// Top-level standings configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingsConfig {
    #[serde(default)]
    pub scoring: ScoringPolicy,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl StandingsConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let scoring = &self.scoring;
        if scoring.passing_threshold > 100 {
            anyhow::bail!(
                "passing_threshold must be at most 100, got {}",
                scoring.passing_threshold
            );
        }
        if scoring.modules.is_empty() {
            anyhow::bail!("scoring.modules must list at least one module");
        }
        for extra in scoring
            .weights
            .keys()
            .filter(|m| !scoring.modules.contains(m))
        {
            tracing::warn!(
                module_id = %extra,
                "weight configured for a module outside scoring.modules"
            );
        }
        if self.cache.regeneration_parallelism == 0 {
            anyhow::bail!("cache.regeneration_parallelism must be at least 1");
        }
        Ok(())
    }

    /// Dataset path of the memory store, if any.
    pub fn dataset_path(&self) -> Option<PathBuf> {
        match &self.store {
            StoreConfig::Memory { dataset, .. } => dataset.as_ref().map(PathBuf::from),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Apply `STANDINGS_*` overrides, reading variables through `lookup`.
fn apply_env_overrides(
    config: &mut StandingsConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(path) = lookup("STANDINGS_DATASET") {
        match &mut config.store {
            StoreConfig::Memory { dataset, .. } => *dataset = Some(path),
        }
    }
    if let Some(value) = lookup("STANDINGS_PASSING_THRESHOLD") {
        config.scoring.passing_threshold = value
            .trim()
            .parse()
            .with_context(|| format!("invalid STANDINGS_PASSING_THRESHOLD: {value}"))?;
    }
    Ok(())
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `standings.toml` in the current directory
/// 2. `~/.config/standings/config.toml`
///
/// Environment variable overrides: `STANDINGS_DATASET`,
/// `STANDINGS_PASSING_THRESHOLD`.
pub fn load_config() -> Result<StandingsConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<StandingsConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("standings.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<StandingsConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => StandingsConfig::default(),
    };

    // Dataset paths in a config file are relative to that file.
    let base = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);
    match &mut config.store {
        StoreConfig::Memory { dataset, .. } => {
            if let Some(raw) = dataset.take() {
                let resolved = PathBuf::from(resolve_env_vars(&raw));
                let resolved = match &base {
                    Some(base) if resolved.is_relative() => base.join(resolved),
                    _ => resolved,
                };
                *dataset = Some(resolved.to_string_lossy().into_owned());
            }
        }
    }

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.validate()?;

    tracing::debug!(
        path = ?config_path,
        dataset = ?config.dataset_path(),
        "configuration loaded"
    );
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("standings"))
}

/// Create a store instance from its configuration.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn AttemptStore>> {
    match config {
        StoreConfig::Memory {
            dataset: Some(path),
            persist,
        } => Ok(Arc::new(InMemoryStore::open(Path::new(path), *persist)?)),
        StoreConfig::Memory { dataset: None, .. } => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use standings_core::model::Scope;

    use crate::memory::Dataset;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_STANDINGS_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_STANDINGS_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("data/${_STANDINGS_TEST_VAR}.json"),
            "data/hello.json"
        );
        std::env::remove_var("_STANDINGS_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = StandingsConfig::default();
        assert_eq!(config.scoring.passing_threshold, 70);
        assert_eq!(config.cache.regeneration_parallelism, 4);
        assert_eq!(config.submission.max_attempts, 3);
        assert!(config.dataset_path().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[scoring]
passing_threshold = 60
modules = ["intro", "loops"]

[scoring.weights]
intro = 40
loops = 60

[cache]
staleness_threshold_secs = 60

[store]
type = "memory"
dataset = "data/attempts.json"
persist = false
"#;
        let config: StandingsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scoring.passing_threshold, 60);
        assert_eq!(config.scoring.weights["loops"], 60);
        assert_eq!(config.scoring.elite_threshold, 85);
        assert_eq!(config.cache.staleness_threshold_secs, 60);
        assert_eq!(config.cache.store_timeout_ms, 5_000);
        assert!(matches!(
            config.store,
            StoreConfig::Memory { persist: false, .. }
        ));
        config.validate().unwrap();
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut config = StandingsConfig::default();
        config.scoring.passing_threshold = 120;
        assert!(config.validate().is_err());

        let mut config = StandingsConfig::default();
        config.scoring.modules.clear();
        assert!(config.validate().is_err());

        // Stray weights are tolerated.
        let mut config = StandingsConfig::default();
        config.scoring.weights.insert("module9".into(), 10);
        config.validate().unwrap();
    }

    #[test]
    fn env_overrides() {
        let vars = HashMap::from([
            ("STANDINGS_DATASET", "/tmp/other.json"),
            ("STANDINGS_PASSING_THRESHOLD", " 55 "),
        ]);
        let mut config = StandingsConfig::default();
        apply_env_overrides(&mut config, |name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.scoring.passing_threshold, 55);
        assert_eq!(config.dataset_path(), Some(PathBuf::from("/tmp/other.json")));

        let bad = HashMap::from([("STANDINGS_PASSING_THRESHOLD", "lots")]);
        let mut config = StandingsConfig::default();
        assert!(apply_env_overrides(&mut config, |n| bad.get(n).map(|v| v.to_string())).is_err());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/standings.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[tokio::test]
    async fn dataset_is_resolved_next_to_config_file() {
        let dir = tempfile::tempdir().unwrap();
        Dataset::sample(chrono::Utc::now())
            .save_json(&dir.path().join("data.json"))
            .unwrap();
        let config_path = dir.path().join("standings.toml");
        std::fs::write(
            &config_path,
            "[store]\ntype = \"memory\"\ndataset = \"data.json\"\n",
        )
        .unwrap();

        let config = load_config_from(Some(&config_path)).unwrap();
        // STANDINGS_DATASET from the environment would take precedence.
        if std::env::var("STANDINGS_DATASET").is_err() {
            assert_eq!(config.dataset_path(), Some(dir.path().join("data.json")));
            let store = create_store(&config.store).unwrap();
            assert_eq!(store.name(), "memory");
            assert_eq!(store.roster(&Scope::Global).await.unwrap().len(), 6);
        }
    }
}
