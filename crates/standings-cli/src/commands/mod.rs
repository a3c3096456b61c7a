//! Subcommand implementations.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};

use standings_core::model::RankingEntry;
use standings_core::service::StandingsService;
use standings_store::{create_store, load_config_from};

pub mod benchmark;
pub mod compare;
pub mod init;
pub mod rank;
pub mod regenerate;
pub mod stats;
pub mod student;
pub mod submit;
pub mod validate;

/// Load the configuration and wire a service over the configured store.
pub fn open_service(config_path: Option<&Path>) -> Result<StandingsService> {
    let config = load_config_from(config_path)?;
    let store = create_store(&config.store)?;
    tracing::debug!(store = store.name(), "store ready");
    Ok(StandingsService::new(
        store,
        config.scoring,
        config.cache,
        config.submission,
    ))
}

/// Ranking rows as a table.
pub fn entries_table(entries: &[RankingEntry], highlight: Option<&str>) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Rank", "Student", "Score", "Progress", "Modules", "Tier", "Change",
    ]);
    for entry in entries {
        let marker = if highlight == Some(entry.student_id.as_str()) {
            "→ "
        } else {
            ""
        };
        table.add_row(vec![
            Cell::new(format!("{marker}{}", entry.rank)),
            Cell::new(&entry.display_id),
            Cell::new(entry.total_weighted_score),
            Cell::new(format!("{}%", entry.overall_progress_pct)),
            Cell::new(format!("{}/{}", entry.completed_modules, entry.total_modules)),
            Cell::new(entry.achievement_tier.label()),
            Cell::new(entry.rank_delta),
        ]);
    }
    table
}
