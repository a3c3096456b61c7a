//! The `standings stats` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use standings_core::model::Scope;

use super::open_service;

pub async fn execute(scope: Scope, format: String, config_path: Option<PathBuf>) -> Result<()> {
    let service = open_service(config_path.as_deref())?;
    let stats = service.ranking_stats(&scope).await?;

    if format == "json" {
        let value = serde_json::json!({
            "ranking": stats,
            "cache": service.cache_stats(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec![Cell::new("Students"), Cell::new(stats.total_students)]);
    table.add_row(vec![Cell::new("Active"), Cell::new(stats.active_students)]);
    table.add_row(vec![
        Cell::new("Average progress"),
        Cell::new(format!("{}%", stats.average_progress)),
    ]);
    table.add_row(vec![
        Cell::new("Average score"),
        Cell::new(stats.average_score),
    ]);
    table.add_row(vec![Cell::new("Top score"), Cell::new(stats.top_score)]);
    table.add_row(vec![
        Cell::new("Completion rate"),
        Cell::new(format!("{}%", stats.completion_rate)),
    ]);
    for (tier, count) in &stats.tiers {
        table.add_row(vec![Cell::new(tier.label()), Cell::new(count)]);
    }

    println!("{scope}");
    println!("{table}");
    Ok(())
}
