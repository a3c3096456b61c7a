//! The `standings validate` command.

use std::path::PathBuf;

use anyhow::Result;

use standings_core::model::Scope;

use super::open_service;

pub async fn execute(scope: Scope, format: String, config_path: Option<PathBuf>) -> Result<()> {
    let service = open_service(config_path.as_deref())?;
    let report = service.validate_consistency(&scope).await;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for summary in &report.summary {
            println!(
                "  {}: {} entries, top score {}",
                summary.strategy, summary.count, summary.top_score
            );
        }
        for difference in &report.differences {
            println!("  DIFFERENCE: {difference}");
        }
        for error in &report.errors {
            println!("  ERROR: {error}");
        }
        if report.is_consistent {
            println!("{scope}: all strategies consistent.");
        }
    }

    anyhow::ensure!(
        report.is_consistent,
        "{scope}: strategies are inconsistent ({} difference(s), {} error(s))",
        report.differences.len(),
        report.errors.len()
    );
    Ok(())
}
