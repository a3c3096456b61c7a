//! The `standings rank` command.

use std::path::PathBuf;

use anyhow::Result;

use standings_core::model::Scope;
use standings_report::html::{generate_leaderboard_html, write_html};

use super::{entries_table, open_service};

pub async fn execute(
    scope: Scope,
    limit: usize,
    format: String,
    output: PathBuf,
    save: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(limit >= 1, "limit must be at least 1");

    let service = open_service(config_path.as_deref())?;
    let page = service.get_ranking(&scope, limit).await?;

    if let Some(dir) = &save {
        if let Some(snapshot) = service.cache().peek(&scope) {
            let path = snapshot.save_to_dir(dir)?;
            eprintln!("Snapshot saved to: {}", path.display());
        }
    }

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        "html" => {
            let snapshot = service
                .cache()
                .peek(&scope)
                .ok_or_else(|| anyhow::anyhow!("no snapshot available for {scope}"))?;
            let stats = service.ranking_stats(&scope).await?;
            let warning = page.warning.as_ref().map(ToString::to_string);
            let html = generate_leaderboard_html(&snapshot, Some(&stats), warning.as_deref());
            write_html(&html, &output)?;
            eprintln!("HTML leaderboard: {}", output.display());
        }
        _ => {
            println!(
                "{}: {} students, version {}, updated {}",
                page.scope,
                page.total_students,
                page.version,
                page.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(warning) = &page.warning {
                println!("Warning: {warning}");
            }
            if page.entries.is_empty() {
                println!("No students in this scope.");
            } else {
                println!("{}", entries_table(&page.entries, None));
            }
        }
    }

    Ok(())
}
