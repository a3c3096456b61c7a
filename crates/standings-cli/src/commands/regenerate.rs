//! The `standings regenerate` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use super::open_service;

pub async fn execute(
    save: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let service = open_service(config_path.as_deref())?;
    let report = service.regenerate_all().await?;

    if let Some(dir) = &save {
        for scope in &report.regenerated {
            if let Some(snapshot) = service.cache().peek(scope) {
                snapshot.save_to_dir(dir)?;
            }
        }
        eprintln!(
            "Saved {} snapshot(s) to: {}",
            report.regenerated.len(),
            dir.display()
        );
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let mut table = Table::new();
        table.set_header(vec!["Scope", "Students", "Version", "Status"]);
        for scope in &report.regenerated {
            let (count, version) = service
                .cache()
                .peek(scope)
                .map(|s| (s.len().to_string(), s.version.to_string()))
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(scope),
                Cell::new(count),
                Cell::new(version),
                Cell::new("ok"),
            ]);
        }
        for failure in &report.errors {
            table.add_row(vec![
                Cell::new(&failure.scope),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(format!("FAILED: {}", failure.reason)),
            ]);
        }
        println!("{table}");
        println!(
            "Regenerated {} scope(s), {} failed ({}ms)",
            report.success_count, report.failure_count, report.duration_ms
        );
    }

    anyhow::ensure!(
        report.failure_count == 0,
        "{} scope(s) failed to regenerate",
        report.failure_count
    );
    Ok(())
}
