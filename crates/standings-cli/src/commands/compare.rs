//! The `standings compare` command.

use std::path::PathBuf;

use anyhow::Result;

use standings_core::model::RankingSnapshot;

pub fn execute(previous_path: PathBuf, current_path: PathBuf, format: String) -> Result<()> {
    let previous = RankingSnapshot::load_json(&previous_path)?;
    let current = RankingSnapshot::load_json(&current_path)?;

    anyhow::ensure!(
        previous.scope == current.scope,
        "snapshots cover different scopes: {} and {}",
        previous.scope,
        current.scope
    );

    let diff = current.compare(&previous);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", diff.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
        _ => {
            println!(
                "Comparison of {} v{} -> v{}: {} risers, {} fallers, {} unchanged",
                diff.scope,
                diff.previous_version,
                diff.current_version,
                diff.risers.len(),
                diff.fallers.len(),
                diff.unchanged
            );

            if !diff.risers.is_empty() {
                println!("\nRisers:");
                for m in &diff.risers {
                    println!(
                        "  {} #{} -> #{} ({:+})",
                        m.display_id,
                        m.previous_rank,
                        m.current_rank,
                        m.places()
                    );
                }
            }

            if !diff.fallers.is_empty() {
                println!("\nFallers:");
                for m in &diff.fallers {
                    println!(
                        "  {} #{} -> #{} ({:+})",
                        m.display_id,
                        m.previous_rank,
                        m.current_rank,
                        m.places()
                    );
                }
            }

            if !diff.joined.is_empty() {
                println!("\n{} joined: {}", diff.joined.len(), diff.joined.join(", "));
            }
            if !diff.left.is_empty() {
                println!("{} left: {}", diff.left.len(), diff.left.join(", "));
            }
        }
    }

    Ok(())
}
