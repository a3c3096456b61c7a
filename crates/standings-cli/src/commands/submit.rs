//! The `standings submit` command.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;

use standings_core::model::AttemptRecord;

use super::open_service;

pub async fn execute(
    student_id: String,
    module_id: String,
    raw_score: f64,
    max_score: f64,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let service = open_service(config_path.as_deref())?;

    let outcome = service
        .submit(AttemptRecord {
            student_id,
            module_id,
            raw_score,
            max_score,
            timestamp: Utc::now(),
            attempt_index: 0,
        })
        .await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let attempt = &outcome.attempt;
    println!(
        "Recorded attempt #{} for {} on {}: module score {} -> {}",
        attempt.attempt_index,
        attempt.student_id,
        attempt.module_id,
        outcome.previous_score,
        outcome.new_score
    );
    if outcome.reached_perfect {
        println!("Perfect score reached!");
    }
    if outcome.newly_completed {
        println!("Module completed.");
    }
    if outcome.tries > 1 {
        println!("(needed {} tries due to concurrent writes)", outcome.tries);
    }

    let invalidated: Vec<String> = outcome.invalidated.iter().map(|s| s.key()).collect();
    println!("Invalidated: {}", invalidated.join(", "));

    Ok(())
}
