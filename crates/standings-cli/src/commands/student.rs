//! The `standings student` command.

use std::path::PathBuf;

use anyhow::Result;

use standings_core::model::Scope;

use super::{entries_table, open_service};

pub async fn execute(
    student_id: String,
    scope: Scope,
    range: usize,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let service = open_service(config_path.as_deref())?;

    let rank = service
        .get_student_rank(&student_id, &scope)
        .await?
        .ok_or_else(|| anyhow::anyhow!("student {student_id} is not ranked in {scope}"))?;
    let nearby = service.nearby_in(&scope, &student_id, range).await?;

    if format == "json" {
        let value = serde_json::json!({
            "student_id": student_id,
            "scope": scope,
            "rank": rank,
            "nearby": nearby,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "{student_id} is #{} of {} in {scope} (percentile {})",
        rank.rank, rank.total_students, rank.percentile
    );

    let rows: Vec<_> = nearby
        .above
        .iter()
        .chain(nearby.current.iter())
        .chain(nearby.below.iter())
        .cloned()
        .collect();
    println!("{}", entries_table(&rows, Some(&student_id)));

    if let Some(current) = &nearby.current {
        let modules: Vec<String> = current
            .module_scores
            .iter()
            .map(|(module, score)| format!("{module} {score}"))
            .collect();
        println!("Modules: {}", modules.join(", "));
    }

    Ok(())
}
