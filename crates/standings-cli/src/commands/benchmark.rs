//! The `standings benchmark` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use standings_core::harness::BenchmarkReport;
use standings_core::model::Scope;
use standings_report::html::{generate_benchmark_html, write_html};

use super::open_service;

pub async fn execute(
    scope: Scope,
    all_scopes: bool,
    iterations: u32,
    format: String,
    output: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(iterations >= 1, "iterations must be at least 1");

    let service = open_service(config_path.as_deref())?;

    let reports = if all_scopes {
        let scopes = service.known_scopes().await?;
        eprintln!(
            "Benchmarking {} scopes x {} iterations",
            scopes.len(),
            iterations
        );
        service.benchmark_scopes(&scopes, iterations).await
    } else {
        vec![service.benchmark(&scope, iterations).await]
    };

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        "html" => {
            // One page per scope; a single scope keeps the requested path.
            for report in &reports {
                let path = if reports.len() == 1 {
                    output.clone()
                } else {
                    output.with_file_name(format!(
                        "benchmark-{}.html",
                        report.scope.key().replace(':', "_")
                    ))
                };
                let consistency = service.validate_consistency(&report.scope).await;
                write_html(&generate_benchmark_html(report, Some(&consistency)), &path)?;
                eprintln!("HTML benchmark: {}", path.display());
            }
        }
        _ => {
            for report in &reports {
                print_report(report);
            }
        }
    }

    Ok(())
}

fn print_report(report: &BenchmarkReport) {
    let ms = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.3}ms"));

    let mut table = Table::new();
    table.set_header(vec!["Strategy", "Avg", "Min", "Max", "OK", "Errors"]);
    for t in &report.timings {
        table.add_row(vec![
            Cell::new(t.strategy),
            Cell::new(ms(t.avg_latency_ms)),
            Cell::new(ms(t.min_latency_ms)),
            Cell::new(ms(t.max_latency_ms)),
            Cell::new(format!("{}/{}", t.successes, t.iterations)),
            Cell::new(t.errors.len()),
        ]);
    }

    println!("\n{} ({} iterations)", report.scope, report.iterations);
    println!("{table}");
    match report.winner {
        Some(winner) => println!(
            "Winner: {winner} ({:.1}% faster than the slowest)",
            report.performance_gain_pct
        ),
        None => println!("No winner: every strategy failed."),
    }
}
