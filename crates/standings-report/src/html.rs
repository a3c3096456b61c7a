//! HTML page generator.
//!
//! Produces self-contained HTML files with all CSS/JS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use standings_core::harness::{BenchmarkReport, ConsistencyReport, StrategyTiming};
use standings_core::model::{RankDelta, RankingSnapshot};
use standings_core::statistics::RankingStats;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn page_start(html: &mut String, title: &str) {
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", html_escape(title)));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");
}

fn page_end(html: &mut String, raw_json: String) {
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&raw_json.replace('<', "&lt;").replace('>', "&gt;"));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");
    html.push_str("</body>\n</html>");
}

fn delta_marker(delta: RankDelta) -> &'static str {
    match delta {
        RankDelta::Up => "▲",
        RankDelta::Down => "▼",
        RankDelta::Same => "=",
        RankDelta::New => "new",
    }
}

/// Generate a leaderboard page for one snapshot.
///
/// `warning` is the staleness notice shown above the table, if any.
pub fn generate_leaderboard_html(
    snapshot: &RankingSnapshot,
    stats: Option<&RankingStats>,
    warning: Option<&str>,
) -> String {
    let mut html = String::new();
    page_start(&mut html, &format!("standings — {}", snapshot.scope));

    html.push_str("<header>\n");
    html.push_str(&format!(
        "<h1>Leaderboard: {}</h1>\n",
        html_escape(&snapshot.scope.to_string())
    ));
    html.push_str(&format!(
        "<p class=\"meta\">{} students | version {} | {} | last updated {}</p>\n",
        snapshot.len(),
        snapshot.version,
        snapshot.source_strategy,
        snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(warning) = warning {
        html.push_str(&format!(
            "<p class=\"stale\">{}</p>\n",
            html_escape(warning)
        ));
    }
    html.push_str("</header>\n");

    if let Some(stats) = stats {
        html.push_str("<section class=\"dashboard\">\n");
        html.push_str("<h2>Summary</h2>\n");
        html.push_str("<table class=\"summary\">\n");
        html.push_str("<thead><tr><th>Students</th><th>Active</th><th>Avg Progress</th><th>Avg Score</th><th>Top Score</th><th>Completion</th></tr></thead>\n");
        html.push_str(&format!(
            "<tbody><tr><td>{}</td><td>{}</td><td>{}%</td><td>{}</td><td>{}</td><td>{}%</td></tr></tbody>\n",
            stats.total_students,
            stats.active_students,
            stats.average_progress,
            stats.average_score,
            stats.top_score,
            stats.completion_rate
        ));
        html.push_str("</table>\n");
        if !stats.tiers.is_empty() {
            let bars: Vec<(String, f64, String)> = stats
                .tiers
                .iter()
                .map(|(tier, &count)| {
                    (
                        tier.label().to_string(),
                        count as f64 / stats.total_students.max(1) as f64,
                        count.to_string(),
                    )
                })
                .collect();
            html.push_str(&generate_bar_chart(&bars));
        }
        html.push_str("</section>\n");
    }

    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Ranking</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">Rank</th><th onclick=\"sortTable(1)\">Student</th><th onclick=\"sortTable(2)\">Score</th><th onclick=\"sortTable(3)\">Progress</th><th onclick=\"sortTable(4)\">Tier</th><th onclick=\"sortTable(5)\">Change</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for entry in &snapshot.entries {
        let row_class = if entry.completed_modules == entry.total_modules {
            "pass"
        } else {
            ""
        };
        html.push_str(&format!(
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}%</td><td>{}</td><td>{}</td></tr>\n",
            row_class,
            entry.rank,
            html_escape(&entry.display_id),
            entry.total_weighted_score,
            entry.overall_progress_pct,
            html_escape(entry.achievement_tier.label()),
            delta_marker(entry.rank_delta)
        ));
    }
    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    page_end(
        &mut html,
        serde_json::to_string_pretty(snapshot).unwrap_or_default(),
    );
    html
}

fn latency_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}ms"))
}

/// Generate a page comparing ranking strategies on one scope.
pub fn generate_benchmark_html(
    report: &BenchmarkReport,
    consistency: Option<&ConsistencyReport>,
) -> String {
    let mut html = String::new();
    page_start(&mut html, &format!("standings benchmark — {}", report.scope));

    html.push_str("<header>\n");
    html.push_str("<h1>Strategy benchmark</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Scope: <strong>{}</strong> | {} iterations | {}</p>\n",
        html_escape(&report.scope.to_string()),
        report.iterations,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    match report.winner {
        Some(winner) => html.push_str(&format!(
            "<p>Winner: <strong>{winner}</strong> ({:.1}% faster than the slowest)</p>\n",
            report.performance_gain_pct
        )),
        None => html.push_str("<p>No winner: no strategy completed an iteration.</p>\n"),
    }
    html.push_str("</header>\n");

    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Latency</h2>\n");
    html.push_str("<table class=\"summary\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">Strategy</th><th onclick=\"sortTable(1)\">Avg</th><th onclick=\"sortTable(2)\">Min</th><th onclick=\"sortTable(3)\">Max</th><th onclick=\"sortTable(4)\">Successes</th><th>Errors</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for t in &report.timings {
        let class = if t.errors.is_empty() { "pass" } else { "fail" };
        html.push_str(&format!(
            "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td><td>{}</td></tr>\n",
            class,
            t.strategy,
            latency_cell(t.avg_latency_ms),
            latency_cell(t.min_latency_ms),
            latency_cell(t.max_latency_ms),
            t.successes,
            t.iterations,
            html_escape(&t.errors.join("; "))
        ));
    }
    html.push_str("</tbody></table>\n");
    html.push_str(&latency_chart(&report.timings));
    html.push_str("</section>\n");

    if let Some(consistency) = consistency {
        html.push_str("<section class=\"results\">\n");
        html.push_str("<h2>Consistency</h2>\n");
        let (class, verdict) = if consistency.is_consistent {
            ("pass", "All strategies agree")
        } else {
            ("fail", "Strategies disagree")
        };
        html.push_str(&format!("<p class=\"{class}\">{verdict}</p>\n"));
        if !consistency.differences.is_empty() || !consistency.errors.is_empty() {
            html.push_str("<ul>\n");
            for d in &consistency.differences {
                html.push_str(&format!("<li>{}</li>\n", html_escape(&d.to_string())));
            }
            for e in &consistency.errors {
                html.push_str(&format!("<li class=\"fail\">{}</li>\n", html_escape(e)));
            }
            html.push_str("</ul>\n");
        }
        html.push_str("</section>\n");
    }

    page_end(
        &mut html,
        serde_json::to_string_pretty(report).unwrap_or_default(),
    );
    html
}

/// Bars scaled against the slowest average.
fn latency_chart(timings: &[StrategyTiming]) -> String {
    let slowest = timings
        .iter()
        .filter_map(|t| t.avg_latency_ms)
        .fold(0.0_f64, f64::max);
    if slowest <= 0.0 {
        return String::new();
    }
    let bars: Vec<(String, f64, String)> = timings
        .iter()
        .filter_map(|t| {
            t.avg_latency_ms
                .map(|avg| (t.strategy.to_string(), avg / slowest, format!("{avg:.3}ms")))
        })
        .collect();
    generate_bar_chart(&bars)
}

/// Horizontal SVG bars of `(label, fraction, caption)`.
fn generate_bar_chart(bars: &[(String, f64, String)]) -> String {
    let bar_height = 30;
    let max_width = 400;
    let padding = 10;
    let label_width = 200;

    let total_height = bars.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 80,
        total_height
    );

    for (i, (label, fraction, caption)) in bars.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let width = (fraction.clamp(0.0, 1.0) * max_width as f64) as usize;

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(label)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"#3b82f6\" rx=\"4\"/>\n",
            label_width, y, width, bar_height
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{}</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            html_escape(caption)
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

/// Write an HTML page to a file.
pub fn write_html(html: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML to {}", path.display()))?;
    Ok(())
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; --warn: #fef3c7; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; --warn: #78350f; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
.stale { background: var(--warn); padding: 0.5rem 1rem; border-radius: 8px; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
.pass { background: var(--pass); }
.fail { background: var(--fail); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = parseFloat(va), nb = parseFloat(vb);
    const cmp = !isNaN(na) && !isNaN(nb) ? na - nb : va.localeCompare(vb);
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    use standings_core::harness::Inconsistency;
    use standings_core::model::{AchievementTier, RankingEntry, Scope, SourceStrategy};

    fn snapshot() -> RankingSnapshot {
        let generated_at = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let entry = |id: &str, rank: u32, score: u32, delta: RankDelta| RankingEntry {
            student_id: id.into(),
            display_id: id.into(),
            module_scores: BTreeMap::new(),
            total_weighted_score: score,
            overall_progress_pct: 50,
            completed_modules: 2,
            total_modules: 4,
            achievement_tier: AchievementTier::Intermediate,
            rank,
            previous_rank: None,
            rank_delta: delta,
            percentile: 50,
            scope: Scope::class("7b"),
            generated_at,
            earliest_perfect_at: None,
            last_activity: None,
        };
        RankingSnapshot {
            scope: Scope::class("7b"),
            entries: vec![
                entry("<script>", 1, 80, RankDelta::Up),
                entry("bia", 2, 45, RankDelta::New),
            ],
            generated_at,
            version: 3,
            source_strategy: SourceStrategy::PreAggregated,
        }
    }

    fn timing(strategy: SourceStrategy, avg: Option<f64>, errors: Vec<String>) -> StrategyTiming {
        StrategyTiming {
            strategy,
            iterations: 5,
            successes: if avg.is_some() { 5 } else { 0 },
            avg_latency_ms: avg,
            min_latency_ms: avg,
            max_latency_ms: avg,
            errors,
        }
    }

    #[test]
    fn leaderboard_contains_entries_and_escapes() {
        let snap = snapshot();
        let html = generate_leaderboard_html(&snap, None, Some("ranking is stale"));

        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("class:7b"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("bia"));
        assert!(html.contains("ranking is stale"));
        assert!(html.contains("Intermediário"));
    }

    #[test]
    fn leaderboard_with_stats_has_summary() {
        let snap = snapshot();
        let stats = RankingStats {
            scope: snap.scope.clone(),
            total_students: 2,
            active_students: 1,
            average_progress: 50,
            average_score: 63,
            top_score: 80,
            completion_rate: 0,
            tiers: BTreeMap::from([(AchievementTier::Intermediate, 2)]),
            generated_at: snap.generated_at,
        };
        let html = generate_leaderboard_html(&snap, Some(&stats), None);
        assert!(html.contains("<h2>Summary</h2>"));
        assert!(html.contains("<svg"));
        assert!(!html.contains("class=\"stale\""));
    }

    #[test]
    fn benchmark_page_lists_strategies_and_differences() {
        let report = BenchmarkReport {
            id: uuid::Uuid::nil(),
            created_at: Utc::now(),
            scope: Scope::Global,
            iterations: 5,
            timings: vec![
                timing(SourceStrategy::OnDemand, Some(12.0), vec![]),
                timing(SourceStrategy::ReadCached, Some(3.0), vec![]),
                timing(
                    SourceStrategy::PreAggregated,
                    None,
                    vec!["store unavailable".into()],
                ),
            ],
            winner: Some(SourceStrategy::ReadCached),
            performance_gain_pct: 300.0,
            duration_ms: 80,
        };
        let consistency = ConsistencyReport {
            scope: Scope::Global,
            checked_at: Utc::now(),
            is_consistent: false,
            reference: Some(SourceStrategy::OnDemand),
            differences: vec![Inconsistency::MissingStudent {
                strategy: SourceStrategy::ReadCached,
                student_id: "ana".into(),
            }],
            summary: vec![],
            errors: vec![],
        };

        let html = generate_benchmark_html(&report, Some(&consistency));
        assert!(html.contains("read_cached"));
        assert!(html.contains("300.0% faster"));
        assert!(html.contains("store unavailable"));
        assert!(html.contains("Strategies disagree"));
        assert!(html.contains("student ana missing"));
    }

    #[test]
    fn write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("leaderboard.html");
        write_html(&generate_leaderboard_html(&snapshot(), None, None), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<html"));
    }
}
