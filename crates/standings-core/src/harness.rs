//! Consistency validation and latency benchmarking across ranking backends.
//!
//! Each backend's iterations run sequentially so their timings do not
//! interfere; independent scopes may be benchmarked concurrently with
//! [`Harness::benchmark_scopes`]. A failing backend is recorded, never
//! fatal.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::cache::SnapshotCache;
use crate::model::{RankingSnapshot, Scope, SourceStrategy};
use crate::strategy::{standard_backends, RankingBackend};

/// Score deltas at or below this are considered equal.
pub const SCORE_TOLERANCE: f64 = 0.1;

/// Latency figures for one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTiming {
    pub strategy: SourceStrategy,
    pub iterations: u32,
    pub successes: u32,
    /// Average over successful iterations; `None` if none succeeded.
    pub avg_latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Result of benchmarking every backend on one scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub scope: Scope,
    pub iterations: u32,
    pub timings: Vec<StrategyTiming>,
    /// Backend with the lowest average latency.
    pub winner: Option<SourceStrategy>,
    /// `(slowest average / winner average − 1) × 100`.
    pub performance_gain_pct: f64,
    pub duration_ms: u64,
}

impl BenchmarkReport {
    pub fn timing(&self, strategy: SourceStrategy) -> Option<&StrategyTiming> {
        self.timings.iter().find(|t| t.strategy == strategy)
    }

    pub fn has_errors(&self) -> bool {
        self.timings.iter().any(|t| !t.errors.is_empty())
    }
}

/// A disagreement between a backend and the reference backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inconsistency {
    EntryCount {
        strategy: SourceStrategy,
        expected: usize,
        actual: usize,
    },
    TopScore {
        strategy: SourceStrategy,
        expected: u32,
        actual: u32,
    },
    StudentScore {
        strategy: SourceStrategy,
        student_id: String,
        expected: u32,
        actual: u32,
    },
    MissingStudent {
        strategy: SourceStrategy,
        student_id: String,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::EntryCount {
                strategy,
                expected,
                actual,
            } => write!(f, "{strategy}: {actual} entries, expected {expected}"),
            Inconsistency::TopScore {
                strategy,
                expected,
                actual,
            } => write!(f, "{strategy}: top score {actual}, expected {expected}"),
            Inconsistency::StudentScore {
                strategy,
                student_id,
                expected,
                actual,
            } => write!(
                f,
                "{strategy}: student {student_id} scored {actual}, expected {expected}"
            ),
            Inconsistency::MissingStudent {
                strategy,
                student_id,
            } => write!(f, "{strategy}: student {student_id} missing"),
        }
    }
}

/// Headline numbers of one backend's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: SourceStrategy,
    pub count: usize,
    pub top_score: u32,
}

/// Outcome of cross-checking every backend on one scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub scope: Scope,
    pub checked_at: DateTime<Utc>,
    /// True when every backend answered and none disagreed.
    pub is_consistent: bool,
    /// Backend the others are compared against.
    pub reference: Option<SourceStrategy>,
    pub differences: Vec<Inconsistency>,
    pub summary: Vec<StrategySummary>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Runs the same requests through several backends.
pub struct Harness {
    backends: Vec<Arc<dyn RankingBackend>>,
}

impl Harness {
    pub fn new(backends: Vec<Arc<dyn RankingBackend>>) -> Self {
        Self { backends }
    }

    /// On-demand, read-cached and pre-aggregated backends over `cache`.
    pub fn standard(cache: &Arc<SnapshotCache>) -> Self {
        Self::new(standard_backends(cache))
    }

    pub fn strategies(&self) -> Vec<SourceStrategy> {
        self.backends.iter().map(|b| b.strategy()).collect()
    }

    /// Time `iterations` requests per backend against `scope`.
    pub async fn benchmark(&self, scope: &Scope, iterations: u32) -> BenchmarkReport {
        let iterations = iterations.max(1);
        let start = Instant::now();
        let mut timings = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            timings.push(time_backend(backend.as_ref(), scope, iterations).await);
        }

        let (winner, performance_gain_pct) = pick_winner(&timings);
        tracing::info!(
            scope = %scope,
            iterations,
            winner = ?winner,
            performance_gain_pct,
            "benchmark finished"
        );

        BenchmarkReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            scope: scope.clone(),
            iterations,
            timings,
            winner,
            performance_gain_pct,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Benchmark several scopes concurrently, one report per scope, in
    /// input order.
    pub async fn benchmark_scopes(
        &self,
        scopes: &[Scope],
        iterations: u32,
    ) -> Vec<BenchmarkReport> {
        join_all(scopes.iter().map(|scope| self.benchmark(scope, iterations))).await
    }

    /// Fetch `scope` through every backend and compare each with the first
    /// backend that answered.
    pub async fn validate_consistency(&self, scope: &Scope) -> ConsistencyReport {
        let mut answers: Vec<(SourceStrategy, Arc<RankingSnapshot>)> = Vec::new();
        let mut errors = Vec::new();

        for backend in &self.backends {
            match backend.ranking(scope).await {
                Ok(snapshot) => answers.push((backend.strategy(), snapshot)),
                Err(e) => errors.push(format!("{}: {e}", backend.strategy())),
            }
        }

        let summary: Vec<StrategySummary> = answers
            .iter()
            .map(|(strategy, snap)| StrategySummary {
                strategy: *strategy,
                count: snap.len(),
                top_score: snap.top_score(),
            })
            .collect();

        let mut differences = Vec::new();
        if let Some(((_, reference), others)) = answers.split_first() {
            for (strategy, candidate) in others {
                differences.extend(compare_snapshots(*strategy, reference, candidate));
            }
        }

        let is_consistent = differences.is_empty() && errors.is_empty();
        if !is_consistent {
            tracing::warn!(
                scope = %scope,
                differences = differences.len(),
                errors = errors.len(),
                "ranking backends disagree"
            );
        }

        ConsistencyReport {
            scope: scope.clone(),
            checked_at: Utc::now(),
            is_consistent,
            reference: answers.first().map(|(s, _)| *s),
            differences,
            summary,
            errors,
        }
    }
}

async fn time_backend(
    backend: &dyn RankingBackend,
    scope: &Scope,
    iterations: u32,
) -> StrategyTiming {
    let strategy = backend.strategy();
    let mut latencies = Vec::with_capacity(iterations as usize);
    let mut errors = Vec::new();

    for i in 1..=iterations {
        let started = Instant::now();
        match backend.ranking(scope).await {
            Ok(_) => latencies.push(started.elapsed().as_micros() as f64 / 1000.0),
            Err(e) => {
                tracing::debug!(
                    strategy = %strategy,
                    iteration = i,
                    "benchmark iteration failed: {e}"
                );
                errors.push(format!("{strategy} iteration {i}: {e}"));
            }
        }
    }

    let successes = latencies.len() as u32;
    let avg = (!latencies.is_empty())
        .then(|| latencies.iter().sum::<f64>() / latencies.len() as f64);
    StrategyTiming {
        strategy,
        iterations,
        successes,
        avg_latency_ms: avg,
        min_latency_ms: latencies.iter().copied().reduce(f64::min),
        max_latency_ms: latencies.iter().copied().reduce(f64::max),
        errors,
    }
}

/// Fastest backend and its gain over the slowest, among backends with at
/// least one successful iteration.
fn pick_winner(timings: &[StrategyTiming]) -> (Option<SourceStrategy>, f64) {
    let measured: Vec<(SourceStrategy, f64)> = timings
        .iter()
        .filter_map(|t| t.avg_latency_ms.map(|avg| (t.strategy, avg)))
        .collect();

    let Some(&(winner, fastest)) = measured.iter().min_by(|a, b| a.1.total_cmp(&b.1)) else {
        return (None, 0.0);
    };
    let slowest = measured.iter().map(|m| m.1).fold(fastest, f64::max);
    let gain = if fastest > 0.0 {
        (slowest / fastest - 1.0) * 100.0
    } else {
        0.0
    };
    (Some(winner), gain)
}

/// Differences of `candidate` from `reference`: entry count, top score and
/// every student's weighted score.
pub fn compare_snapshots(
    strategy: SourceStrategy,
    reference: &RankingSnapshot,
    candidate: &RankingSnapshot,
) -> Vec<Inconsistency> {
    let mut out = Vec::new();
    let differs = |a: u32, b: u32| (f64::from(a) - f64::from(b)).abs() > SCORE_TOLERANCE;

    if reference.len() != candidate.len() {
        out.push(Inconsistency::EntryCount {
            strategy,
            expected: reference.len(),
            actual: candidate.len(),
        });
    }
    if differs(reference.top_score(), candidate.top_score()) {
        out.push(Inconsistency::TopScore {
            strategy,
            expected: reference.top_score(),
            actual: candidate.top_score(),
        });
    }

    let scores: HashMap<&str, u32> = candidate
        .entries
        .iter()
        .map(|e| (e.student_id.as_str(), e.total_weighted_score))
        .collect();
    for entry in &reference.entries {
        match scores.get(entry.student_id.as_str()) {
            Some(&actual) if differs(entry.total_weighted_score, actual) => {
                out.push(Inconsistency::StudentScore {
                    strategy,
                    student_id: entry.student_id.clone(),
                    expected: entry.total_weighted_score,
                    actual,
                })
            }
            Some(_) => {}
            None => out.push(Inconsistency::MissingStudent {
                strategy,
                student_id: entry.student_id.clone(),
            }),
        }
    }
    out
}
