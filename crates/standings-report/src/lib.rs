//! standings-report — Self-contained HTML pages for leaderboards and
//! strategy benchmarks.

pub mod html;

pub use html::{generate_benchmark_html, generate_leaderboard_html, write_html};
