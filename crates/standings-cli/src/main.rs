//! standings CLI — operator interface to the ranking engine.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use standings_core::model::Scope;

mod commands;

#[derive(Parser)]
#[command(name = "standings", version, about = "Student standings and ranking engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the ranking of a scope
    Rank {
        /// Scope: global, class:<id> or category:<name>
        #[arg(long, default_value = "global")]
        scope: Scope,

        /// Number of entries to show
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Output format: table, json, html
        #[arg(long, default_value = "table")]
        format: String,

        /// Where to write HTML output
        #[arg(long, default_value = "./standings-results/leaderboard.html")]
        output: PathBuf,

        /// Also save the full snapshot as JSON into this directory
        #[arg(long)]
        save: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show one student's rank and neighbours
    Student {
        /// Student id
        id: String,

        /// Scope to rank within
        #[arg(long, default_value = "global")]
        scope: Scope,

        /// Neighbours to show on each side
        #[arg(long, default_value = "5")]
        range: usize,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Record an attempt
    Submit {
        #[arg(long)]
        student: String,

        #[arg(long)]
        module: String,

        /// Raw score obtained
        #[arg(long)]
        score: f64,

        /// Maximum obtainable score
        #[arg(long)]
        max: f64,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Rebuild every scope's snapshot
    Regenerate {
        /// Save the regenerated snapshots as JSON into this directory
        #[arg(long)]
        save: Option<PathBuf>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Time the ranking strategies against each other
    Benchmark {
        #[arg(long, default_value = "global")]
        scope: Scope,

        /// Benchmark every known scope instead
        #[arg(long)]
        all_scopes: bool,

        #[arg(long, default_value = "10")]
        iterations: u32,

        /// Output format: table, json, html
        #[arg(long, default_value = "table")]
        format: String,

        /// Where to write HTML output
        #[arg(long, default_value = "./standings-results/benchmark.html")]
        output: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check that every strategy produces the same ranking
    Validate {
        #[arg(long, default_value = "global")]
        scope: Scope,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Summary statistics of a scope
    Stats {
        #[arg(long, default_value = "global")]
        scope: Scope,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two saved snapshots
    Compare {
        /// Earlier snapshot JSON
        #[arg(long)]
        previous: PathBuf,

        /// Later snapshot JSON
        #[arg(long)]
        current: PathBuf,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Create a starter config and sample dataset
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("standings=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Rank {
            scope,
            limit,
            format,
            output,
            save,
            config,
        } => commands::rank::execute(scope, limit, format, output, save, config).await,
        Commands::Student {
            id,
            scope,
            range,
            format,
            config,
        } => commands::student::execute(id, scope, range, format, config).await,
        Commands::Submit {
            student,
            module,
            score,
            max,
            format,
            config,
        } => commands::submit::execute(student, module, score, max, format, config).await,
        Commands::Regenerate {
            save,
            format,
            config,
        } => commands::regenerate::execute(save, format, config).await,
        Commands::Benchmark {
            scope,
            all_scopes,
            iterations,
            format,
            output,
            config,
        } => {
            commands::benchmark::execute(scope, all_scopes, iterations, format, output, config)
                .await
        }
        Commands::Validate {
            scope,
            format,
            config,
        } => commands::validate::execute(scope, format, config).await,
        Commands::Stats {
            scope,
            format,
            config,
        } => commands::stats::execute(scope, format, config).await,
        Commands::Compare {
            previous,
            current,
            format,
        } => commands::compare::execute(previous, current, format),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
