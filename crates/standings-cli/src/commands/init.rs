//! The `standings init` command.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use standings_store::Dataset;

pub fn execute() -> Result<()> {
    if Path::new("standings.toml").exists() {
        println!("standings.toml already exists, skipping.");
    } else {
        std::fs::write("standings.toml", SAMPLE_CONFIG)?;
        println!("Created standings.toml");
    }

    let dataset_path = Path::new("data/dataset.json");
    if dataset_path.exists() {
        println!("data/dataset.json already exists, skipping.");
    } else {
        Dataset::sample(Utc::now()).save_json(dataset_path)?;
        println!("Created data/dataset.json");
    }

    println!("\nNext steps:");
    println!("  1. Edit standings.toml to match your modules and weights");
    println!("  2. Run: standings rank --scope global");
    println!("  3. Run: standings validate --scope global");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# standings configuration

[scoring]
passing_threshold = 70
elite_threshold = 85
modules = ["module1", "module2", "module3", "module4"]
active_window_days = 7

[scoring.weights]
module1 = 70
module2 = 30
module3 = 100
module4 = 100

[cache]
store_timeout_ms = 5000
regeneration_timeout_ms = 60000
staleness_threshold_secs = 300
read_cache_ttl_ms = 2000
regeneration_parallelism = 4

[submission]
max_attempts = 3
retry_backoff_ms = 20

[store]
type = "memory"
dataset = "data/dataset.json"
persist = true
"#;
