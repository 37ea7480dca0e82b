// crates/simex-backtest/src/main.rs

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use simex_backtest::{run_backtest, run_sweep, BacktestConfig};

#[derive(Parser)]
#[clap(name = "simex-backtest")]
#[clap(about = "Deterministic execution simulator: replay market data against scripted strategies")]
struct Cli {
    /// Backtest config (TOML)
    #[clap(short, long)]
    config: PathBuf,

    /// Fill model seed, overriding the config and SIMEX_SEED
    #[clap(short, long)]
    seed: Option<u64>,

    /// Comma separated seeds to run in parallel
    #[clap(long, value_delimiter = ',')]
    sweep: Vec<u64>,

    /// Write the JSON result here instead of stdout
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = BacktestConfig::load(&cli.config)?;
    config.apply_env_overrides()?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    let output = cli.output.or_else(|| config.output.clone());

    let seeds = if cli.sweep.is_empty() {
        config.sweep_seeds.clone()
    } else {
        cli.sweep
    };

    let json = if seeds.is_empty() {
        let result = run_backtest(&config, config.seed)?;
        result.to_json()?
    } else {
        let results = run_sweep(Arc::new(config), &seeds).await?;
        serde_json::to_string_pretty(&results)?
    };

    match output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "result written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
