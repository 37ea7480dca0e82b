//! Seed sweeps.
//!
//! Every seed gets its own engine on a blocking task; nothing is shared
//! between runs except the read-only config. Results come back over an
//! mpsc channel in completion order and are returned in seed order.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::BacktestConfig;
use crate::engine::{run_backtest, BacktestResult};

pub async fn run_sweep(config: Arc<BacktestConfig>, seeds: &[u64]) -> anyhow::Result<Vec<BacktestResult>> {
    info!(runs = seeds.len(), "starting sweep");
    let (tx, mut rx) = mpsc::channel(seeds.len().max(1));

    for (slot, &seed) in seeds.iter().enumerate() {
        let tx = tx.clone();
        let config = Arc::clone(&config);
        tokio::task::spawn_blocking(move || {
            let result = run_backtest(&config, seed);
            // the receiver only goes away if the sweep already failed
            let _ = tx.blocking_send((slot, seed, result));
        });
    }
    drop(tx);

    let mut results: Vec<Option<BacktestResult>> = (0..seeds.len()).map(|_| None).collect();
    while let Some((slot, seed, result)) = rx.recv().await {
        let result = result.with_context(|| format!("backtest with seed {seed} failed"))?;
        debug!(seed, fills = result.fills.len(), "sweep run finished");
        results[slot] = Some(result);
    }

    results
        .into_iter()
        .zip(seeds)
        .map(|(result, seed)| result.ok_or_else(|| anyhow!("backtest with seed {seed} did not finish")))
        .collect()
}
