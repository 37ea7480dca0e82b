//! simex-backtest
//!
//! Drives a [`simex_core::SimulatedVenue`] through historical data:
//!
//! - [`data_iterator`] : time-ordered merge of data streams
//! - [`clock`]         : simulated clock with named timers
//! - [`strategy`]      : strategy callbacks and the scripted command replayer
//! - [`algorithm`]     : TWAP execution and the primary/child spawn index
//! - [`engine`]        : the backtest loop and its JSON result
//! - [`config`]        : TOML configuration with `SIMEX_*` overrides
//! - [`sweep`]         : seed sweeps on blocking tasks

pub mod algorithm;
pub mod clock;
pub mod config;
pub mod data_iterator;
pub mod engine;
pub mod strategy;
pub mod sweep;

pub use algorithm::{twap_slices, ExecAlgorithmSummary, SpawnIndex, TwapAlgorithm};
pub use clock::{TestClock, TimeEvent};
pub use config::{BacktestConfig, read_env_or_default};
pub use data_iterator::DataIterator;
pub use engine::{run_backtest, BacktestEngine, BacktestResult};
pub use strategy::{ScriptedStrategy, Strategy, StrategyContext};
pub use sweep::run_sweep;
