//! Backtest configuration.
//!
//! Loaded from a TOML file; a few settings can then be overridden from the
//! environment:
//!
//! - `SIMEX_SEED`            (u64, base fill model seed)
//! - `SIMEX_TRADE_EXECUTION` (bool, match resting orders against trade ticks)
//! - `SIMEX_BAR_EXECUTION`   (bool, match resting orders against bars)
//! - `SIMEX_OUTPUT`          (path for the JSON result)
//!
//! Relative data and command paths are resolved against the directory of
//! the config file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use simex_core::fill_model::DEFAULT_SEED;
use simex_core::{Instrument, InstrumentError, InstrumentId, InstrumentRegistry, Quantity, StrategyId, UnixNanos, VenueConfig};
use thiserror::Error;

pub const ENV_SEED: &str = "SIMEX_SEED";
pub const ENV_TRADE_EXECUTION: &str = "SIMEX_TRADE_EXECUTION";
pub const ENV_BAR_EXECUTION: &str = "SIMEX_BAR_EXECUTION";
pub const ENV_OUTPUT: &str = "SIMEX_OUTPUT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {message}")]
    InvalidEnv {
        key: String,
        value: String,
        message: String,
    },

    #[error("instrument {id}: {source}")]
    Instrument {
        id: InstrumentId,
        #[source]
        source: InstrumentError,
    },

    #[error("config lists no instruments")]
    NoInstruments,
}

/// Instrument definition as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub id: InstrumentId,
    pub price_precision: u32,
    pub size_precision: u32,
    #[serde(default)]
    pub price_increment: Option<Decimal>,
    #[serde(default)]
    pub size_increment: Option<Quantity>,
    #[serde(default)]
    pub min_quantity: Option<Quantity>,
    #[serde(default)]
    pub max_quantity: Option<Quantity>,
    #[serde(default)]
    pub maker_fee: Decimal,
    #[serde(default)]
    pub taker_fee: Decimal,
}

impl InstrumentConfig {
    pub fn build(&self) -> Result<Instrument, ConfigError> {
        let wrap = |source| ConfigError::Instrument {
            id: self.id.clone(),
            source,
        };
        let mut instrument =
            Instrument::new(self.id.clone(), self.price_precision, self.size_precision).map_err(wrap)?;
        if let Some(increment) = self.price_increment {
            instrument = instrument.with_price_increment(increment);
        }
        if let Some(increment) = self.size_increment {
            instrument = instrument.with_size_increment(increment);
        }
        instrument = instrument
            .with_quantity_limits(self.min_quantity, self.max_quantity)
            .with_fees(self.maker_fee, self.taker_fee);
        instrument.validate().map_err(wrap)?;
        Ok(instrument)
    }
}

/// A named market data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFileConfig {
    pub name: String,
    pub path: PathBuf,
}

/// A strategy that replays a command file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub strategy_id: StrategyId,
    pub commands: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default)]
    pub venue: VenueConfig,

    pub instruments: Vec<InstrumentConfig>,

    #[serde(default)]
    pub data: Vec<DataFileConfig>,

    #[serde(default)]
    pub strategies: Vec<ScriptConfig>,

    /// Base seed; engine `i` on the venue uses `seed + i`.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Seeds for a parameter sweep. Empty runs a single backtest.
    #[serde(default)]
    pub sweep_seeds: Vec<u64>,

    /// Timers are fired up to this time after the data runs out.
    #[serde(default)]
    pub end_time: Option<UnixNanos>,

    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl BacktestConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: BacktestConfig = toml::from_str(text).context("invalid backtest config")?;
        if config.instruments.is_empty() {
            return Err(ConfigError::NoInstruments.into());
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_toml_str(&text)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Apply the `SIMEX_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.seed = read_env_or_default(ENV_SEED, self.seed)?;
        let matching = &mut self.venue.matching;
        matching.trade_execution = read_env_or_default(ENV_TRADE_EXECUTION, matching.trade_execution)?;
        matching.bar_execution = read_env_or_default(ENV_BAR_EXECUTION, matching.bar_execution)?;
        if let Ok(output) = env::var(ENV_OUTPUT) {
            self.output = Some(PathBuf::from(output));
        }
        Ok(())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Validated instruments, keyed by id. Duplicate ids are an error.
    pub fn build_instruments(&self) -> Result<InstrumentRegistry, ConfigError> {
        let mut registry = InstrumentRegistry::new();
        for config in &self.instruments {
            registry
                .insert(config.build()?)
                .map_err(|source| ConfigError::Instrument {
                    id: config.id.clone(),
                    source,
                })?;
        }
        Ok(registry)
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
pub fn read_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value.trim().parse::<T>().map_err(|e| ConfigError::InvalidEnv {
            key: key.to_string(),
            message: e.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
