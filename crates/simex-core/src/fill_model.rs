//! Probabilistic fill model.
//!
//! Decides the outcomes the simulator cannot observe from data alone:
//! whether a limit order resting exactly at a touched price gets filled,
//! whether a triggered stop fills at its trigger, and whether a market
//! order slips a tick on a top-of-book feed.
//!
//! All draws come from a seeded [`StdRng`], so the same seed and the same
//! inputs always give the same fills.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::FillModelError;
use crate::order_book::TouchPolicy;

pub const DEFAULT_SEED: u64 = 42;

/// Serializable settings for a [`FillModel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillModelConfig {
    pub prob_fill_on_limit: f64,
    pub prob_fill_on_stop: f64,
    pub prob_slippage: f64,
    pub seed: Option<u64>,
}

impl Default for FillModelConfig {
    fn default() -> Self {
        FillModelConfig {
            prob_fill_on_limit: 1.0,
            prob_fill_on_stop: 1.0,
            prob_slippage: 0.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FillModel {
    prob_fill_on_limit: f64,
    prob_fill_on_stop: f64,
    prob_slippage: f64,
    seed: u64,
    rng: StdRng,
}

impl FillModel {
    pub fn new(
        prob_fill_on_limit: f64,
        prob_fill_on_stop: f64,
        prob_slippage: f64,
        seed: u64,
    ) -> Result<Self, FillModelError> {
        check_probability("prob_fill_on_limit", prob_fill_on_limit)?;
        check_probability("prob_fill_on_stop", prob_fill_on_stop)?;
        check_probability("prob_slippage", prob_slippage)?;
        Ok(FillModel {
            prob_fill_on_limit,
            prob_fill_on_stop,
            prob_slippage,
            seed,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Build from config; `fallback_seed` is used when the config has none.
    pub fn from_config(config: &FillModelConfig, fallback_seed: u64) -> Result<Self, FillModelError> {
        FillModel::new(
            config.prob_fill_on_limit,
            config.prob_fill_on_stop,
            config.prob_slippage,
            config.seed.unwrap_or(fallback_seed),
        )
    }

    /// Same probabilities, new seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Rewind the random stream to its seed.
    pub fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    pub fn is_limit_filled(&mut self) -> bool {
        let p = self.prob_fill_on_limit;
        self.event_success(p)
    }

    pub fn is_stop_filled(&mut self) -> bool {
        let p = self.prob_fill_on_stop;
        self.event_success(p)
    }

    pub fn is_slipped(&mut self) -> bool {
        let p = self.prob_slippage;
        self.event_success(p)
    }

    // ----- Internal helpers -----

    /// Certain outcomes do not consume a draw, so a model with all
    /// probabilities at 0 or 1 never touches the RNG.
    fn event_success(&mut self, probability: f64) -> bool {
        if probability <= 0.0 {
            false
        } else if probability >= 1.0 {
            true
        } else {
            self.rng.gen::<f64>() < probability
        }
    }
}

impl Default for FillModel {
    fn default() -> Self {
        FillModel {
            prob_fill_on_limit: 1.0,
            prob_fill_on_stop: 1.0,
            prob_slippage: 0.0,
            seed: DEFAULT_SEED,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
        }
    }
}

impl TouchPolicy for FillModel {
    fn fills_at_touch(&mut self) -> bool {
        self.is_limit_filled()
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), FillModelError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(FillModelError::ProbabilityOutOfRange { name, value })
    }
}
