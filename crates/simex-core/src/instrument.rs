//! Static instrument definitions and the read-only registry.
//!
//! Instruments are loaded once and handed to engines as `Arc<Instrument>`;
//! nothing mutates them during a simulation.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::InstrumentError;
use crate::identifiers::{InstrumentId, Price, Quantity};

/// A tradable instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub price_precision: u32,
    pub size_precision: u32,
    pub price_increment: Price,
    pub size_increment: Quantity,
    #[serde(default)]
    pub min_quantity: Option<Quantity>,
    #[serde(default)]
    pub max_quantity: Option<Quantity>,
    #[serde(default)]
    pub min_price: Option<Price>,
    #[serde(default)]
    pub max_price: Option<Price>,
    #[serde(default = "default_multiplier")]
    pub multiplier: Decimal,
    #[serde(default)]
    pub maker_fee: Decimal,
    #[serde(default)]
    pub taker_fee: Decimal,
    #[serde(default)]
    pub margin_init: Decimal,
    #[serde(default = "default_currency")]
    pub quote_currency: String,
}

fn default_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Instrument {
    /// Instrument whose increments are one unit of the given precisions
    /// (e.g. precision 2 => increment 0.01).
    pub fn new(
        id: impl Into<InstrumentId>,
        price_precision: u32,
        size_precision: u32,
    ) -> Result<Self, InstrumentError> {
        let instrument = Instrument {
            id: id.into(),
            price_precision,
            size_precision,
            price_increment: Decimal::new(1, price_precision),
            size_increment: Decimal::new(1, size_precision),
            min_quantity: None,
            max_quantity: None,
            min_price: None,
            max_price: None,
            multiplier: Decimal::ONE,
            maker_fee: Decimal::ZERO,
            taker_fee: Decimal::ZERO,
            margin_init: Decimal::ZERO,
            quote_currency: default_currency(),
        };
        instrument.validate()?;
        Ok(instrument)
    }

    pub fn with_price_increment(mut self, increment: Price) -> Self {
        self.price_increment = increment;
        self
    }

    pub fn with_size_increment(mut self, increment: Quantity) -> Self {
        self.size_increment = increment;
        self
    }

    pub fn with_quantity_limits(mut self, min: Option<Quantity>, max: Option<Quantity>) -> Self {
        self.min_quantity = min;
        self.max_quantity = max;
        self
    }

    pub fn with_fees(mut self, maker_fee: Decimal, taker_fee: Decimal) -> Self {
        self.maker_fee = maker_fee;
        self.taker_fee = taker_fee;
        self
    }

    pub fn with_quote_currency(mut self, currency: impl Into<String>) -> Self {
        self.quote_currency = currency.into();
        self
    }

    /// Check the definition is internally consistent.
    pub fn validate(&self) -> Result<(), InstrumentError> {
        if self.price_increment <= Decimal::ZERO {
            return Err(InstrumentError::NonPositiveIncrement {
                instrument_id: self.id.clone(),
                field: "price_increment",
            });
        }
        if self.size_increment <= Decimal::ZERO {
            return Err(InstrumentError::NonPositiveIncrement {
                instrument_id: self.id.clone(),
                field: "size_increment",
            });
        }
        if self.price_increment.normalize().scale() > self.price_precision {
            return Err(InstrumentError::PrecisionMismatch {
                instrument_id: self.id.clone(),
                field: "price_increment",
                precision: self.price_precision,
            });
        }
        if self.size_increment.normalize().scale() > self.size_precision {
            return Err(InstrumentError::PrecisionMismatch {
                instrument_id: self.id.clone(),
                field: "size_increment",
                precision: self.size_precision,
            });
        }
        if let (Some(min), Some(max)) = (self.min_quantity, self.max_quantity) {
            if min > max {
                return Err(InstrumentError::InvalidQuantityLimits {
                    instrument_id: self.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// `true` if `price` respects the price precision and lies on the tick grid.
    pub fn is_valid_price(&self, price: Price) -> bool {
        price.normalize().scale() <= self.price_precision
            && (price % self.price_increment).is_zero()
    }

    /// `true` if `quantity` respects the size precision and lies on the size grid.
    pub fn is_valid_quantity(&self, quantity: Quantity) -> bool {
        quantity.normalize().scale() <= self.size_precision
            && (quantity % self.size_increment).is_zero()
    }

    /// Round a raw value to the nearest tick.
    pub fn round_price(&self, value: Decimal) -> Price {
        ((value / self.price_increment).round() * self.price_increment).round_dp(self.price_precision)
    }

    /// Round a raw size down to the size grid.
    pub fn floor_quantity(&self, value: Decimal) -> Quantity {
        ((value / self.size_increment).floor() * self.size_increment).round_dp(self.size_precision)
    }

    pub fn next_price_up(&self, price: Price) -> Price {
        price + self.price_increment
    }

    pub fn next_price_down(&self, price: Price) -> Price {
        price - self.price_increment
    }

    /// Notional value of `quantity` at `price` in quote currency.
    pub fn notional(&self, quantity: Quantity, price: Price) -> Decimal {
        quantity * price * self.multiplier
    }
}

/// Registry of instrument definitions, keyed by id.
///
/// Built once before a run; engines only ever receive cloned `Arc`s.
#[derive(Debug, Default, Clone)]
pub struct InstrumentRegistry {
    instruments: BTreeMap<InstrumentId, Arc<Instrument>>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        InstrumentRegistry::default()
    }

    /// Validate and add an instrument. Fails on a duplicate id.
    pub fn insert(&mut self, instrument: Instrument) -> Result<Arc<Instrument>, InstrumentError> {
        instrument.validate()?;
        if self.instruments.contains_key(&instrument.id) {
            return Err(InstrumentError::Duplicate(instrument.id));
        }
        let shared = Arc::new(instrument);
        self.instruments.insert(shared.id.clone(), Arc::clone(&shared));
        Ok(shared)
    }

    pub fn get(&self, id: &InstrumentId) -> Option<Arc<Instrument>> {
        self.instruments.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &InstrumentId> {
        self.instruments.keys()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
