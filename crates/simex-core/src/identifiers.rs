//! Identifier newtypes and the numeric aliases shared by every module.
//!
//! Prices and sizes are exact decimals so tick arithmetic never drifts;
//! timestamps are plain nanoseconds since the Unix epoch.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Price in quote currency units.
pub type Price = Decimal;

/// Order or book size in base units.
pub type Quantity = Decimal;

/// Nanoseconds since the Unix epoch.
pub type UnixNanos = u64;

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Nanoseconds in one UTC day.
pub const NANOS_PER_DAY: u64 = 86_400 * NANOS_PER_SEC;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }
    };
}

string_id!(
    /// Instrument symbol including venue, e.g. `"BTCUSDT.SIM"`.
    InstrumentId
);
string_id!(
    /// Order identifier assigned by the strategy; unique per trader.
    ClientOrderId
);
string_id!(
    /// Order identifier assigned by the simulated venue on acceptance.
    VenueOrderId
);
string_id!(
    /// Identifier of a single execution.
    TradeId
);
string_id!(StrategyId);
string_id!(AccountId);
