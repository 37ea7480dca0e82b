//! Order types.
//!
//! [`OrderKind`] is the closed set of order shapes the engine can work,
//! carrying the fields each shape needs. [`OrderType`] is the fieldless
//! tag used in reports and on the wire.

use serde::{Deserialize, Serialize};

use crate::enums::{TrailingOffsetType, TriggerType};
use crate::identifiers::Price;
use rust_decimal::Decimal;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    MarketIfTouched,
    LimitIfTouched,
    TrailingStopMarket,
    TrailingStopLimit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::StopLimit => "STOP_LIMIT",
            OrderType::MarketIfTouched => "MARKET_IF_TOUCHED",
            OrderType::LimitIfTouched => "LIMIT_IF_TOUCHED",
            OrderType::TrailingStopMarket => "TRAILING_STOP_MARKET",
            OrderType::TrailingStopLimit => "TRAILING_STOP_LIMIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MARKET" => Some(OrderType::Market),
            "LIMIT" => Some(OrderType::Limit),
            "STOP_MARKET" => Some(OrderType::StopMarket),
            "STOP_LIMIT" => Some(OrderType::StopLimit),
            "MARKET_IF_TOUCHED" | "MIT" => Some(OrderType::MarketIfTouched),
            "LIMIT_IF_TOUCHED" | "LIT" => Some(OrderType::LimitIfTouched),
            "TRAILING_STOP_MARKET" | "TSM" => Some(OrderType::TrailingStopMarket),
            "TRAILING_STOP_LIMIT" | "TSL" => Some(OrderType::TrailingStopLimit),
            _ => None,
        }
    }
}

/// Trailing parameters shared by both trailing stop kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailing {
    /// Distance of the trigger from the market, in `offset_type` units.
    pub trailing_offset: Decimal,
    pub offset_type: TrailingOffsetType,
    /// Market level that must be reached before the stop starts trailing.
    pub activation_price: Option<Price>,
    pub activated: bool,
}

impl Trailing {
    pub fn new(trailing_offset: Decimal, offset_type: TrailingOffsetType) -> Self {
        Trailing {
            trailing_offset,
            offset_type,
            activation_price: None,
            activated: false,
        }
    }

    pub fn with_activation_price(mut self, price: Price) -> Self {
        self.activation_price = Some(price);
        self
    }
}

/// The shape of an order and its type-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit {
        price: Price,
    },
    StopMarket {
        trigger_price: Price,
        trigger_type: TriggerType,
    },
    StopLimit {
        price: Price,
        trigger_price: Price,
        trigger_type: TriggerType,
        triggered: bool,
    },
    MarketIfTouched {
        trigger_price: Price,
        trigger_type: TriggerType,
    },
    LimitIfTouched {
        price: Price,
        trigger_price: Price,
        trigger_type: TriggerType,
        triggered: bool,
    },
    TrailingStopMarket {
        /// Computed from the market once activated when not given.
        trigger_price: Option<Price>,
        trigger_type: TriggerType,
        trailing: Trailing,
    },
    TrailingStopLimit {
        price: Option<Price>,
        trigger_price: Option<Price>,
        trigger_type: TriggerType,
        /// Distance of the limit price from the market, in the trailing offset units.
        limit_offset: Decimal,
        trailing: Trailing,
        triggered: bool,
    },
}

impl OrderKind {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::Market => OrderType::Market,
            OrderKind::Limit { .. } => OrderType::Limit,
            OrderKind::StopMarket { .. } => OrderType::StopMarket,
            OrderKind::StopLimit { .. } => OrderType::StopLimit,
            OrderKind::MarketIfTouched { .. } => OrderType::MarketIfTouched,
            OrderKind::LimitIfTouched { .. } => OrderType::LimitIfTouched,
            OrderKind::TrailingStopMarket { .. } => OrderType::TrailingStopMarket,
            OrderKind::TrailingStopLimit { .. } => OrderType::TrailingStopLimit,
        }
    }

    /// Limit price, if the kind has one (and it is known yet).
    pub fn price(&self) -> Option<Price> {
        match self {
            OrderKind::Limit { price }
            | OrderKind::StopLimit { price, .. }
            | OrderKind::LimitIfTouched { price, .. } => Some(*price),
            OrderKind::TrailingStopLimit { price, .. } => *price,
            OrderKind::Market
            | OrderKind::StopMarket { .. }
            | OrderKind::MarketIfTouched { .. }
            | OrderKind::TrailingStopMarket { .. } => None,
        }
    }

    pub fn trigger_price(&self) -> Option<Price> {
        match self {
            OrderKind::StopMarket { trigger_price, .. }
            | OrderKind::StopLimit { trigger_price, .. }
            | OrderKind::MarketIfTouched { trigger_price, .. }
            | OrderKind::LimitIfTouched { trigger_price, .. } => Some(*trigger_price),
            OrderKind::TrailingStopMarket { trigger_price, .. }
            | OrderKind::TrailingStopLimit { trigger_price, .. } => *trigger_price,
            OrderKind::Market | OrderKind::Limit { .. } => None,
        }
    }

    pub fn trigger_type(&self) -> Option<TriggerType> {
        match self {
            OrderKind::StopMarket { trigger_type, .. }
            | OrderKind::StopLimit { trigger_type, .. }
            | OrderKind::MarketIfTouched { trigger_type, .. }
            | OrderKind::LimitIfTouched { trigger_type, .. }
            | OrderKind::TrailingStopMarket { trigger_type, .. }
            | OrderKind::TrailingStopLimit { trigger_type, .. } => Some(*trigger_type),
            OrderKind::Market | OrderKind::Limit { .. } => None,
        }
    }

    pub fn trailing(&self) -> Option<&Trailing> {
        match self {
            OrderKind::TrailingStopMarket { trailing, .. }
            | OrderKind::TrailingStopLimit { trailing, .. } => Some(trailing),
            _ => None,
        }
    }

    /// Limit-style kinds that have been triggered and now work as plain limits.
    pub fn is_triggered(&self) -> bool {
        match self {
            OrderKind::StopLimit { triggered, .. }
            | OrderKind::LimitIfTouched { triggered, .. }
            | OrderKind::TrailingStopLimit { triggered, .. } => *triggered,
            _ => false,
        }
    }

    /// Kinds that wait for a trigger condition before they can trade.
    pub fn is_pending_trigger(&self) -> bool {
        match self {
            OrderKind::Market | OrderKind::Limit { .. } => false,
            OrderKind::StopMarket { .. }
            | OrderKind::MarketIfTouched { .. }
            | OrderKind::TrailingStopMarket { .. } => true,
            OrderKind::StopLimit { triggered, .. }
            | OrderKind::LimitIfTouched { triggered, .. }
            | OrderKind::TrailingStopLimit { triggered, .. } => !triggered,
        }
    }

    /// Kinds that turn into a market order when triggered.
    pub fn is_market_on_trigger(&self) -> bool {
        matches!(
            self,
            OrderKind::StopMarket { .. }
                | OrderKind::MarketIfTouched { .. }
                | OrderKind::TrailingStopMarket { .. }
        )
    }

    /// Kinds that can rest in the book as a limit (post-only is only valid for these).
    pub fn has_limit(&self) -> bool {
        matches!(
            self,
            OrderKind::Limit { .. }
                | OrderKind::StopLimit { .. }
                | OrderKind::LimitIfTouched { .. }
                | OrderKind::TrailingStopLimit { .. }
        )
    }

    /// Touch-triggered kinds fire when the market comes *to* the trigger
    /// (buy below, sell above); stops fire when it moves *through* it.
    pub fn is_touch_triggered(&self) -> bool {
        matches!(
            self,
            OrderKind::MarketIfTouched { .. } | OrderKind::LimitIfTouched { .. }
        )
    }

    pub(crate) fn set_price(&mut self, new_price: Price) {
        match self {
            OrderKind::Limit { price }
            | OrderKind::StopLimit { price, .. }
            | OrderKind::LimitIfTouched { price, .. } => *price = new_price,
            OrderKind::TrailingStopLimit { price, .. } => *price = Some(new_price),
            _ => {}
        }
    }

    pub(crate) fn set_trigger_price(&mut self, new_trigger: Price) {
        match self {
            OrderKind::StopMarket { trigger_price, .. }
            | OrderKind::StopLimit { trigger_price, .. }
            | OrderKind::MarketIfTouched { trigger_price, .. }
            | OrderKind::LimitIfTouched { trigger_price, .. } => *trigger_price = new_trigger,
            OrderKind::TrailingStopMarket { trigger_price, .. }
            | OrderKind::TrailingStopLimit { trigger_price, .. } => {
                *trigger_price = Some(new_trigger)
            }
            _ => {}
        }
    }

    pub(crate) fn set_triggered(&mut self) {
        match self {
            OrderKind::StopLimit { triggered, .. }
            | OrderKind::LimitIfTouched { triggered, .. }
            | OrderKind::TrailingStopLimit { triggered, .. } => *triggered = true,
            _ => {}
        }
    }

    pub(crate) fn set_activated(&mut self) {
        match self {
            OrderKind::TrailingStopMarket { trailing, .. }
            | OrderKind::TrailingStopLimit { trailing, .. } => trailing.activated = true,
            _ => {}
        }
    }
}
