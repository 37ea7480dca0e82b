//! Trailing stop price calculation.
//!
//! A trailing stop keeps its trigger a fixed distance behind the market:
//! a sell stop sits below the basis and only ever moves up, a buy stop
//! sits above it and only ever moves down. Trailing stop limits trail
//! their limit price the same way, by `limit_offset`.

use rust_decimal::Decimal;

use crate::enums::{TrailingOffsetType, TriggerType};
use crate::identifiers::Price;
use crate::instrument::Instrument;
use crate::order_type::{OrderKind, Trailing};
use crate::side::Side;

const BASIS_POINTS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Market prices a trailing or trigger calculation can look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub bid: Option<Price>,
    pub ask: Option<Price>,
    pub last: Option<Price>,
    pub mark: Option<Price>,
}

impl MarketSnapshot {
    /// Price a condition of `trigger_type` on `side` is evaluated against.
    pub fn basis(&self, trigger_type: TriggerType, side: Side) -> Option<Price> {
        match trigger_type {
            TriggerType::BidAsk => match side {
                Side::Buy => self.ask,
                Side::Sell => self.bid,
            },
            TriggerType::LastPrice => self.last,
            TriggerType::MarkPrice => self.mark,
        }
    }
}

/// New prices for a trailing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingUpdate {
    /// Set when the order just activated on this calculation.
    pub activated: bool,
    pub trigger_price: Option<Price>,
    pub price: Option<Price>,
}

/// Recompute a trailing order's prices.
///
/// Returns `None` for non-trailing kinds, triggered trailing limits,
/// orders still waiting for their activation price, when the basis is
/// unknown, or when nothing moved.
pub fn calculate(
    instrument: &Instrument,
    side: Side,
    kind: &OrderKind,
    market: &MarketSnapshot,
) -> Option<TrailingUpdate> {
    let (trigger_type, trailing, current_trigger, limit) = match kind {
        OrderKind::TrailingStopMarket {
            trigger_price,
            trigger_type,
            trailing,
        } => (*trigger_type, trailing, *trigger_price, None),
        OrderKind::TrailingStopLimit {
            price,
            trigger_price,
            trigger_type,
            limit_offset,
            trailing,
            triggered: false,
        } => (*trigger_type, trailing, *trigger_price, Some((*price, *limit_offset))),
        _ => return None,
    };

    let basis = market.basis(trigger_type, side)?;
    let activated = if trailing.activated {
        false
    } else if reached_activation(trailing, side, basis) {
        true
    } else {
        return None;
    };

    let offset = offset_amount(instrument, trailing.offset_type, trailing.trailing_offset, basis);
    let trigger = trail(instrument, side, basis, offset, current_trigger);

    let price = limit.and_then(|(current_price, limit_offset)| {
        let limit_amount = offset_amount(instrument, trailing.offset_type, limit_offset, basis);
        trail(instrument, side, basis, limit_amount, current_price)
    });

    if !activated && trigger.is_none() && price.is_none() {
        return None;
    }
    Some(TrailingUpdate {
        activated,
        trigger_price: trigger,
        price,
    })
}

// ----- Internal helpers -----

fn reached_activation(trailing: &Trailing, side: Side, basis: Price) -> bool {
    match trailing.activation_price {
        None => true,
        Some(activation) => match side {
            Side::Buy => basis <= activation,
            Side::Sell => basis >= activation,
        },
    }
}

fn offset_amount(
    instrument: &Instrument,
    offset_type: TrailingOffsetType,
    offset: Decimal,
    basis: Price,
) -> Decimal {
    match offset_type {
        TrailingOffsetType::Price => offset,
        TrailingOffsetType::BasisPoints => basis * offset / BASIS_POINTS,
        TrailingOffsetType::Ticks => offset * instrument.price_increment,
    }
}

/// Candidate price `offset` away from `basis`, returned only when it
/// improves on `current` in the trailing direction.
fn trail(
    instrument: &Instrument,
    side: Side,
    basis: Price,
    offset: Decimal,
    current: Option<Price>,
) -> Option<Price> {
    let candidate = match side {
        Side::Buy => instrument.round_price(basis + offset),
        Side::Sell => instrument.round_price(basis - offset),
    };
    match current {
        None => Some(candidate),
        Some(current) => {
            let improves = match side {
                Side::Buy => candidate < current,
                Side::Sell => candidate > current,
            };
            improves.then_some(candidate)
        }
    }
}
