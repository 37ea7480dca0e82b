//! Cached top-of-book state.
//!
//! The [`OrderBook`](crate::order_book::OrderBook) refreshes this snapshot
//! after every mutation so best price/size queries are O(1).

use serde::{Deserialize, Serialize};

use crate::identifiers::{Price, Quantity};

/// Best bid and ask with the aggregate size resting at each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopOfBookSnapshot {
    /// Best bid price (`None` if no bid).
    pub bid_price: Option<Price>,
    /// Total quantity at best bid (zero if no bid).
    pub bid_size: Quantity,

    /// Best ask price (`None` if no ask).
    pub ask_price: Option<Price>,
    /// Total quantity at best ask (zero if no ask).
    pub ask_size: Quantity,
}

impl TopOfBookSnapshot {
    pub fn new(
        bid_price: Option<Price>,
        bid_size: Quantity,
        ask_price: Option<Price>,
        ask_size: Quantity,
    ) -> Self {
        TopOfBookSnapshot {
            bid_price,
            bid_size,
            ask_price,
            ask_size,
        }
    }

    /// Returns `true` if there is *no* bid and *no* ask.
    pub fn is_empty(&self) -> bool {
        self.bid_price.is_none() && self.ask_price.is_none()
    }

    pub fn spread(&self) -> Option<Price> {
        match (self.bid_price, self.ask_price) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    pub fn mid(&self) -> Option<Price> {
        match (self.bid_price, self.ask_price) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Price::TWO),
            _ => None,
        }
    }
}
