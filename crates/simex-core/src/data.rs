//! Market data records consumed by the matching engine.
//!
//! Every record carries the instrument it belongs to plus two timestamps:
//! `ts_event` (when it happened at the source) and `ts_init` (when the
//! system created it). Streams are merged on `ts_init`.

use serde::{Deserialize, Serialize};

use crate::enums::BookAction;
use crate::identifiers::{InstrumentId, Price, Quantity, TradeId, UnixNanos};
use crate::side::Side;

/// One order (L3) or price level (L1/L2) as carried by a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookOrder {
    pub side: Side,
    pub price: Price,
    pub size: Quantity,
    /// Feed order id; ignored by aggregated (L1/L2) books.
    pub order_id: u64,
}

impl BookOrder {
    pub fn new(side: Side, price: Price, size: Quantity, order_id: u64) -> Self {
        BookOrder {
            side,
            price,
            size,
            order_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookDelta {
    pub instrument_id: InstrumentId,
    pub action: BookAction,
    pub order: BookOrder,
    pub sequence: u64,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

impl OrderBookDelta {
    pub fn new(
        instrument_id: InstrumentId,
        action: BookAction,
        order: BookOrder,
        sequence: u64,
        ts_event: UnixNanos,
    ) -> Self {
        OrderBookDelta {
            instrument_id,
            action,
            order,
            sequence,
            ts_event,
            ts_init: ts_event,
        }
    }

    /// A CLEAR delta; side and price of the carried order are ignored.
    pub fn clear(instrument_id: InstrumentId, sequence: u64, ts_event: UnixNanos) -> Self {
        OrderBookDelta::new(
            instrument_id,
            BookAction::Clear,
            BookOrder::new(Side::Buy, Price::ZERO, Quantity::ZERO, 0),
            sequence,
            ts_event,
        )
    }
}

/// A batch of deltas for one instrument, applied in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookDeltas {
    pub instrument_id: InstrumentId,
    pub deltas: Vec<OrderBookDelta>,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

/// Full replacement of one side's levels (depth-at-interval feeds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub instrument_id: InstrumentId,
    pub side: Side,
    /// `(price, size)` levels in any order.
    pub levels: Vec<(Price, Quantity)>,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub instrument_id: InstrumentId,
    pub bid_price: Price,
    pub ask_price: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

impl QuoteTick {
    pub fn new(
        instrument_id: InstrumentId,
        bid_price: Price,
        ask_price: Price,
        bid_size: Quantity,
        ask_size: Quantity,
        ts_event: UnixNanos,
    ) -> Self {
        QuoteTick {
            instrument_id,
            bid_price,
            ask_price,
            bid_size,
            ask_size,
            ts_event,
            ts_init: ts_event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub size: Quantity,
    /// Side of the aggressor; `None` when the feed does not say.
    pub aggressor_side: Option<Side>,
    pub trade_id: TradeId,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

impl TradeTick {
    pub fn new(
        instrument_id: InstrumentId,
        price: Price,
        size: Quantity,
        aggressor_side: Option<Side>,
        trade_id: TradeId,
        ts_event: UnixNanos,
    ) -> Self {
        TradeTick {
            instrument_id,
            price,
            size,
            aggressor_side,
            trade_id,
            ts_event,
            ts_init: ts_event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument_id: InstrumentId,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPriceUpdate {
    pub instrument_id: InstrumentId,
    pub value: Price,
    pub ts_event: UnixNanos,
    pub ts_init: UnixNanos,
}

/// Any market data record the engine understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Data {
    Delta(OrderBookDelta),
    Deltas(OrderBookDeltas),
    Depth(DepthSnapshot),
    Quote(QuoteTick),
    Trade(TradeTick),
    Bar(Bar),
    MarkPrice(MarkPriceUpdate),
}

impl Data {
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            Data::Delta(d) => &d.instrument_id,
            Data::Deltas(d) => &d.instrument_id,
            Data::Depth(d) => &d.instrument_id,
            Data::Quote(q) => &q.instrument_id,
            Data::Trade(t) => &t.instrument_id,
            Data::Bar(b) => &b.instrument_id,
            Data::MarkPrice(m) => &m.instrument_id,
        }
    }

    pub fn ts_event(&self) -> UnixNanos {
        match self {
            Data::Delta(d) => d.ts_event,
            Data::Deltas(d) => d.ts_event,
            Data::Depth(d) => d.ts_event,
            Data::Quote(q) => q.ts_event,
            Data::Trade(t) => t.ts_event,
            Data::Bar(b) => b.ts_event,
            Data::MarkPrice(m) => m.ts_event,
        }
    }

    pub fn ts_init(&self) -> UnixNanos {
        match self {
            Data::Delta(d) => d.ts_init,
            Data::Deltas(d) => d.ts_init,
            Data::Depth(d) => d.ts_init,
            Data::Quote(q) => q.ts_init,
            Data::Trade(t) => t.ts_init,
            Data::Bar(b) => b.ts_init,
            Data::MarkPrice(m) => m.ts_init,
        }
    }

    /// Short name of the record kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Data::Delta(_) => "delta",
            Data::Deltas(_) => "deltas",
            Data::Depth(_) => "depth",
            Data::Quote(_) => "quote",
            Data::Trade(_) => "trade",
            Data::Bar(_) => "bar",
            Data::MarkPrice(_) => "mark",
        }
    }
}
