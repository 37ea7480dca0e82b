//! Commands consumed and events produced by the simulated venue.
//!
//! These are **transport-agnostic** logical messages:
//! - [`TradingCommand`]: what strategies send to the venue.
//! - [`OrderEvent`]: what the venue emits back, in causal order.
//!
//! Every event carries the instrument and client order id so consumers
//! can route without extra context. The CSV encoding lives in the
//! `simex-protocol` crate; this module is purely logical.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::LiquiditySide;
use crate::identifiers::{
    ClientOrderId, InstrumentId, Price, Quantity, StrategyId, TradeId, UnixNanos, VenueOrderId,
};
use crate::order::Order;
use crate::order_type::OrderType;
use crate::side::Side;

/// Parameters for the time-weighted execution algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapParams {
    pub horizon_secs: u64,
    pub interval_secs: u64,
}

/// A request into the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingCommand {
    Submit(SubmitOrder),
    Modify(ModifyOrder),
    Cancel(CancelOrder),
    CancelAll(CancelAllOrders),
    BatchCancel(BatchCancelOrders),
}

impl TradingCommand {
    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            TradingCommand::Submit(c) => &c.order.instrument_id,
            TradingCommand::Modify(c) => &c.instrument_id,
            TradingCommand::Cancel(c) => &c.instrument_id,
            TradingCommand::CancelAll(c) => &c.instrument_id,
            TradingCommand::BatchCancel(c) => &c.instrument_id,
        }
    }

    pub fn ts_init(&self) -> UnixNanos {
        match self {
            TradingCommand::Submit(c) => c.ts_init,
            TradingCommand::Modify(c) => c.ts_init,
            TradingCommand::Cancel(c) => c.ts_init,
            TradingCommand::CancelAll(c) => c.ts_init,
            TradingCommand::BatchCancel(c) => c.ts_init,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub order: Order,
    /// Route through the TWAP algorithm instead of straight to the venue.
    pub exec_algorithm: Option<TwapParams>,
    pub ts_init: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyOrder {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub quantity: Option<Quantity>,
    pub price: Option<Price>,
    pub trigger_price: Option<Price>,
    pub ts_init: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub ts_init: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAllOrders {
    pub instrument_id: InstrumentId,
    /// Only cancel orders on this side when set.
    pub order_side: Option<Side>,
    pub ts_init: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCancelOrders {
    pub instrument_id: InstrumentId,
    pub cancels: Vec<CancelOrder>,
    pub ts_init: UnixNanos,
}

impl TradingCommand {
    pub fn submit(order: Order, ts_init: UnixNanos) -> Self {
        TradingCommand::Submit(SubmitOrder {
            order,
            exec_algorithm: None,
            ts_init,
        })
    }

    pub fn cancel(
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        ts_init: UnixNanos,
    ) -> Self {
        TradingCommand::Cancel(CancelOrder {
            instrument_id,
            client_order_id,
            ts_init,
        })
    }
}

// -----------------------------------------------------------------------------
// Events
// -----------------------------------------------------------------------------

/// An execution event emitted by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Submitted(OrderSubmitted),
    Accepted(OrderAccepted),
    Rejected(OrderRejected),
    Triggered(OrderTriggered),
    Updated(OrderUpdated),
    ModifyRejected(OrderModifyRejected),
    CancelRejected(OrderCancelRejected),
    Canceled(OrderCanceled),
    Expired(OrderExpired),
    Filled(Fill),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmitted {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: VenueOrderId,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub reason: String,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTriggered {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdated {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub trigger_price: Option<Price>,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderModifyRejected {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub reason: String,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelRejected {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub reason: String,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpired {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub ts_event: UnixNanos,
}

/// One matched quantity at one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: VenueOrderId,
    pub strategy_id: StrategyId,
    pub trade_id: TradeId,
    pub order_side: Side,
    pub order_type: OrderType,
    pub last_qty: Quantity,
    pub last_px: Price,
    pub liquidity_side: LiquiditySide,
    pub commission: Decimal,
    pub commission_currency: String,
    pub ts_event: UnixNanos,
}

// -----------------------------------------------------------------------------
// Convenience constructors
// -----------------------------------------------------------------------------

impl OrderEvent {
    pub fn submitted(order: &Order, ts_event: UnixNanos) -> Self {
        OrderEvent::Submitted(OrderSubmitted {
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            ts_event,
        })
    }

    pub fn accepted(order: &Order, venue_order_id: VenueOrderId, ts_event: UnixNanos) -> Self {
        OrderEvent::Accepted(OrderAccepted {
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id,
            ts_event,
        })
    }

    pub fn rejected(
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        reason: impl Into<String>,
        ts_event: UnixNanos,
    ) -> Self {
        OrderEvent::Rejected(OrderRejected {
            instrument_id,
            client_order_id,
            reason: reason.into(),
            ts_event,
        })
    }

    pub fn triggered(order: &Order, ts_event: UnixNanos) -> Self {
        OrderEvent::Triggered(OrderTriggered {
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            ts_event,
        })
    }

    pub fn updated(order: &Order, ts_event: UnixNanos) -> Self {
        OrderEvent::Updated(OrderUpdated {
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            quantity: order.quantity,
            price: order.price(),
            trigger_price: order.trigger_price(),
            ts_event,
        })
    }

    pub fn modify_rejected(
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        venue_order_id: Option<VenueOrderId>,
        reason: impl Into<String>,
        ts_event: UnixNanos,
    ) -> Self {
        OrderEvent::ModifyRejected(OrderModifyRejected {
            instrument_id,
            client_order_id,
            venue_order_id,
            reason: reason.into(),
            ts_event,
        })
    }

    pub fn cancel_rejected(
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        venue_order_id: Option<VenueOrderId>,
        reason: impl Into<String>,
        ts_event: UnixNanos,
    ) -> Self {
        OrderEvent::CancelRejected(OrderCancelRejected {
            instrument_id,
            client_order_id,
            venue_order_id,
            reason: reason.into(),
            ts_event,
        })
    }

    pub fn canceled(order: &Order, ts_event: UnixNanos) -> Self {
        OrderEvent::Canceled(OrderCanceled {
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            ts_event,
        })
    }

    pub fn expired(order: &Order, ts_event: UnixNanos) -> Self {
        OrderEvent::Expired(OrderExpired {
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            ts_event,
        })
    }

    pub fn client_order_id(&self) -> &ClientOrderId {
        match self {
            OrderEvent::Submitted(e) => &e.client_order_id,
            OrderEvent::Accepted(e) => &e.client_order_id,
            OrderEvent::Rejected(e) => &e.client_order_id,
            OrderEvent::Triggered(e) => &e.client_order_id,
            OrderEvent::Updated(e) => &e.client_order_id,
            OrderEvent::ModifyRejected(e) => &e.client_order_id,
            OrderEvent::CancelRejected(e) => &e.client_order_id,
            OrderEvent::Canceled(e) => &e.client_order_id,
            OrderEvent::Expired(e) => &e.client_order_id,
            OrderEvent::Filled(e) => &e.client_order_id,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            OrderEvent::Submitted(e) => &e.instrument_id,
            OrderEvent::Accepted(e) => &e.instrument_id,
            OrderEvent::Rejected(e) => &e.instrument_id,
            OrderEvent::Triggered(e) => &e.instrument_id,
            OrderEvent::Updated(e) => &e.instrument_id,
            OrderEvent::ModifyRejected(e) => &e.instrument_id,
            OrderEvent::CancelRejected(e) => &e.instrument_id,
            OrderEvent::Canceled(e) => &e.instrument_id,
            OrderEvent::Expired(e) => &e.instrument_id,
            OrderEvent::Filled(e) => &e.instrument_id,
        }
    }

    pub fn ts_event(&self) -> UnixNanos {
        match self {
            OrderEvent::Submitted(e) => e.ts_event,
            OrderEvent::Accepted(e) => e.ts_event,
            OrderEvent::Rejected(e) => e.ts_event,
            OrderEvent::Triggered(e) => e.ts_event,
            OrderEvent::Updated(e) => e.ts_event,
            OrderEvent::ModifyRejected(e) => e.ts_event,
            OrderEvent::CancelRejected(e) => e.ts_event,
            OrderEvent::Canceled(e) => e.ts_event,
            OrderEvent::Expired(e) => e.ts_event,
            OrderEvent::Filled(e) => e.ts_event,
        }
    }

    /// Short upper-case name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::Submitted(_) => "SUBMITTED",
            OrderEvent::Accepted(_) => "ACCEPTED",
            OrderEvent::Rejected(_) => "REJECTED",
            OrderEvent::Triggered(_) => "TRIGGERED",
            OrderEvent::Updated(_) => "UPDATED",
            OrderEvent::ModifyRejected(_) => "MODIFY_REJECTED",
            OrderEvent::CancelRejected(_) => "CANCEL_REJECTED",
            OrderEvent::Canceled(_) => "CANCELED",
            OrderEvent::Expired(_) => "EXPIRED",
            OrderEvent::Filled(_) => "FILLED",
        }
    }

    pub fn as_fill(&self) -> Option<&Fill> {
        match self {
            OrderEvent::Filled(fill) => Some(fill),
            _ => None,
        }
    }
}
