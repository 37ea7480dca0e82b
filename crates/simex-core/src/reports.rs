//! Execution reports and the idempotent order ledger.
//!
//! Reports are plain snapshots built from engine state; the
//! [`OrderLedger`] rebuilds an order view from an event stream and
//! tolerates duplicated or replayed events.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{LiquiditySide, OrderStatus, PositionSide, TimeInForce};
use crate::identifiers::{
    AccountId, ClientOrderId, InstrumentId, Price, Quantity, TradeId, UnixNanos, VenueOrderId,
};
use crate::messages::{Fill, OrderEvent};
use crate::order::Order;
use crate::order_type::OrderType;
use crate::position::NetPosition;
use crate::side::Side;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub order_side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub order_status: OrderStatus,
    pub quantity: Quantity,
    pub filled_qty: Quantity,
    pub leaves_qty: Quantity,
    pub price: Option<Price>,
    pub trigger_price: Option<Price>,
    pub avg_px: Option<Price>,
    pub expire_time: Option<UnixNanos>,
    pub post_only: bool,
    pub reduce_only: bool,
    pub ts_init: UnixNanos,
    pub ts_last: UnixNanos,
}

impl OrderStatusReport {
    pub fn from_order(account_id: &AccountId, order: &Order) -> Self {
        OrderStatusReport {
            account_id: account_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            order_side: order.side,
            order_type: order.order_type(),
            time_in_force: order.time_in_force,
            order_status: order.status,
            quantity: order.quantity,
            filled_qty: order.filled_qty,
            leaves_qty: order.leaves_qty,
            price: order.price(),
            trigger_price: order.trigger_price(),
            avg_px: order.avg_px,
            expire_time: order.expire_time,
            post_only: order.post_only,
            reduce_only: order.reduce_only,
            ts_init: order.ts_init,
            ts_last: order.ts_last,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: VenueOrderId,
    pub trade_id: TradeId,
    pub order_side: Side,
    pub last_qty: Quantity,
    pub last_px: Price,
    pub liquidity_side: LiquiditySide,
    pub commission: Decimal,
    pub commission_currency: String,
    pub ts_event: UnixNanos,
}

impl FillReport {
    pub fn from_fill(account_id: &AccountId, fill: &Fill) -> Self {
        FillReport {
            account_id: account_id.clone(),
            instrument_id: fill.instrument_id.clone(),
            client_order_id: fill.client_order_id.clone(),
            venue_order_id: fill.venue_order_id.clone(),
            trade_id: fill.trade_id.clone(),
            order_side: fill.order_side,
            last_qty: fill.last_qty,
            last_px: fill.last_px,
            liquidity_side: fill.liquidity_side,
            commission: fill.commission,
            commission_currency: fill.commission_currency.clone(),
            ts_event: fill.ts_event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionStatusReport {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub position_side: PositionSide,
    pub quantity: Quantity,
    pub signed_qty: Decimal,
    pub avg_px_open: Option<Price>,
    pub realized_pnl: Decimal,
    pub ts_last: UnixNanos,
}

impl PositionStatusReport {
    pub fn from_position(
        account_id: &AccountId,
        instrument_id: &InstrumentId,
        position: &NetPosition,
        ts_last: UnixNanos,
    ) -> Self {
        PositionStatusReport {
            account_id: account_id.clone(),
            instrument_id: instrument_id.clone(),
            position_side: position.side(),
            quantity: position.quantity(),
            signed_qty: position.signed_qty,
            avg_px_open: position.avg_px_open,
            realized_pnl: position.realized_pnl,
            ts_last,
        }
    }
}

/// `true` when `ts` lies in the optional inclusive `[start, end]` window.
pub(crate) fn in_window(ts: UnixNanos, start: Option<UnixNanos>, end: Option<UnixNanos>) -> bool {
    start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e)
}

/// Order state rebuilt from execution events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub instrument_id: InstrumentId,
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub status: OrderStatus,
    pub filled_qty: Quantity,
    pub avg_px: Option<Price>,
    pub commission: Decimal,
    pub ts_last: UnixNanos,
}

/// Strategy-side view of orders, built from an event stream that may
/// contain duplicates or replays.
#[derive(Debug, Clone, Default)]
pub struct OrderLedger {
    entries: HashMap<ClientOrderId, LedgerEntry>,
    seen_trades: HashSet<TradeId>,
}

impl OrderLedger {
    pub fn new() -> Self {
        OrderLedger::default()
    }

    /// Apply one event. Returns `false` if it was a duplicate or arrived
    /// after the order was already terminal, in which case nothing changed.
    pub fn apply(&mut self, event: &OrderEvent) -> bool {
        if let OrderEvent::Filled(fill) = event {
            if !self.seen_trades.insert(fill.trade_id.clone()) {
                return false;
            }
        }

        let entry = self
            .entries
            .entry(event.client_order_id().clone())
            .or_insert_with(|| LedgerEntry {
                instrument_id: event.instrument_id().clone(),
                client_order_id: event.client_order_id().clone(),
                venue_order_id: None,
                status: OrderStatus::Initialized,
                filled_qty: Quantity::ZERO,
                avg_px: None,
                commission: Decimal::ZERO,
                ts_last: event.ts_event(),
            });

        // a fill reported after a cancel is still a real fill
        if entry.status.is_closed() && !matches!(event, OrderEvent::Filled(_)) {
            return false;
        }

        let next = match event {
            OrderEvent::Submitted(_) => {
                if entry.status != OrderStatus::Initialized {
                    return false;
                }
                OrderStatus::Submitted
            }
            OrderEvent::Accepted(e) => {
                if entry.venue_order_id.is_some() {
                    return false;
                }
                entry.venue_order_id = Some(e.venue_order_id.clone());
                OrderStatus::Accepted
            }
            OrderEvent::Rejected(_) => OrderStatus::Rejected,
            OrderEvent::Triggered(_) => {
                if entry.status == OrderStatus::Triggered {
                    return false;
                }
                OrderStatus::Triggered
            }
            OrderEvent::Updated(_) | OrderEvent::ModifyRejected(_) | OrderEvent::CancelRejected(_) => {
                entry.status
            }
            OrderEvent::Canceled(_) => OrderStatus::Canceled,
            OrderEvent::Expired(_) => OrderStatus::Expired,
            OrderEvent::Filled(fill) => {
                let prev_notional = entry.avg_px.unwrap_or_default() * entry.filled_qty;
                entry.filled_qty += fill.last_qty;
                entry.avg_px = Some((prev_notional + fill.last_px * fill.last_qty) / entry.filled_qty);
                entry.commission += fill.commission;
                if entry.status.is_closed() {
                    entry.status
                } else {
                    OrderStatus::PartiallyFilled
                }
            }
        };
        entry.status = next;
        entry.ts_last = entry.ts_last.max(event.ts_event());
        true
    }

    /// Mark an order filled once its known quantity is reached.
    pub fn mark_filled_if_complete(&mut self, id: &ClientOrderId, quantity: Quantity) {
        if let Some(entry) = self.entries.get_mut(id) {
            if entry.filled_qty >= quantity && !entry.status.is_closed() {
                entry.status = OrderStatus::Filled;
            }
        }
    }

    pub fn get(&self, id: &ClientOrderId) -> Option<&LedgerEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values().filter(|e| e.status.is_open())
    }
}
