//! Strategy order as tracked by the matching engine.
//!
//! Lifecycle:
//! `INITIALIZED -> SUBMITTED -> {ACCEPTED | REJECTED}`, then
//! `ACCEPTED [-> TRIGGERED] [-> PARTIALLY_FILLED] -> {FILLED | CANCELED | EXPIRED}`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{LiquiditySide, OrderStatus, TimeInForce};
use crate::identifiers::{
    ClientOrderId, InstrumentId, Price, Quantity, StrategyId, UnixNanos, VenueOrderId,
};
use crate::order_type::{OrderKind, OrderType};
use crate::side::Side;

/// A single order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    // Identification
    pub client_order_id: ClientOrderId,
    pub venue_order_id: Option<VenueOrderId>,
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,

    // Order details
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Quantity,  // original quantity (updated by modify)
    pub filled_qty: Quantity,
    pub leaves_qty: Quantity, // remaining unfilled quantity
    pub avg_px: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub expire_time: Option<UnixNanos>,
    pub post_only: bool,
    pub reduce_only: bool,

    /// Primary order this one was spawned from by an execution algorithm.
    pub exec_spawn_id: Option<ClientOrderId>,

    pub status: OrderStatus,
    pub liquidity_side: Option<LiquiditySide>,
    pub ts_init: UnixNanos,
    pub ts_last: UnixNanos,
}

impl Order {
    pub fn new(
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        side: Side,
        kind: OrderKind,
        quantity: Quantity,
        ts_init: UnixNanos,
    ) -> Self {
        Order {
            client_order_id,
            venue_order_id: None,
            strategy_id,
            instrument_id,
            side,
            kind,
            quantity,
            filled_qty: Quantity::ZERO,
            leaves_qty: quantity,
            avg_px: None,
            time_in_force: TimeInForce::Gtc,
            expire_time: None,
            post_only: false,
            reduce_only: false,
            exec_spawn_id: None,
            status: OrderStatus::Initialized,
            liquidity_side: None,
            ts_init,
            ts_last: ts_init,
        }
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Make this a GTD order expiring at `expire_time`.
    pub fn with_expire_time(mut self, expire_time: UnixNanos) -> Self {
        self.time_in_force = TimeInForce::Gtd;
        self.expire_time = Some(expire_time);
        self
    }

    pub fn with_post_only(mut self, post_only: bool) -> Self {
        self.post_only = post_only;
        self
    }

    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn with_exec_spawn_id(mut self, primary: ClientOrderId) -> Self {
        self.exec_spawn_id = Some(primary);
        self
    }

    pub fn order_type(&self) -> OrderType {
        self.kind.order_type()
    }

    pub fn price(&self) -> Option<Price> {
        self.kind.price()
    }

    pub fn trigger_price(&self) -> Option<Price> {
        self.kind.trigger_price()
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// Returns `true` if the order is fully filled.
    pub fn is_filled(&self) -> bool {
        self.leaves_qty.is_zero()
    }

    /// Fill the order by up to `qty` at `px`.
    ///
    /// Returns the quantity that was actually filled (`<= qty` and
    /// `<= leaves_qty`) and moves the status to `PARTIALLY_FILLED` or `FILLED`.
    pub fn fill(
        &mut self,
        qty: Quantity,
        px: Price,
        liquidity_side: LiquiditySide,
        ts: UnixNanos,
    ) -> Quantity {
        let filled = qty.min(self.leaves_qty);
        if filled <= Quantity::ZERO {
            return Quantity::ZERO;
        }

        let prev_notional = self.avg_px.unwrap_or_default() * self.filled_qty;
        self.filled_qty += filled;
        self.leaves_qty -= filled;
        self.avg_px = Some((prev_notional + px * filled) / self.filled_qty);
        self.liquidity_side = Some(liquidity_side);
        self.status = if self.leaves_qty.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.ts_last = ts;
        filled
    }

    /// Set a new total quantity, keeping what was already filled.
    pub(crate) fn set_quantity(&mut self, quantity: Quantity) {
        self.quantity = quantity;
        self.leaves_qty = quantity - self.filled_qty;
    }

    /// Back to a working state after a modification or trigger.
    pub(crate) fn working_status(&self) -> OrderStatus {
        if self.filled_qty > Quantity::ZERO {
            OrderStatus::PartiallyFilled
        } else if self.kind.is_triggered() {
            OrderStatus::Triggered
        } else {
            OrderStatus::Accepted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limit_buy(qty: Decimal) -> Order {
        Order::new(
            StrategyId::new("S-1"),
            InstrumentId::new("AAPL.SIM"),
            ClientOrderId::new("O-1"),
            Side::Buy,
            OrderKind::Limit { price: dec!(100) },
            qty,
            0,
        )
    }

    #[test]
    fn fill_never_exceeds_leaves_and_tracks_average() {
        let mut order = limit_buy(dec!(10));
        assert_eq!(order.fill(dec!(4), dec!(100), LiquiditySide::Maker, 1), dec!(4));
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.fill(dec!(10), dec!(99), LiquiditySide::Maker, 2), dec!(6));
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_filled());
        assert_eq!(order.filled_qty, dec!(10));
        assert_eq!(order.avg_px, Some(dec!(99.4)));
        assert_eq!(order.fill(dec!(1), dec!(99), LiquiditySide::Maker, 3), Decimal::ZERO);
    }

    #[test]
    fn set_quantity_keeps_filled_part() {
        let mut order = limit_buy(dec!(10));
        order.fill(dec!(3), dec!(100), LiquiditySide::Taker, 1);
        order.set_quantity(dec!(5));
        assert_eq!(order.leaves_qty, dec!(2));
        assert_eq!(order.working_status(), OrderStatus::PartiallyFilled);
    }
}
