//! Per-instrument order matching engine.
//!
//! - Owns the instrument's [`OrderBook`], [`FillModel`] and open orders.
//! - Turns order commands and market data into execution events.
//! - Single-threaded and deterministic: the same instrument, config, seed,
//!   commands and data always produce the same events.
//!
//! Simulated orders rest in the book next to feed liquidity. Feed updates
//! that cross them fill them as makers (see [`OrderBook::apply_delta_with`]);
//! incoming marketable orders trade as takers at the resting price.

use std::sync::Arc;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::data::{Bar, Data};
use crate::enums::{BookType, LiquiditySide, OrderStatus, TimeInForce};
use crate::error::{BookError, OrderError};
use crate::fee_model::FeeModel;
use crate::fill_model::FillModel;
use crate::identifiers::{
    AccountId, ClientOrderId, Price, Quantity, TradeId, UnixNanos, VenueOrderId, NANOS_PER_DAY,
};
use crate::instrument::Instrument;
use crate::ladder::BookFill;
use crate::messages::{CancelOrder, Fill, ModifyOrder, OrderEvent};
use crate::order::Order;
use crate::order_book::OrderBook;
use crate::order_type::OrderType;
use crate::position::NetPosition;
use crate::reports::{in_window, FillReport, OrderStatusReport, PositionStatusReport};
use crate::side::Side;
use crate::trailing::{self, MarketSnapshot};

/// Behavior switches for one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingEngineConfig {
    pub book_type: BookType,
    /// Fill resting orders from trade ticks.
    pub trade_execution: bool,
    /// Split bars into synthetic trades on L1 books.
    pub bar_execution: bool,
    /// Reject stop orders whose trigger is already in the market.
    pub reject_stop_orders: bool,
    pub support_gtd_orders: bool,
    pub use_reduce_only: bool,
    /// Fail on deltas referencing unknown book entries.
    pub strict_book: bool,
}

impl Default for MatchingEngineConfig {
    fn default() -> Self {
        MatchingEngineConfig {
            book_type: BookType::L1Mbp,
            trade_execution: false,
            bar_execution: true,
            reject_stop_orders: true,
            support_gtd_orders: true,
            use_reduce_only: true,
            strict_book: false,
        }
    }
}

/// How a taker fill price may slip on an L1 book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slippage {
    /// Drawn against `prob_slippage`.
    Market,
    /// Slips unless `is_stop_filled` succeeds.
    Stop,
}

#[derive(Debug)]
pub struct OrderMatchingEngine {
    instrument: Arc<Instrument>,
    config: MatchingEngineConfig,
    venue: String,
    index: usize,
    account_id: AccountId,

    book: OrderBook,
    fill_model: FillModel,
    fee_model: FeeModel,

    /// Open orders in submission order (resting or waiting for a trigger).
    orders: IndexMap<ClientOrderId, Order>,
    /// Terminal orders, in the order they closed.
    closed: IndexMap<ClientOrderId, Order>,
    fills: Vec<Fill>,
    position: NetPosition,
    market: MarketSnapshot,

    order_count: u64,
    execution_count: u64,
    ts_last: UnixNanos,
}

impl OrderMatchingEngine {
    pub fn new(instrument: Arc<Instrument>, config: MatchingEngineConfig) -> Self {
        let book = OrderBook::new(instrument.id.clone(), config.book_type)
            .with_strict(config.strict_book);
        OrderMatchingEngine {
            instrument,
            config,
            venue: "SIM".to_string(),
            index: 0,
            account_id: AccountId::new("SIM-001"),
            book,
            fill_model: FillModel::default(),
            fee_model: FeeModel::default(),
            orders: IndexMap::new(),
            closed: IndexMap::new(),
            fills: Vec::new(),
            position: NetPosition::default(),
            market: MarketSnapshot::default(),
            order_count: 0,
            execution_count: 0,
            ts_last: 0,
        }
    }

    pub fn with_fill_model(mut self, fill_model: FillModel) -> Self {
        self.fill_model = fill_model;
        self
    }

    pub fn with_fee_model(mut self, fee_model: FeeModel) -> Self {
        self.fee_model = fee_model;
        self
    }

    /// Venue name and engine index, used to build venue order and trade ids.
    pub fn with_venue(mut self, venue: impl Into<String>, index: usize) -> Self {
        self.venue = venue.into();
        self.index = index;
        self
    }

    pub fn with_account_id(mut self, account_id: AccountId) -> Self {
        self.account_id = account_id;
        self
    }

    pub fn instrument(&self) -> &Arc<Instrument> {
        &self.instrument
    }

    pub fn config(&self) -> &MatchingEngineConfig {
        &self.config
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn fill_model(&self) -> &FillModel {
        &self.fill_model
    }

    pub fn position(&self) -> &NetPosition {
        &self.position
    }

    pub fn market(&self) -> &MarketSnapshot {
        &self.market
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn ts_last(&self) -> UnixNanos {
        self.ts_last
    }

    /// Open or closed order by id.
    pub fn order(&self, id: &ClientOrderId) -> Option<&Order> {
        self.orders.get(id).or_else(|| self.closed.get(id))
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn total_commission(&self) -> Decimal {
        self.fills.iter().map(|f| f.commission).sum()
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Evaluate a new order against the book and rest or trade it.
    pub fn process_order(&mut self, mut order: Order, ts: UnixNanos) -> Vec<OrderEvent> {
        let ts = self.command_ts(ts);
        let mut events = Vec::new();
        let id = order.client_order_id.clone();

        if self.orders.contains_key(&id) || self.closed.contains_key(&id) {
            events.push(self.reject(&order, format!("duplicate client order id {id}"), ts));
            return events;
        }
        if let Err(err) = self.validate(&order, ts) {
            events.push(self.reject_new(order, err.to_string(), ts));
            return events;
        }
        if order.order_type() == OrderType::Market && self.book.best_opposite(order.side).is_none() {
            let reason = format!("no market for {}", self.instrument.id);
            events.push(self.reject_new(order, reason, ts));
            return events;
        }
        if order.post_only && !order.kind.is_pending_trigger() {
            if let Some(price) = order.price() {
                if self.book.is_marketable(order.side, Some(price)) {
                    let reason = format!(
                        "POST_ONLY {} {:?} order limit px of {} would have been a TAKER: bid={}, ask={}",
                        order.order_type().as_str(),
                        order.side,
                        price,
                        fmt_px(self.book.best_bid_price()),
                        fmt_px(self.book.best_ask_price()),
                    );
                    events.push(self.reject_new(order, reason, ts));
                    return events;
                }
            }
        }

        let trigger_now = order.kind.is_pending_trigger() && trigger_hit(&order, &self.market);
        if trigger_now && !order.kind.is_touch_triggered() && self.config.reject_stop_orders {
            let reason = format!(
                "{} {:?} order trigger px of {} was in the market: bid={}, ask={}",
                order.order_type().as_str(),
                order.side,
                fmt_px(order.trigger_price()),
                fmt_px(self.market.bid),
                fmt_px(self.market.ask),
            );
            events.push(self.reject_new(order, reason, ts));
            return events;
        }

        self.accept(&mut order, ts, &mut events);
        if order.time_in_force == TimeInForce::Day {
            order.expire_time = Some((ts / NANOS_PER_DAY + 1) * NANOS_PER_DAY);
        }
        let is_market = order.order_type() == OrderType::Market;
        let pending = order.kind.is_pending_trigger();
        let trailing = order.kind.trailing().is_some();
        self.orders.insert(id.clone(), order);

        if self.reduce_only_active(&id) && self.reducible(&id).is_zero() {
            debug!(%id, "reduce-only order with no position to reduce");
            self.cancel_open(&id, ts, &mut events);
            return events;
        }

        if pending {
            if trailing {
                self.update_trailing_order(&id, ts, &mut events);
            }
            if trigger_now {
                self.trigger_order(&id, ts, &mut events);
            }
        } else if is_market {
            self.fill_market(&id, ts, Slippage::Market, &mut events);
        } else {
            self.work_limit(&id, ts, &mut events);
        }
        self.after_fills(ts, &mut events);
        events
    }

    /// Change quantity, price or trigger price of an open order.
    ///
    /// Decreasing only the quantity keeps queue position; any other change
    /// re-queues the order at the back of its (new) level.
    pub fn process_modify(&mut self, cmd: &ModifyOrder, ts: UnixNanos) -> Vec<OrderEvent> {
        let ts = self.command_ts(ts);
        let mut events = Vec::new();
        let id = &cmd.client_order_id;

        let Some(order) = self.orders.get(id) else {
            events.push(self.modify_rejected_unknown(id, ts));
            return events;
        };
        if let Err(err) = self.validate_modify(order, cmd) {
            events.push(OrderEvent::modify_rejected(
                order.instrument_id.clone(),
                id.clone(),
                order.venue_order_id.clone(),
                err.to_string(),
                ts,
            ));
            return events;
        }

        if let Some(new_trigger) = cmd.trigger_price {
            if order.kind.is_pending_trigger() {
                let mut moved = order.clone();
                moved.kind.set_trigger_price(new_trigger);
                if trigger_hit(&moved, &self.market) {
                    let reason = format!(
                        "{} {:?} order new trigger px of {} was in the market: bid={}, ask={}",
                        order.order_type().as_str(),
                        order.side,
                        new_trigger,
                        fmt_px(self.market.bid),
                        fmt_px(self.market.ask),
                    );
                    events.push(OrderEvent::modify_rejected(
                        order.instrument_id.clone(),
                        id.clone(),
                        order.venue_order_id.clone(),
                        reason,
                        ts,
                    ));
                    return events;
                }
            }
        }

        let works_as_limit = order.kind.has_limit() && !order.kind.is_pending_trigger();
        let new_price = cmd.price.or(order.price());
        let crossing = works_as_limit
            && new_price.is_some_and(|px| self.book.is_marketable(order.side, Some(px)));
        if crossing && order.post_only {
            let reason = format!(
                "POST_ONLY {} {:?} order with new limit px of {} would have been a TAKER: bid={}, ask={}",
                order.order_type().as_str(),
                order.side,
                fmt_px(new_price),
                fmt_px(self.book.best_bid_price()),
                fmt_px(self.book.best_ask_price()),
            );
            events.push(OrderEvent::modify_rejected(
                order.instrument_id.clone(),
                id.clone(),
                order.venue_order_id.clone(),
                reason,
                ts,
            ));
            return events;
        }

        let resting = self.book.own_order(id);
        let Some(order) = self.orders.get_mut(id) else {
            return events;
        };
        let old_leaves = order.leaves_qty;
        if let Some(price) = cmd.price {
            order.kind.set_price(price);
        }
        if let Some(trigger) = cmd.trigger_price {
            order.kind.set_trigger_price(trigger);
        }
        if let Some(quantity) = cmd.quantity {
            order.set_quantity(quantity);
        }
        order.ts_last = ts;
        events.push(OrderEvent::updated(order, ts));
        debug!(%id, quantity = %order.quantity, price = ?order.price(), "order modified");

        if let Some((side, price, _)) = resting {
            let new_leaves = order.leaves_qty;
            let new_price = order.price().unwrap_or(price);
            if new_price == price && new_leaves <= old_leaves {
                self.book.set_own_size(id, new_leaves);
            } else {
                self.book.remove_own(id);
                if crossing {
                    self.work_limit(id, ts, &mut events);
                } else {
                    self.book.add_own(side, new_price, id.clone(), new_leaves);
                }
            }
        }
        self.reclamp_reduce_only(id, ts, &mut events);
        self.after_fills(ts, &mut events);
        events
    }

    pub fn process_cancel(&mut self, cmd: &CancelOrder, ts: UnixNanos) -> Vec<OrderEvent> {
        let ts = self.command_ts(ts);
        let mut events = Vec::new();
        let id = &cmd.client_order_id;

        if self.orders.contains_key(id) {
            self.cancel_open(id, ts, &mut events);
            return events;
        }
        let (venue_order_id, reason) = match self.closed.get(id) {
            Some(order) => (order.venue_order_id.clone(), "order already closed"),
            None => (None, "order not found"),
        };
        debug!(%id, reason, "cancel rejected");
        events.push(OrderEvent::cancel_rejected(
            self.instrument.id.clone(),
            id.clone(),
            venue_order_id,
            reason,
            ts,
        ));
        events
    }

    /// Cancel every open order, or only those on `side`.
    pub fn cancel_all(&mut self, side: Option<Side>, ts: UnixNanos) -> Vec<OrderEvent> {
        let ts = self.command_ts(ts);
        let mut events = Vec::new();
        let ids: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| side.map_or(true, |s| o.side == s))
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in ids {
            self.cancel_open(&id, ts, &mut events);
        }
        events
    }

    pub fn batch_cancel(&mut self, cancels: &[CancelOrder], ts: UnixNanos) -> Vec<OrderEvent> {
        cancels
            .iter()
            .flat_map(|cancel| self.process_cancel(cancel, ts))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Market data
    // -------------------------------------------------------------------------

    /// Apply one market data record and run everything it may set off:
    /// expiry, maker fills, trailing updates, triggers.
    ///
    /// Records older than the last processed timestamp are dropped.
    /// Errors come from a strict book rejecting a delta or snapshot.
    pub fn process_data(&mut self, data: &Data) -> Result<Vec<OrderEvent>, BookError> {
        let ts = data.ts_init();
        if data.instrument_id() != &self.instrument.id {
            warn!(
                engine = %self.instrument.id,
                got = %data.instrument_id(),
                "data routed to wrong engine, dropping"
            );
            return Ok(Vec::new());
        }
        if ts < self.ts_last {
            error!(
                instrument_id = %self.instrument.id,
                kind = data.kind(),
                ts,
                ts_last = self.ts_last,
                "out-of-order market data, dropping"
            );
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        self.expire_orders(ts, &mut events);
        self.ts_last = ts;
        trace!(instrument_id = %self.instrument.id, kind = data.kind(), ts, "processing data");

        match data {
            Data::Delta(delta) => {
                let fills = self.book.apply_delta_with(delta, &mut self.fill_model)?;
                self.apply_maker_fills(fills, ts, &mut events);
            }
            Data::Deltas(deltas) => {
                let fills = self.book.apply_deltas_with(deltas, &mut self.fill_model)?;
                self.apply_maker_fills(fills, ts, &mut events);
            }
            Data::Depth(snapshot) => {
                let fills = self.book.apply_depth_snapshot_with(snapshot, &mut self.fill_model)?;
                self.apply_maker_fills(fills, ts, &mut events);
            }
            Data::Quote(quote) => {
                if self.config.book_type == BookType::L1Mbp {
                    let fills = self.book.update_quote_with(
                        (quote.bid_price, quote.bid_size),
                        (quote.ask_price, quote.ask_size),
                        ts,
                        &mut self.fill_model,
                    );
                    self.apply_maker_fills(fills, ts, &mut events);
                }
            }
            Data::Trade(trade) => {
                self.process_trade(trade.price, trade.size, trade.aggressor_side, ts, &mut events)?;
            }
            Data::Bar(bar) => {
                self.process_bar(bar, ts, &mut events)?;
                return Ok(events);
            }
            Data::MarkPrice(mark) => self.market.mark = Some(mark.value),
        }

        self.after_market_update(ts, &mut events);
        Ok(events)
    }

    /// Expire GTD and DAY orders due at `ts`.
    pub fn iterate(&mut self, ts: UnixNanos) -> Vec<OrderEvent> {
        let mut events = Vec::new();
        if ts >= self.ts_last {
            self.expire_orders(ts, &mut events);
            self.ts_last = ts;
        }
        events
    }

    // -------------------------------------------------------------------------
    // Reports
    // -------------------------------------------------------------------------

    pub fn generate_order_status_report(&self, id: &ClientOrderId) -> Option<OrderStatusReport> {
        self.order(id)
            .map(|order| OrderStatusReport::from_order(&self.account_id, order))
    }

    /// Reports for orders whose `ts_last` falls in `[start, end]`, by submission time.
    pub fn generate_order_status_reports(
        &self,
        open_only: bool,
        start: Option<UnixNanos>,
        end: Option<UnixNanos>,
    ) -> Vec<OrderStatusReport> {
        let closed = self.closed.values().filter(|_| !open_only);
        let mut reports: Vec<OrderStatusReport> = self
            .orders
            .values()
            .chain(closed)
            .filter(|o| in_window(o.ts_last, start, end))
            .map(|o| OrderStatusReport::from_order(&self.account_id, o))
            .collect();
        reports.sort_by_key(|r| r.ts_init);
        reports
    }

    pub fn generate_fill_reports(
        &self,
        start: Option<UnixNanos>,
        end: Option<UnixNanos>,
    ) -> Vec<FillReport> {
        self.fills
            .iter()
            .filter(|f| in_window(f.ts_event, start, end))
            .map(|f| FillReport::from_fill(&self.account_id, f))
            .collect()
    }

    pub fn generate_position_status_report(&self) -> PositionStatusReport {
        PositionStatusReport::from_position(
            &self.account_id,
            &self.instrument.id,
            &self.position,
            self.ts_last,
        )
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Commands never move the engine clock backwards.
    fn command_ts(&mut self, ts: UnixNanos) -> UnixNanos {
        self.ts_last = self.ts_last.max(ts);
        self.ts_last
    }

    fn validate(&self, order: &Order, ts: UnixNanos) -> Result<(), OrderError> {
        let inst = &self.instrument;
        if order.instrument_id != inst.id {
            return Err(OrderError::InstrumentMismatch {
                expected: inst.id.clone(),
                got: order.instrument_id.clone(),
            });
        }
        self.validate_quantity(order.quantity)?;
        if let Some(price) = order.price() {
            self.validate_price("price", price)?;
        }
        if let Some(trigger) = order.trigger_price() {
            self.validate_price("trigger_price", trigger)?;
        }
        if let Some(trailing) = order.kind.trailing() {
            if trailing.trailing_offset < Decimal::ZERO {
                return Err(OrderError::NegativeTrailingOffset(trailing.trailing_offset));
            }
        }
        if order.post_only && !order.kind.has_limit() {
            return Err(OrderError::PostOnlyNotLimit(order.order_type().as_str()));
        }
        if order.time_in_force == TimeInForce::Gtd {
            if !self.config.support_gtd_orders {
                return Err(OrderError::GtdNotSupported);
            }
            match order.expire_time {
                None => return Err(OrderError::MissingExpireTime),
                Some(expire_time) if expire_time <= ts => {
                    return Err(OrderError::ExpireTimeInPast { expire_time, now: ts })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn validate_quantity(&self, quantity: Quantity) -> Result<(), OrderError> {
        let inst = &self.instrument;
        if quantity <= Quantity::ZERO {
            return Err(OrderError::NonPositiveQuantity(quantity));
        }
        if !inst.is_valid_quantity(quantity) {
            return Err(OrderError::InvalidQuantity {
                quantity,
                precision: inst.size_precision,
                increment: inst.size_increment,
            });
        }
        if let Some(min) = inst.min_quantity {
            if quantity < min {
                return Err(OrderError::BelowMinQuantity { quantity, min });
            }
        }
        if let Some(max) = inst.max_quantity {
            if quantity > max {
                return Err(OrderError::AboveMaxQuantity { quantity, max });
            }
        }
        Ok(())
    }

    fn validate_price(&self, field: &'static str, price: Price) -> Result<(), OrderError> {
        let inst = &self.instrument;
        if !inst.is_valid_price(price) {
            return Err(OrderError::InvalidPrice {
                field,
                price,
                precision: inst.price_precision,
                increment: inst.price_increment,
            });
        }
        let below = inst.min_price.is_some_and(|min| price < min);
        let above = inst.max_price.is_some_and(|max| price > max);
        if below || above {
            return Err(OrderError::PriceOutOfRange { field, price });
        }
        Ok(())
    }

    fn validate_modify(&self, order: &Order, cmd: &ModifyOrder) -> Result<(), OrderError> {
        if let Some(quantity) = cmd.quantity {
            if quantity <= order.filled_qty {
                return Err(OrderError::QuantityBelowFilled {
                    quantity,
                    filled: order.filled_qty,
                });
            }
            self.validate_quantity(quantity)?;
        }
        if let Some(price) = cmd.price {
            self.validate_price("price", price)?;
        }
        if let Some(trigger) = cmd.trigger_price {
            self.validate_price("trigger_price", trigger)?;
        }
        Ok(())
    }

    fn reject(&self, order: &Order, reason: impl Into<String>, ts: UnixNanos) -> OrderEvent {
        let reason = reason.into();
        debug!(id = %order.client_order_id, %reason, "order rejected");
        OrderEvent::rejected(
            order.instrument_id.clone(),
            order.client_order_id.clone(),
            reason,
            ts,
        )
    }

    /// Reject a new order and keep it as closed, so its id stays taken.
    fn reject_new(&mut self, mut order: Order, reason: String, ts: UnixNanos) -> OrderEvent {
        let event = self.reject(&order, reason, ts);
        order.status = OrderStatus::Rejected;
        order.ts_last = ts;
        self.closed.insert(order.client_order_id.clone(), order);
        event
    }

    fn modify_rejected_unknown(&self, id: &ClientOrderId, ts: UnixNanos) -> OrderEvent {
        let (venue_order_id, reason) = match self.closed.get(id) {
            Some(order) => (order.venue_order_id.clone(), "order already closed"),
            None => (None, "order not found"),
        };
        OrderEvent::modify_rejected(self.instrument.id.clone(), id.clone(), venue_order_id, reason, ts)
    }

    fn accept(&mut self, order: &mut Order, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        self.order_count += 1;
        let venue_order_id =
            VenueOrderId::new(format!("{}-{}-{:03}", self.venue, self.index, self.order_count));
        order.venue_order_id = Some(venue_order_id.clone());
        order.status = OrderStatus::Accepted;
        order.ts_last = ts;
        debug!(id = %order.client_order_id, %venue_order_id, "order accepted");
        events.push(OrderEvent::accepted(order, venue_order_id, ts));
    }

    fn reduce_only_active(&self, id: &ClientOrderId) -> bool {
        self.config.use_reduce_only && self.orders.get(id).is_some_and(|o| o.reduce_only)
    }

    /// Position an order's side can still close.
    fn reducible(&self, id: &ClientOrderId) -> Quantity {
        self.orders
            .get(id)
            .map(|o| self.position.reducible_by(o.side))
            .unwrap_or_default()
    }

    /// Quantity the order may trade right now.
    fn tradable_qty(&self, id: &ClientOrderId) -> Quantity {
        let Some(order) = self.orders.get(id) else {
            return Quantity::ZERO;
        };
        if self.reduce_only_active(id) {
            order.leaves_qty.min(self.position.reducible_by(order.side))
        } else {
            order.leaves_qty
        }
    }

    /// Trade a market (or triggered market-type) order against the book.
    fn fill_market(
        &mut self,
        id: &ClientOrderId,
        ts: UnixNanos,
        slippage: Slippage,
        events: &mut Vec<OrderEvent>,
    ) {
        let Some(order) = self.orders.get(id) else {
            return;
        };
        let side = order.side;
        let tif = order.time_in_force;
        if tif == TimeInForce::Fok && !self.clamp_before_fok(id, ts, events) {
            return;
        }
        let qty = self.tradable_qty(id);

        if tif == TimeInForce::Fok && self.book.available(side, None) < qty {
            debug!(%id, "FOK market order not fully fillable");
            self.cancel_open(id, ts, events);
            return;
        }

        let book_fills = self.book.match_taker(side, None, qty);
        let mut last_px = None;
        for book_fill in book_fills {
            let px = self.slip(book_fill.price, side, slippage);
            self.apply_taker_fill(id, &book_fill, px, ts, events);
            last_px = Some(px);
        }

        if !self.orders.contains_key(id) {
            return;
        }
        let remaining = self.tradable_qty(id);
        match (self.config.book_type, last_px) {
            (BookType::L1Mbp, Some(px)) if remaining > Quantity::ZERO => {
                // top of book exhausted: the rest goes one tick through
                let worse = self.tick_worse(px, side);
                self.fill_order(id, remaining, worse, LiquiditySide::Taker, ts, events);
            }
            _ => {}
        }
        if self.orders.contains_key(id) {
            self.cancel_open(id, ts, events);
        }
    }

    /// Trade a limit (or triggered limit-type) order up to its price,
    /// then rest the remainder or cancel it per time in force.
    fn work_limit(&mut self, id: &ClientOrderId, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        let Some(order) = self.orders.get(id) else {
            return;
        };
        let side = order.side;
        let tif = order.time_in_force;
        let Some(price) = order.price().or(order.trigger_price()) else {
            return;
        };

        if self.book.is_marketable(side, Some(price)) {
            if tif == TimeInForce::Fok && !self.clamp_before_fok(id, ts, events) {
                return;
            }
            let qty = self.tradable_qty(id);
            if tif == TimeInForce::Fok && self.book.available(side, Some(price)) < qty {
                debug!(%id, "FOK limit order not fully fillable");
                self.cancel_open(id, ts, events);
                return;
            }
            let book_fills = self.book.match_taker(side, Some(price), qty);
            for book_fill in book_fills {
                let px = book_fill.price;
                self.apply_taker_fill(id, &book_fill, px, ts, events);
            }
        }

        self.reclamp_reduce_only(id, ts, events);
        let Some(order) = self.orders.get(id) else {
            return;
        };
        if tif.is_immediate() {
            self.cancel_open(id, ts, events);
            return;
        }
        let leaves = order.leaves_qty;
        self.book.add_own(side, price, id.clone(), leaves);
        trace!(%id, %price, %leaves, "order resting");
    }

    /// Shrink a reduce-only FOK to what it can reduce before checking depth,
    /// so the whole (clamped) order fills or none of it does. Returns
    /// `false` if the order closed instead.
    fn clamp_before_fok(&mut self, id: &ClientOrderId, ts: UnixNanos, events: &mut Vec<OrderEvent>) -> bool {
        self.reclamp_reduce_only(id, ts, events);
        self.orders.contains_key(id)
    }

    fn apply_taker_fill(
        &mut self,
        id: &ClientOrderId,
        book_fill: &BookFill,
        px: Price,
        ts: UnixNanos,
        events: &mut Vec<OrderEvent>,
    ) {
        if let Some(maker_id) = book_fill.maker.own_id() {
            let maker_id = maker_id.clone();
            self.fill_order(&maker_id, book_fill.size, book_fill.price, LiquiditySide::Maker, ts, events);
        }
        self.fill_order(id, book_fill.size, px, LiquiditySide::Taker, ts, events);
    }

    fn apply_maker_fills(&mut self, book_fills: Vec<BookFill>, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        for book_fill in book_fills {
            if let Some(id) = book_fill.maker.own_id() {
                self.fill_order(id, book_fill.size, book_fill.price, LiquiditySide::Maker, ts, events);
            }
        }
    }

    /// Record a fill on an open order. Reduce-only orders are clipped so
    /// they never grow or flip the position.
    fn fill_order(
        &mut self,
        id: &ClientOrderId,
        qty: Quantity,
        px: Price,
        liquidity_side: LiquiditySide,
        ts: UnixNanos,
        events: &mut Vec<OrderEvent>,
    ) -> Quantity {
        let qty = if self.reduce_only_active(id) {
            qty.min(self.reducible(id))
        } else {
            qty
        };
        let Some(order) = self.orders.get_mut(id) else {
            return Quantity::ZERO;
        };
        let first_fill = order.filled_qty.is_zero();
        let filled = order.fill(qty, px, liquidity_side, ts);
        if filled.is_zero() {
            return filled;
        }
        assert!(
            order.filled_qty <= order.quantity,
            "over-fill on {}: filled {} of {}",
            order.client_order_id,
            order.filled_qty,
            order.quantity
        );

        self.execution_count += 1;
        let trade_id = TradeId::new(format!(
            "{}-{}-{:03}",
            self.venue, self.index, self.execution_count
        ));
        let commission =
            self.fee_model
                .commission(&self.instrument, filled, px, liquidity_side, first_fill);
        self.position
            .apply_fill(order.side, filled, px, self.instrument.multiplier);

        let fill = Fill {
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone().unwrap_or_else(|| VenueOrderId::new("")),
            strategy_id: order.strategy_id.clone(),
            trade_id,
            order_side: order.side,
            order_type: order.order_type(),
            last_qty: filled,
            last_px: px,
            liquidity_side,
            commission,
            commission_currency: self.instrument.quote_currency.clone(),
            ts_event: ts,
        };
        trace!(
            %id,
            trade_id = %fill.trade_id,
            qty = %filled,
            %px,
            liquidity = ?liquidity_side,
            "fill"
        );
        let done = order.is_filled();
        self.fills.push(fill.clone());
        events.push(OrderEvent::Filled(fill));

        if done {
            self.book.remove_own(id);
            self.close(id);
        }
        filled
    }

    fn slip(&mut self, px: Price, side: Side, slippage: Slippage) -> Price {
        if self.config.book_type != BookType::L1Mbp {
            return px;
        }
        let slipped = match slippage {
            Slippage::Market => self.fill_model.is_slipped(),
            Slippage::Stop => !self.fill_model.is_stop_filled(),
        };
        if slipped {
            self.tick_worse(px, side)
        } else {
            px
        }
    }

    fn tick_worse(&self, px: Price, side: Side) -> Price {
        match side {
            Side::Buy => self.instrument.next_price_up(px),
            Side::Sell => self.instrument.next_price_down(px),
        }
    }

    fn cancel_open(&mut self, id: &ClientOrderId, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        self.book.remove_own(id);
        if let Some(order) = self.orders.get_mut(id) {
            order.status = OrderStatus::Canceled;
            order.ts_last = ts;
            debug!(%id, leaves = %order.leaves_qty, "order canceled");
            events.push(OrderEvent::canceled(order, ts));
        }
        self.close(id);
    }

    fn close(&mut self, id: &ClientOrderId) {
        if let Some(order) = self.orders.shift_remove(id) {
            self.closed.insert(id.clone(), order);
        }
    }

    fn expire_orders(&mut self, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        let due: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| o.expire_time.is_some_and(|t| ts >= t))
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in due {
            self.book.remove_own(&id);
            if let Some(mut order) = self.orders.shift_remove(&id) {
                order.status = OrderStatus::Expired;
                order.ts_last = ts;
                debug!(%id, "order expired");
                events.push(OrderEvent::expired(&order, ts));
                self.closed.insert(id, order);
            }
        }
    }

    /// On L1 books the print also becomes the new top of book, after it
    /// has had its chance to fill resting orders.
    fn process_trade(
        &mut self,
        price: Price,
        size: Quantity,
        aggressor: Option<Side>,
        ts: UnixNanos,
        events: &mut Vec<OrderEvent>,
    ) -> Result<(), BookError> {
        self.market.last = Some(price);
        if self.config.trade_execution {
            let fills = self
                .book
                .simulate_trade(price, size, aggressor, ts, &mut self.fill_model);
            self.apply_maker_fills(fills, ts, events);
        }
        if self.config.book_type == BookType::L1Mbp {
            self.book
                .update_trade_tick(price, size, aggressor, self.instrument.price_increment, ts)?;
        }
        Ok(())
    }

    /// On an L1 book with bar execution, walk the bar as synthetic trades;
    /// without it an L1 top moves to the close. Deeper books only take
    /// the close as the last price.
    fn process_bar(&mut self, bar: &Bar, ts: UnixNanos, events: &mut Vec<OrderEvent>) -> Result<(), BookError> {
        let quarter = self.instrument.floor_quantity(bar.volume / Decimal::from(4));
        let size = quarter.max(self.instrument.size_increment);
        let tick = self.instrument.price_increment;

        if self.config.book_type != BookType::L1Mbp {
            self.market.last = Some(bar.close);
            self.after_market_update(ts, events);
            return Ok(());
        }
        if !self.config.bar_execution {
            self.market.last = Some(bar.close);
            self.book.update_trade_tick(bar.close, size, None, tick, ts)?;
            self.after_market_update(ts, events);
            return Ok(());
        }

        for price in bar_path(bar, self.market.last) {
            let fills = self
                .book
                .simulate_trade(price, size, None, ts, &mut self.fill_model);
            self.market.last = Some(price);
            self.apply_maker_fills(fills, ts, events);
            self.book.update_trade_tick(price, size, None, tick, ts)?;
            self.after_market_update(ts, events);
        }
        Ok(())
    }

    fn after_market_update(&mut self, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        self.refresh_market();
        self.update_trailing(ts, events);
        self.check_triggers(ts, events);
        self.after_fills(ts, events);
    }

    /// Position may have changed: re-clamp resting reduce-only orders.
    fn after_fills(&mut self, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        if !self.config.use_reduce_only {
            return;
        }
        let ids: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| o.reduce_only)
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in ids {
            self.reclamp_reduce_only(&id, ts, events);
        }
    }

    fn reclamp_reduce_only(&mut self, id: &ClientOrderId, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        if !self.reduce_only_active(id) {
            return;
        }
        let reducible = self.reducible(id);
        let Some(order) = self.orders.get_mut(id) else {
            return;
        };
        if order.leaves_qty <= reducible {
            return;
        }
        if reducible.is_zero() {
            debug!(%id, "reduce-only order has nothing left to reduce");
            self.cancel_open(id, ts, events);
            return;
        }
        let quantity = order.filled_qty + reducible;
        order.set_quantity(quantity);
        order.ts_last = ts;
        events.push(OrderEvent::updated(order, ts));
        self.book.set_own_size(id, reducible);
    }

    fn refresh_market(&mut self) {
        self.market.bid = self.book.best_bid_price();
        self.market.ask = self.book.best_ask_price();
    }

    fn update_trailing(&mut self, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        let ids: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| o.kind.trailing().is_some() && o.kind.is_pending_trigger())
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in ids {
            self.update_trailing_order(&id, ts, events);
        }
    }

    fn update_trailing_order(&mut self, id: &ClientOrderId, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        let Some(order) = self.orders.get_mut(id) else {
            return;
        };
        let Some(update) = trailing::calculate(&self.instrument, order.side, &order.kind, &self.market)
        else {
            return;
        };
        if update.activated {
            order.kind.set_activated();
            debug!(%id, "trailing stop activated");
        }
        let mut moved = false;
        if let Some(trigger) = update.trigger_price {
            order.kind.set_trigger_price(trigger);
            moved = true;
        }
        if let Some(price) = update.price {
            order.kind.set_price(price);
            moved = true;
        }
        if moved {
            order.ts_last = ts;
            trace!(%id, trigger = ?order.trigger_price(), price = ?order.price(), "trailing stop moved");
            events.push(OrderEvent::updated(order, ts));
        }
    }

    fn check_triggers(&mut self, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        let due: Vec<ClientOrderId> = self
            .orders
            .values()
            .filter(|o| o.kind.is_pending_trigger() && trigger_hit(o, &self.market))
            .map(|o| o.client_order_id.clone())
            .collect();
        for id in due {
            let still_pending = self
                .orders
                .get(&id)
                .is_some_and(|o| o.kind.is_pending_trigger());
            if still_pending {
                self.trigger_order(&id, ts, events);
                self.refresh_market();
            }
        }
    }

    fn trigger_order(&mut self, id: &ClientOrderId, ts: UnixNanos, events: &mut Vec<OrderEvent>) {
        let Some(order) = self.orders.get_mut(id) else {
            return;
        };
        let side = order.side;

        if order.kind.is_market_on_trigger() {
            if self.book.best_opposite(side).is_none() {
                trace!(%id, "triggered with no liquidity, waiting");
                return;
            }
            let slippage = if order.kind.is_touch_triggered() {
                Slippage::Market
            } else {
                Slippage::Stop
            };
            debug!(%id, trigger = ?order.trigger_price(), "stop triggered");
            self.fill_market(id, ts, slippage, events);
            return;
        }

        if let (None, Some(trigger)) = (order.price(), order.trigger_price()) {
            order.kind.set_price(trigger);
        }
        order.kind.set_triggered();
        order.status = order.working_status();
        order.ts_last = ts;
        debug!(%id, trigger = ?order.trigger_price(), price = ?order.price(), "order triggered");
        events.push(OrderEvent::triggered(order, ts));

        let post_only = order.post_only;
        let price = order.price();
        if post_only && self.book.is_marketable(side, price) {
            debug!(%id, "post-only order would take liquidity once triggered");
            self.cancel_open(id, ts, events);
            return;
        }
        self.work_limit(id, ts, events);
    }
}

/// `true` when the market has reached the order's trigger.
///
/// Stops fire when the basis moves through the trigger (buy at or above,
/// sell at or below); touch orders fire when it comes to it from the
/// other side.
fn trigger_hit(order: &Order, market: &MarketSnapshot) -> bool {
    let (Some(trigger), Some(trigger_type)) = (order.trigger_price(), order.kind.trigger_type())
    else {
        return false;
    };
    let Some(basis) = market.basis(trigger_type, order.side) else {
        return false;
    };
    match (order.kind.is_touch_triggered(), order.side) {
        (false, Side::Buy) | (true, Side::Sell) => basis >= trigger,
        (false, Side::Sell) | (true, Side::Buy) => basis <= trigger,
    }
}

/// Synthetic trade prices for one bar: open (only without a prior last),
/// then high and low when they extend past the running last, then close.
fn bar_path(bar: &Bar, last: Option<Price>) -> Vec<Price> {
    let mut path = Vec::with_capacity(4);
    let mut current = match last {
        Some(px) => px,
        None => {
            path.push(bar.open);
            bar.open
        }
    };
    if bar.high > current {
        path.push(bar.high);
        current = bar.high;
    }
    if bar.low < current {
        path.push(bar.low);
        current = bar.low;
    }
    if bar.close != current {
        path.push(bar.close);
    }
    path
}

fn fmt_px(px: Option<Price>) -> String {
    px.map_or_else(|| "None".to_string(), |p| p.normalize().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BookOrder, MarkPriceUpdate, OrderBookDelta, QuoteTick, TradeTick};
    use crate::enums::BookAction;
    use crate::identifiers::{InstrumentId, StrategyId};
    use crate::order_type::{OrderKind, Trailing};
    use crate::enums::{TrailingOffsetType, TriggerType};
    use rust_decimal_macros::dec;

    fn inst_id() -> InstrumentId {
        InstrumentId::new("AAPL.SIM")
    }

    fn engine(book_type: BookType) -> OrderMatchingEngine {
        let instrument = Arc::new(Instrument::new("AAPL.SIM", 2, 0).unwrap());
        let config = MatchingEngineConfig {
            book_type,
            trade_execution: true,
            ..Default::default()
        };
        OrderMatchingEngine::new(instrument, config).with_fee_model(FeeModel::Zero)
    }

    fn order(id: &str, side: Side, kind: OrderKind, qty: Quantity) -> Order {
        Order::new(
            StrategyId::new("S-1"),
            inst_id(),
            ClientOrderId::new(id),
            side,
            kind,
            qty,
            0,
        )
    }

    fn limit(id: &str, side: Side, price: Price, qty: Quantity) -> Order {
        order(id, side, OrderKind::Limit { price }, qty)
    }

    fn add(side: Side, price: Price, size: Quantity, seq: u64) -> Data {
        Data::Delta(OrderBookDelta::new(
            inst_id(),
            BookAction::Add,
            BookOrder::new(side, price, size, seq),
            seq,
            seq,
        ))
    }

    /// bids [(100, 10), (99, 5)], asks [(101, 8)]
    fn seeded_l2() -> OrderMatchingEngine {
        seed(engine(BookType::L2Mbp))
    }

    fn seed(mut engine: OrderMatchingEngine) -> OrderMatchingEngine {
        for data in [
            add(Side::Buy, dec!(100), dec!(10), 1),
            add(Side::Buy, dec!(99), dec!(5), 2),
            add(Side::Sell, dec!(101), dec!(8), 3),
        ] {
            engine.process_data(&data).unwrap();
        }
        engine
    }

    fn kinds(events: &[OrderEvent]) -> Vec<&'static str> {
        events.iter().map(OrderEvent::kind).collect()
    }

    fn trade(price: Price, ts: UnixNanos) -> Data {
        Data::Trade(TradeTick::new(inst_id(), price, dec!(1), None, TradeId::new(format!("T-{ts}")), ts))
    }

    fn cancel(id: &str, ts: UnixNanos) -> CancelOrder {
        CancelOrder {
            instrument_id: inst_id(),
            client_order_id: ClientOrderId::new(id),
            ts_init: ts,
        }
    }

    fn fills(events: &[OrderEvent]) -> Vec<(&str, Quantity, Price)> {
        events
            .iter()
            .filter_map(OrderEvent::as_fill)
            .map(|f| (f.client_order_id.as_str(), f.last_qty, f.last_px))
            .collect()
    }

    #[test]
    fn marketable_limit_takes_then_rests_remainder() {
        let mut engine = seeded_l2();
        let events = engine.process_order(limit("O-1", Side::Buy, dec!(101), dec!(12)), 10);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED"]);

        let fill = events[1].as_fill().unwrap();
        assert_eq!(fill.last_qty, dec!(8));
        assert_eq!(fill.last_px, dec!(101));
        assert_eq!(fill.liquidity_side, LiquiditySide::Taker);
        assert_eq!(fill.trade_id.as_str(), "SIM-0-001");

        assert_eq!(engine.book().best_bid_price(), Some(dec!(101)));
        assert_eq!(engine.book().best_bid_size(), Some(dec!(4)));
        assert_eq!(engine.book().best_ask_price(), None);
        let order = engine.order(&ClientOrderId::new("O-1")).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.venue_order_id.as_ref().map(|v| v.as_str()), Some("SIM-0-001"));
    }

    #[test]
    fn fok_is_all_or_nothing() {
        let mut engine = seeded_l2();
        let fok = limit("O-1", Side::Buy, dec!(101), dec!(9)).with_time_in_force(TimeInForce::Fok);
        let events = engine.process_order(fok, 10);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "CANCELED"]);
        assert_eq!(engine.book().best_ask_size(), Some(dec!(8)));

        let fok = limit("O-2", Side::Buy, dec!(101), dec!(8)).with_time_in_force(TimeInForce::Fok);
        let events = engine.process_order(fok, 11);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED"]);
        assert!(engine.order(&ClientOrderId::new("O-2")).unwrap().is_filled());
    }

    #[test]
    fn ioc_cancels_remainder() {
        let mut engine = seeded_l2();
        let ioc = limit("O-1", Side::Sell, dec!(100), dec!(12)).with_time_in_force(TimeInForce::Ioc);
        let events = engine.process_order(ioc, 10);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED", "CANCELED"]);
        assert_eq!(engine.book().best_bid_price(), Some(dec!(99)));
        assert_eq!(engine.book().own_count(), 0);
    }

    #[test]
    fn post_only_crossing_is_rejected() {
        let mut engine = seeded_l2();
        let order = limit("O-1", Side::Buy, dec!(101), dec!(1)).with_post_only(true);
        let events = engine.process_order(order, 10);
        assert_eq!(kinds(&events), vec!["REJECTED"]);
        match &events[0] {
            OrderEvent::Rejected(e) => assert!(e.reason.starts_with("POST_ONLY LIMIT Buy")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn market_order_without_liquidity_is_rejected() {
        let mut engine = engine(BookType::L2Mbp);
        let events = engine.process_order(order("O-1", Side::Buy, OrderKind::Market, dec!(1)), 1);
        assert_eq!(kinds(&events), vec!["REJECTED"]);
    }

    #[test]
    fn invalid_quantity_rejected_with_reason() {
        let mut engine = seeded_l2();
        let events = engine.process_order(limit("O-1", Side::Buy, dec!(99), dec!(1.5)), 10);
        match &events[0] {
            OrderEvent::Rejected(e) => assert!(e.reason.contains("size precision 0")),
            other => panic!("unexpected event {other:?}"),
        }
        let events = engine.process_order(limit("O-2", Side::Buy, dec!(99.001), dec!(1)), 10);
        assert_eq!(kinds(&events), vec!["REJECTED"]);
    }

    #[test]
    fn resting_orders_fill_in_time_priority() {
        let mut engine = seeded_l2();
        engine.process_order(limit("O-1", Side::Sell, dec!(102), dec!(3)), 10);
        engine.process_order(limit("O-2", Side::Sell, dec!(102), dec!(3)), 11);

        let events = engine.process_order(limit("O-3", Side::Buy, dec!(102), dec!(12)), 12);
        let fills: Vec<(&str, Quantity)> = events
            .iter()
            .filter_map(OrderEvent::as_fill)
            .map(|f| (f.client_order_id.as_str(), f.last_qty))
            .collect();
        assert_eq!(
            fills,
            vec![
                ("O-3", dec!(8)),
                ("O-1", dec!(3)),
                ("O-3", dec!(3)),
                ("O-2", dec!(1)),
                ("O-3", dec!(1)),
            ]
        );
        assert_eq!(engine.order(&ClientOrderId::new("O-1")).unwrap().status, OrderStatus::Filled);
        assert_eq!(engine.order(&ClientOrderId::new("O-2")).unwrap().leaves_qty, dec!(2));
    }

    #[test]
    fn gtd_expires_on_first_data_at_expire_time() {
        let mut engine = seeded_l2();
        let gtd = limit("O-1", Side::Buy, dec!(100), dec!(5)).with_expire_time(100);
        assert_eq!(kinds(&engine.process_order(gtd, 90)), vec!["ACCEPTED"]);

        assert!(engine.process_data(&add(Side::Buy, dec!(98), dec!(1), 99)).unwrap().is_empty());

        // this ask would cross the resting bid, but the order expires first
        let events = engine.process_data(&add(Side::Sell, dec!(100), dec!(20), 100)).unwrap();
        assert_eq!(kinds(&events), vec!["EXPIRED"]);
        assert!(engine.fills().is_empty());
    }

    #[test]
    fn reduce_only_never_flips_position() {
        let mut engine = seeded_l2();
        engine.process_order(limit("O-1", Side::Buy, dec!(101), dec!(8)), 10);
        engine.process_data(&add(Side::Sell, dec!(103), dec!(100), 11)).unwrap();
        engine.process_order(limit("O-2", Side::Buy, dec!(103), dec!(22)), 12);
        assert_eq!(engine.position().signed_qty, dec!(30));

        let sell = order("O-3", Side::Sell, OrderKind::Market, dec!(50)).with_reduce_only(true);
        let events = engine.process_order(sell, 13);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED", "FILLED", "CANCELED"]);
        let filled: Quantity = events.iter().filter_map(OrderEvent::as_fill).map(|f| f.last_qty).sum();
        assert_eq!(filled, dec!(15));

        // only 15 bid liquidity existed; the rest of the position stays
        assert_eq!(engine.position().signed_qty, dec!(15));

        engine.process_data(&add(Side::Buy, dec!(98), dec!(100), 14)).unwrap();
        let sell = limit("O-4", Side::Sell, dec!(98), dec!(50)).with_reduce_only(true);
        let events = engine.process_order(sell, 15);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED", "CANCELED"]);
        assert!(engine.position().is_flat());

        let sell = limit("O-5", Side::Sell, dec!(98), dec!(1)).with_reduce_only(true);
        assert_eq!(kinds(&engine.process_order(sell, 16)), vec!["ACCEPTED", "CANCELED"]);
    }

    #[test]
    fn stop_in_market_rejected_and_stop_triggers_on_trade() {
        let mut engine = seeded_l2();
        engine.process_data(&Data::Trade(TradeTick::new(inst_id(), dec!(100.5), dec!(1), None, "T-1".into(), 4)))
            .unwrap();
        let in_market = order(
            "O-1",
            Side::Buy,
            OrderKind::StopMarket {
                trigger_price: dec!(100),
                trigger_type: TriggerType::LastPrice,
            },
            dec!(2),
        );
        assert_eq!(kinds(&engine.process_order(in_market, 5)), vec!["REJECTED"]);

        let stop = order(
            "O-2",
            Side::Buy,
            OrderKind::StopMarket {
                trigger_price: dec!(101),
                trigger_type: TriggerType::LastPrice,
            },
            dec!(2),
        );
        assert_eq!(kinds(&engine.process_order(stop, 6)), vec!["ACCEPTED"]);

        let events = engine
            .process_data(&Data::Trade(TradeTick::new(inst_id(), dec!(101), dec!(1), None, "T-2".into(), 7)))
            .unwrap();
        assert_eq!(kinds(&events), vec!["FILLED"]);
        assert_eq!(events[0].as_fill().unwrap().last_px, dec!(101));
    }

    #[test]
    fn modify_quantity_down_keeps_priority() {
        let mut engine = seeded_l2();
        engine.process_order(limit("O-1", Side::Sell, dec!(102), dec!(5)), 10);
        engine.process_order(limit("O-2", Side::Sell, dec!(102), dec!(5)), 11);

        let modify = ModifyOrder {
            instrument_id: inst_id(),
            client_order_id: ClientOrderId::new("O-1"),
            quantity: Some(dec!(2)),
            price: None,
            trigger_price: None,
            ts_init: 12,
        };
        assert_eq!(kinds(&engine.process_modify(&modify, 12)), vec!["UPDATED"]);
        let level = engine.book().asks().level(dec!(102)).unwrap();
        let first = level.entries().next().unwrap();
        assert_eq!(first.key.own_id().map(|id| id.as_str()), Some("O-1"));
        assert_eq!(first.size, dec!(2));

        let up = ModifyOrder {
            quantity: Some(dec!(6)),
            ..modify.clone()
        };
        engine.process_modify(&up, 13);
        let level = engine.book().asks().level(dec!(102)).unwrap();
        let order: Vec<&str> = level
            .entries()
            .filter_map(|e| e.key.own_id())
            .map(|id| id.as_str())
            .collect();
        assert_eq!(order, vec!["O-2", "O-1"]);

        let below_filled = ModifyOrder {
            quantity: Some(dec!(0)),
            ..modify
        };
        assert_eq!(kinds(&engine.process_modify(&below_filled, 14)), vec!["MODIFY_REJECTED"]);
    }

    #[test]
    fn cancel_twice_is_rejected_not_repeated() {
        let mut engine = seeded_l2();
        engine.process_order(limit("O-1", Side::Buy, dec!(99), dec!(1)), 10);
        let cancel = CancelOrder {
            instrument_id: inst_id(),
            client_order_id: ClientOrderId::new("O-1"),
            ts_init: 11,
        };
        assert_eq!(kinds(&engine.process_cancel(&cancel, 11)), vec!["CANCELED"]);
        assert_eq!(kinds(&engine.process_cancel(&cancel, 12)), vec!["CANCEL_REJECTED"]);
        assert_eq!(engine.book().own_count(), 0);
    }

    #[test]
    fn l1_market_order_walks_one_tick_through() {
        let mut engine = engine(BookType::L1Mbp);
        let quote = QuoteTick::new(inst_id(), dec!(99.99), dec!(100.01), dec!(5), dec!(5), 1);
        engine.process_data(&Data::Quote(quote)).unwrap();

        let events = engine.process_order(order("O-1", Side::Buy, OrderKind::Market, dec!(8)), 2);
        let fills: Vec<(Quantity, Price)> = events
            .iter()
            .filter_map(OrderEvent::as_fill)
            .map(|f| (f.last_qty, f.last_px))
            .collect();
        assert_eq!(fills, vec![(dec!(5), dec!(100.01)), (dec!(3), dec!(100.02))]);
        assert_eq!(engine.position().signed_qty, dec!(8));
    }

    #[test]
    fn l1_quote_through_resting_limit_fills_it() {
        let mut engine = engine(BookType::L1Mbp);
        let quote = QuoteTick::new(inst_id(), dec!(99.99), dec!(100.01), dec!(5), dec!(5), 1);
        engine.process_data(&Data::Quote(quote)).unwrap();
        engine.process_order(limit("O-1", Side::Buy, dec!(100), dec!(3)), 2);

        let quote = QuoteTick::new(inst_id(), dec!(99.98), dec!(99.99), dec!(5), dec!(5), 3);
        let events = engine.process_data(&Data::Quote(quote)).unwrap();
        assert_eq!(kinds(&events), vec!["FILLED"]);
        let fill = events[0].as_fill().unwrap();
        assert_eq!(fill.last_px, dec!(100));
        assert_eq!(fill.liquidity_side, LiquiditySide::Maker);
    }

    #[test]
    fn trailing_stop_follows_market() {
        let mut engine = engine(BookType::L1Mbp);
        let quote = QuoteTick::new(inst_id(), dec!(100), dec!(100.02), dec!(5), dec!(5), 1);
        engine.process_data(&Data::Quote(quote)).unwrap();

        let stop = order(
            "O-1",
            Side::Sell,
            OrderKind::TrailingStopMarket {
                trigger_price: None,
                trigger_type: TriggerType::BidAsk,
                trailing: Trailing::new(dec!(1), TrailingOffsetType::Price),
            },
            dec!(1),
        );
        let events = engine.process_order(stop, 2);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "UPDATED"]);
        assert_eq!(engine.order(&ClientOrderId::new("O-1")).unwrap().trigger_price(), Some(dec!(99)));

        let up = QuoteTick::new(inst_id(), dec!(101), dec!(101.02), dec!(5), dec!(5), 3);
        engine.process_data(&Data::Quote(up)).unwrap();
        assert_eq!(engine.order(&ClientOrderId::new("O-1")).unwrap().trigger_price(), Some(dec!(100)));

        let down = QuoteTick::new(inst_id(), dec!(99.5), dec!(99.52), dec!(5), dec!(5), 4);
        let events = engine.process_data(&Data::Quote(down)).unwrap();
        assert_eq!(kinds(&events), vec!["FILLED"]);
        assert_eq!(events[0].as_fill().unwrap().last_px, dec!(99.5));
    }

    #[test]
    fn out_of_order_data_is_dropped() {
        let mut engine = seeded_l2();
        assert!(engine.process_data(&add(Side::Buy, dec!(98), dec!(1), 2)).unwrap().is_empty());
        assert_eq!(engine.book().levels(Side::Buy, 5).len(), 2);
    }

    #[test]
    fn l1_trade_without_quotes_sets_top_of_book() {
        let mut engine = engine(BookType::L1Mbp);
        engine.process_data(&trade(dec!(100), 1)).unwrap();
        assert_eq!(engine.book().best_bid_price(), Some(dec!(99.99)));
        assert_eq!(engine.book().best_ask_price(), Some(dec!(100)));

        let events = engine.process_order(order("O-1", Side::Buy, OrderKind::Market, dec!(1)), 2);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED"]);
        assert_eq!(fills(&events), vec![("O-1", dec!(1), dec!(100))]);
    }

    #[test]
    fn l1_bar_without_bar_execution_moves_top_to_close() {
        let instrument = Arc::new(Instrument::new("AAPL.SIM", 2, 0).unwrap());
        let config = MatchingEngineConfig {
            bar_execution: false,
            ..Default::default()
        };
        let mut engine = OrderMatchingEngine::new(instrument, config).with_fee_model(FeeModel::Zero);
        engine.process_order(limit("O-1", Side::Buy, dec!(99.5), dec!(3)), 1);

        let bar = Bar {
            instrument_id: inst_id(),
            open: dec!(100),
            high: dec!(102),
            low: dec!(99),
            close: dec!(101),
            volume: dec!(40),
            ts_event: 2,
            ts_init: 2,
        };
        // the low is never walked, so the resting bid stays untouched
        assert!(engine.process_data(&Data::Bar(bar)).unwrap().is_empty());
        assert_eq!(engine.book().best_ask_price(), Some(dec!(101)));
        assert_eq!(engine.book().best_ask_size(), Some(dec!(10)));
        assert_eq!(engine.book().best_bid_price(), Some(dec!(100.99)));
        assert_eq!(engine.order(&ClientOrderId::new("O-1")).unwrap().leaves_qty, dec!(3));
    }

    #[test]
    fn touched_orders_fire_when_market_comes_to_them() {
        let mut engine = seeded_l2();
        let mit = order(
            "O-1",
            Side::Sell,
            OrderKind::MarketIfTouched {
                trigger_price: dec!(100.5),
                trigger_type: TriggerType::BidAsk,
            },
            dec!(2),
        );
        assert_eq!(kinds(&engine.process_order(mit, 10)), vec!["ACCEPTED"]);
        let events = engine.process_data(&add(Side::Buy, dec!(100.5), dec!(3), 11)).unwrap();
        assert_eq!(fills(&events), vec![("O-1", dec!(2), dec!(100.5))]);

        let mut engine = seeded_l2();
        let lit = order(
            "O-2",
            Side::Buy,
            OrderKind::LimitIfTouched {
                price: dec!(100.8),
                trigger_price: dec!(100.5),
                trigger_type: TriggerType::BidAsk,
                triggered: false,
            },
            dec!(2),
        );
        assert_eq!(kinds(&engine.process_order(lit, 10)), vec!["ACCEPTED"]);
        let events = engine.process_data(&add(Side::Sell, dec!(100.5), dec!(4), 11)).unwrap();
        assert_eq!(kinds(&events), vec!["TRIGGERED", "FILLED"]);
        assert_eq!(fills(&events), vec![("O-2", dec!(2), dec!(100.5))]);
    }

    #[test]
    fn stop_limit_takes_or_rests_once_triggered() {
        let mut engine = seeded_l2();
        let buy = order(
            "O-1",
            Side::Buy,
            OrderKind::StopLimit {
                price: dec!(101.5),
                trigger_price: dec!(101),
                trigger_type: TriggerType::LastPrice,
                triggered: false,
            },
            dec!(2),
        );
        assert_eq!(kinds(&engine.process_order(buy, 10)), vec!["ACCEPTED"]);
        let events = engine.process_data(&trade(dec!(101), 11)).unwrap();
        assert_eq!(kinds(&events), vec!["TRIGGERED", "FILLED"]);
        assert_eq!(fills(&events), vec![("O-1", dec!(2), dec!(101))]);

        let sell = order(
            "O-2",
            Side::Sell,
            OrderKind::StopLimit {
                price: dec!(100.5),
                trigger_price: dec!(100),
                trigger_type: TriggerType::LastPrice,
                triggered: false,
            },
            dec!(3),
        );
        assert_eq!(kinds(&engine.process_order(sell, 12)), vec!["ACCEPTED"]);
        assert_eq!(engine.book().own_count(), 0);

        let events = engine.process_data(&trade(dec!(100), 13)).unwrap();
        assert_eq!(kinds(&events), vec!["TRIGGERED"]);
        let id = ClientOrderId::new("O-2");
        assert_eq!(engine.order(&id).unwrap().status, OrderStatus::Triggered);
        assert_eq!(engine.book().own_order(&id), Some((Side::Sell, dec!(100.5), dec!(3))));
        assert_eq!(engine.book().best_ask_price(), Some(dec!(100.5)));
    }

    #[test]
    fn trailing_stop_limit_trails_both_prices_then_takes() {
        let mut engine = engine(BookType::L1Mbp);
        let quote = QuoteTick::new(inst_id(), dec!(100), dec!(100.02), dec!(5), dec!(5), 1);
        engine.process_data(&Data::Quote(quote)).unwrap();

        let stop = order(
            "O-1",
            Side::Sell,
            OrderKind::TrailingStopLimit {
                price: None,
                trigger_price: None,
                trigger_type: TriggerType::BidAsk,
                limit_offset: dec!(1.5),
                trailing: Trailing::new(dec!(1), TrailingOffsetType::Price),
                triggered: false,
            },
            dec!(1),
        );
        assert_eq!(kinds(&engine.process_order(stop, 2)), vec!["ACCEPTED", "UPDATED"]);
        let id = ClientOrderId::new("O-1");
        assert_eq!(engine.order(&id).unwrap().trigger_price(), Some(dec!(99)));
        assert_eq!(engine.order(&id).unwrap().price(), Some(dec!(98.5)));

        let up = QuoteTick::new(inst_id(), dec!(101), dec!(101.02), dec!(5), dec!(5), 3);
        assert_eq!(kinds(&engine.process_data(&Data::Quote(up)).unwrap()), vec!["UPDATED"]);
        assert_eq!(engine.order(&id).unwrap().trigger_price(), Some(dec!(100)));
        assert_eq!(engine.order(&id).unwrap().price(), Some(dec!(99.5)));

        // through the trigger but still above the limit: takes the bid
        let down = QuoteTick::new(inst_id(), dec!(99.9), dec!(99.92), dec!(5), dec!(5), 4);
        let events = engine.process_data(&Data::Quote(down)).unwrap();
        assert_eq!(kinds(&events), vec!["TRIGGERED", "FILLED"]);
        assert_eq!(fills(&events), vec![("O-1", dec!(1), dec!(99.9))]);
    }

    #[test]
    fn mark_price_stop_ignores_trades() {
        let mut engine = seeded_l2();
        let stop = order(
            "O-1",
            Side::Buy,
            OrderKind::StopMarket {
                trigger_price: dec!(100.5),
                trigger_type: TriggerType::MarkPrice,
            },
            dec!(2),
        );
        assert_eq!(kinds(&engine.process_order(stop, 10)), vec!["ACCEPTED"]);
        assert!(engine.process_data(&trade(dec!(102), 11)).unwrap().is_empty());

        let mark = |value, ts| {
            Data::MarkPrice(MarkPriceUpdate {
                instrument_id: inst_id(),
                value,
                ts_event: ts,
                ts_init: ts,
            })
        };
        assert!(engine.process_data(&mark(dec!(100.4), 12)).unwrap().is_empty());
        let events = engine.process_data(&mark(dec!(100.6), 13)).unwrap();
        assert_eq!(fills(&events), vec![("O-1", dec!(2), dec!(101))]);
    }

    #[test]
    fn day_order_expires_at_next_midnight() {
        let mut engine = seeded_l2();
        let day = limit("O-1", Side::Buy, dec!(99.5), dec!(1)).with_time_in_force(TimeInForce::Day);
        assert_eq!(kinds(&engine.process_order(day, 10)), vec!["ACCEPTED"]);
        let id = ClientOrderId::new("O-1");
        assert_eq!(engine.order(&id).unwrap().expire_time, Some(NANOS_PER_DAY));

        assert!(engine.iterate(NANOS_PER_DAY - 1).is_empty());
        let events = engine.iterate(NANOS_PER_DAY);
        assert_eq!(kinds(&events), vec!["EXPIRED"]);
        assert_eq!(engine.order(&id).unwrap().status, OrderStatus::Expired);
        assert_eq!(engine.book().own_count(), 0);
    }

    #[test]
    fn cancel_all_and_batch_cancel_close_open_orders() {
        let mut engine = seeded_l2();
        engine.process_order(limit("O-1", Side::Buy, dec!(99.5), dec!(1)), 10);
        engine.process_order(limit("O-2", Side::Buy, dec!(98), dec!(1)), 10);
        engine.process_order(limit("O-3", Side::Sell, dec!(102), dec!(1)), 10);

        let events = engine.cancel_all(Some(Side::Buy), 11);
        let canceled: Vec<&str> = events.iter().map(|e| e.client_order_id().as_str()).collect();
        assert_eq!(kinds(&events), vec!["CANCELED", "CANCELED"]);
        assert_eq!(canceled, vec!["O-1", "O-2"]);
        assert_eq!(engine.book().own_count(), 1);

        assert_eq!(kinds(&engine.cancel_all(None, 12)), vec!["CANCELED"]);
        assert_eq!(engine.book().own_count(), 0);
        assert!(engine.cancel_all(None, 13).is_empty());

        engine.process_order(limit("O-4", Side::Buy, dec!(99), dec!(1)), 14);
        engine.process_order(limit("O-5", Side::Sell, dec!(103), dec!(1)), 14);
        let batch = [cancel("O-4", 15), cancel("O-5", 15), cancel("O-4", 15), cancel("O-9", 15)];
        let events = engine.batch_cancel(&batch, 15);
        assert_eq!(
            kinds(&events),
            vec!["CANCELED", "CANCELED", "CANCEL_REJECTED", "CANCEL_REJECTED"]
        );
        assert_eq!(engine.book().best_bid_price(), Some(dec!(100)));
        assert_eq!(engine.book().best_ask_price(), Some(dec!(101)));
    }

    #[test]
    fn stops_in_market_trigger_at_once_when_not_rejected() {
        let instrument = Arc::new(Instrument::new("AAPL.SIM", 2, 0).unwrap());
        let config = MatchingEngineConfig {
            book_type: BookType::L2Mbp,
            reject_stop_orders: false,
            ..Default::default()
        };
        let mut engine = seed(OrderMatchingEngine::new(instrument, config).with_fee_model(FeeModel::Zero));

        let stop = order(
            "O-1",
            Side::Buy,
            OrderKind::StopMarket {
                trigger_price: dec!(100.5),
                trigger_type: TriggerType::BidAsk,
            },
            dec!(2),
        );
        let events = engine.process_order(stop, 10);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED"]);
        assert_eq!(fills(&events), vec![("O-1", dec!(2), dec!(101))]);

        let stop_limit = order(
            "O-2",
            Side::Buy,
            OrderKind::StopLimit {
                price: dec!(102),
                trigger_price: dec!(100.5),
                trigger_type: TriggerType::BidAsk,
                triggered: false,
            },
            dec!(2),
        );
        let events = engine.process_order(stop_limit, 11);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "TRIGGERED", "FILLED"]);
        assert_eq!(fills(&events), vec![("O-2", dec!(2), dec!(101))]);
    }

    #[test]
    fn resting_reduce_only_orders_shrink_with_the_position() {
        let mut engine = seeded_l2();
        engine.process_order(limit("O-1", Side::Buy, dec!(101), dec!(8)), 10);
        let sell = limit("O-2", Side::Sell, dec!(102), dec!(5)).with_reduce_only(true);
        assert_eq!(kinds(&engine.process_order(sell, 11)), vec!["ACCEPTED"]);

        // larger than the position: clamped on arrival
        let sell = limit("O-3", Side::Sell, dec!(103), dec!(9)).with_reduce_only(true);
        let events = engine.process_order(sell, 12);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "UPDATED"]);
        let o3 = ClientOrderId::new("O-3");
        assert_eq!(engine.order(&o3).unwrap().quantity, dec!(8));

        let events = engine.process_order(order("O-4", Side::Sell, OrderKind::Market, dec!(6)), 13);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED", "UPDATED", "UPDATED"]);
        assert_eq!(engine.position().signed_qty, dec!(2));
        let o2 = ClientOrderId::new("O-2");
        assert_eq!(engine.book().own_order(&o2), Some((Side::Sell, dec!(102), dec!(2))));
        assert_eq!(engine.book().own_order(&o3), Some((Side::Sell, dec!(103), dec!(2))));

        let events = engine.process_order(order("O-5", Side::Sell, OrderKind::Market, dec!(2)), 14);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "FILLED", "CANCELED", "CANCELED"]);
        assert!(engine.position().is_flat());
        assert_eq!(engine.book().own_count(), 0);
    }

    #[test]
    fn reduce_only_fok_is_clamped_before_depth_check() {
        let mut engine = seeded_l2();
        engine.process_order(limit("O-1", Side::Buy, dec!(101), dec!(8)), 10);

        // 10 bid at 100 cannot fill 20, but can fill the 8 held
        let fok = limit("O-2", Side::Sell, dec!(100), dec!(20))
            .with_time_in_force(TimeInForce::Fok)
            .with_reduce_only(true);
        let events = engine.process_order(fok, 11);
        assert_eq!(kinds(&events), vec!["ACCEPTED", "UPDATED", "FILLED"]);
        assert_eq!(fills(&events), vec![("O-2", dec!(8), dec!(100))]);
        assert!(engine.position().is_flat());
    }

    #[test]
    fn rejected_order_id_cannot_be_reused() {
        let mut engine = seeded_l2();
        let crossing = limit("O-1", Side::Buy, dec!(101), dec!(1)).with_post_only(true);
        assert_eq!(kinds(&engine.process_order(crossing, 10)), vec!["REJECTED"]);
        let id = ClientOrderId::new("O-1");
        assert_eq!(engine.order(&id).unwrap().status, OrderStatus::Rejected);

        let events = engine.process_order(limit("O-1", Side::Buy, dec!(99), dec!(1)), 11);
        match &events[..] {
            [OrderEvent::Rejected(e)] => assert_eq!(e.reason, "duplicate client order id O-1"),
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(engine.book().own_count(), 0);
        assert_eq!(engine.order(&id).unwrap().ts_last, 10);
        assert_eq!(kinds(&engine.process_cancel(&cancel("O-1", 12), 12)), vec!["CANCEL_REJECTED"]);
    }

    #[test]
    fn bar_path_skips_prices_inside_last() {
        let bar = Bar {
            instrument_id: inst_id(),
            open: dec!(100),
            high: dec!(102),
            low: dec!(99),
            close: dec!(101),
            volume: dec!(40),
            ts_event: 0,
            ts_init: 0,
        };
        assert_eq!(bar_path(&bar, None), vec![dec!(100), dec!(102), dec!(99), dec!(101)]);
        assert_eq!(bar_path(&bar, Some(dec!(103))), vec![dec!(99), dec!(101)]);
    }
}
