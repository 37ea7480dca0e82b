//! Strategy API for backtests.
//!
//! Strategies see the venue through [`StrategyContext`]: read-only books,
//! their order ledger and the clock. Anything that changes venue state is
//! queued as a [`TradingCommand`] and sent by the engine after the callback
//! returns.

use std::collections::VecDeque;

use simex_core::{
    CancelAllOrders, ClientOrderId, Data, Instrument, InstrumentId, LedgerEntry, ModifyOrder, Order,
    OrderBook, OrderEvent, OrderLedger, Price, Quantity, Side, SimulatedVenue, StrategyId,
    SubmitOrder, TradingCommand, TwapParams, UnixNanos,
};
use tracing::{debug, warn};

use crate::clock::{ClockError, TestClock, TimeEvent};

pub struct StrategyContext<'a> {
    now: UnixNanos,
    strategy_id: &'a StrategyId,
    venue: &'a SimulatedVenue,
    ledger: &'a OrderLedger,
    clock: &'a mut TestClock,
    commands: Vec<TradingCommand>,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(
        strategy_id: &'a StrategyId,
        venue: &'a SimulatedVenue,
        ledger: &'a OrderLedger,
        clock: &'a mut TestClock,
    ) -> Self {
        StrategyContext {
            now: clock.now(),
            strategy_id,
            venue,
            ledger,
            clock,
            commands: Vec::new(),
        }
    }

    pub(crate) fn into_commands(self) -> Vec<TradingCommand> {
        self.commands
    }

    pub fn now(&self) -> UnixNanos {
        self.now
    }

    pub fn strategy_id(&self) -> &StrategyId {
        self.strategy_id
    }

    pub fn book(&self, instrument_id: &InstrumentId) -> Option<&OrderBook> {
        self.venue.book(instrument_id)
    }

    pub fn instrument(&self, instrument_id: &InstrumentId) -> Option<&Instrument> {
        self.venue.engine(instrument_id).map(|e| e.instrument().as_ref())
    }

    pub fn order(&self, client_order_id: &ClientOrderId) -> Option<&LedgerEntry> {
        self.ledger.get(client_order_id)
    }

    pub fn set_timer(
        &mut self,
        name: impl Into<String>,
        interval: UnixNanos,
        stop: Option<UnixNanos>,
    ) -> Result<(), ClockError> {
        self.clock.set_timer(name, interval, self.now, stop)
    }

    pub fn set_time_alert(&mut self, name: impl Into<String>, at: UnixNanos) -> Result<(), ClockError> {
        self.clock.set_time_alert(name, at)
    }

    pub fn submit(&mut self, order: Order) {
        self.commands.push(TradingCommand::submit(order, self.now));
    }

    pub fn submit_twap(&mut self, order: Order, params: TwapParams) {
        self.commands.push(TradingCommand::Submit(SubmitOrder {
            order,
            exec_algorithm: Some(params),
            ts_init: self.now,
        }));
    }

    pub fn modify(
        &mut self,
        instrument_id: InstrumentId,
        client_order_id: ClientOrderId,
        quantity: Option<Quantity>,
        price: Option<Price>,
        trigger_price: Option<Price>,
    ) {
        self.commands.push(TradingCommand::Modify(ModifyOrder {
            instrument_id,
            client_order_id,
            quantity,
            price,
            trigger_price,
            ts_init: self.now,
        }));
    }

    pub fn cancel(&mut self, instrument_id: InstrumentId, client_order_id: ClientOrderId) {
        self.commands
            .push(TradingCommand::cancel(instrument_id, client_order_id, self.now));
    }

    pub fn cancel_all(&mut self, instrument_id: InstrumentId, order_side: Option<Side>) {
        self.commands.push(TradingCommand::CancelAll(CancelAllOrders {
            instrument_id,
            order_side,
            ts_init: self.now,
        }));
    }

    /// Queue an already built command unchanged.
    pub fn send(&mut self, command: TradingCommand) {
        self.commands.push(command);
    }
}

/// Callbacks driven by the backtest engine. Every method defaults to a
/// no-op.
pub trait Strategy: Send {
    fn id(&self) -> &StrategyId;

    fn on_start(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn on_data(&mut self, _data: &Data, _ctx: &mut StrategyContext<'_>) {}

    /// Execution events for this strategy's own orders.
    fn on_event(&mut self, _event: &OrderEvent, _ctx: &mut StrategyContext<'_>) {}

    fn on_time(&mut self, _event: &TimeEvent, _ctx: &mut StrategyContext<'_>) {}

    fn on_stop(&mut self, _ctx: &mut StrategyContext<'_>) {}
}

/// Replays a fixed list of commands, each at its own `ts_init`.
pub struct ScriptedStrategy {
    id: StrategyId,
    commands: VecDeque<TradingCommand>,
    events: Vec<OrderEvent>,
}

impl ScriptedStrategy {
    pub fn new(id: StrategyId, mut commands: Vec<TradingCommand>) -> Self {
        commands.sort_by_key(TradingCommand::ts_init);
        ScriptedStrategy {
            id,
            commands: commands.into(),
            events: Vec::new(),
        }
    }

    /// Events received so far, in delivery order.
    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    pub fn remaining(&self) -> usize {
        self.commands.len()
    }

    fn alert_name(&self, ts: UnixNanos) -> String {
        format!("{}-{ts}", self.id)
    }

    fn release_due(&mut self, ctx: &mut StrategyContext<'_>) {
        while self
            .commands
            .front()
            .is_some_and(|c| c.ts_init() <= ctx.now())
        {
            if let Some(command) = self.commands.pop_front() {
                ctx.send(command);
            }
        }
    }
}

impl Strategy for ScriptedStrategy {
    fn id(&self) -> &StrategyId {
        &self.id
    }

    fn on_start(&mut self, ctx: &mut StrategyContext<'_>) {
        let mut alerts: Vec<UnixNanos> = self
            .commands
            .iter()
            .map(TradingCommand::ts_init)
            .filter(|ts| *ts > ctx.now())
            .collect();
        alerts.dedup();
        // commands at or before the start go out immediately
        self.release_due(ctx);
        for ts in alerts {
            if let Err(e) = ctx.set_time_alert(self.alert_name(ts), ts) {
                warn!(strategy = %self.id, error = %e, "could not schedule command");
            }
        }
        debug!(strategy = %self.id, pending = self.commands.len(), "scripted strategy started");
    }

    fn on_event(&mut self, event: &OrderEvent, _ctx: &mut StrategyContext<'_>) {
        self.events.push(event.clone());
    }

    fn on_time(&mut self, event: &TimeEvent, ctx: &mut StrategyContext<'_>) {
        if event.name.starts_with(self.id.as_str()) {
            self.release_due(ctx);
        }
    }

    fn on_stop(&mut self, _ctx: &mut StrategyContext<'_>) {
        if !self.commands.is_empty() {
            warn!(
                strategy = %self.id,
                unsent = self.commands.len(),
                "commands scheduled after the end of the run were not sent"
            );
        }
    }
}
