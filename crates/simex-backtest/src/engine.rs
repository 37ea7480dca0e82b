//! Backtest event loop.
//!
//! The engine owns the venue, the clock, the data iterator and the
//! strategies, and advances all of them strictly in timestamp order:
//!
//! 1. pop the next data event
//! 2. fire timers due up to its `ts_init`
//! 3. hand the data to the venue and deliver the resulting events
//! 4. call `on_data` on every strategy
//! 5. send queued commands to the venue, repeating while callbacks queue more

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use simex_core::{
    AccountState, ClientOrderId, Data, FillReport, Instrument, Order, OrderEvent, OrderLedger,
    OrderStatusReport, PositionStatusReport, Quantity, SimulatedVenue, SubmitOrder, TradingCommand,
    UnixNanos, VenueConfig, VenueError,
};
use simex_protocol::{parse_records, Record};
use tracing::{debug, info, trace, warn};

use crate::algorithm::{ExecAlgorithmSummary, TwapAlgorithm};
use crate::clock::TestClock;
use crate::config::BacktestConfig;
use crate::data_iterator::DataIterator;
use crate::strategy::{ScriptedStrategy, Strategy, StrategyContext};

/// Upper bound on command/event feedback rounds per timestamp.
pub const MAX_COMMAND_ROUNDS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub seed: u64,
    pub data_events: u64,
    /// Execution events by kind (`"FILLED"`, `"CANCELED"`, ...).
    pub event_counts: BTreeMap<String, u64>,
    pub fills: Vec<FillReport>,
    pub orders: Vec<OrderStatusReport>,
    pub positions: Vec<PositionStatusReport>,
    pub account: AccountState,
    pub exec_algorithms: Vec<ExecAlgorithmSummary>,
}

impl BacktestResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub struct BacktestEngine {
    seed: u64,
    venue: SimulatedVenue,
    clock: TestClock,
    data: DataIterator,
    strategies: Vec<Box<dyn Strategy>>,
    ledger: OrderLedger,
    twap: TwapAlgorithm,
    // client order id -> index into `strategies`
    owners: HashMap<ClientOrderId, usize>,
    queue: VecDeque<(Option<usize>, TradingCommand)>,
    event_counts: BTreeMap<String, u64>,
    completed_primaries: HashSet<ClientOrderId>,
    end_time: Option<UnixNanos>,
}

impl BacktestEngine {
    pub fn new(venue_config: VenueConfig) -> Self {
        BacktestEngine {
            seed: venue_config.seed,
            venue: SimulatedVenue::new(venue_config),
            clock: TestClock::new(),
            data: DataIterator::new(),
            strategies: Vec::new(),
            ledger: OrderLedger::new(),
            twap: TwapAlgorithm::new(),
            owners: HashMap::new(),
            queue: VecDeque::new(),
            event_counts: BTreeMap::new(),
            completed_primaries: HashSet::new(),
            end_time: None,
        }
    }

    /// Build a ready-to-run engine from a config, reading every data and
    /// command file it names. `seed` replaces the venue seed.
    pub fn from_config(config: &BacktestConfig, seed: u64) -> anyhow::Result<Self> {
        let mut venue_config = config.venue.clone();
        venue_config.seed = seed;
        let mut engine = BacktestEngine::new(venue_config);
        engine.set_end_time(config.end_time);

        let registry = config.build_instruments()?;
        for id in registry.ids() {
            if let Some(instrument) = registry.get(id) {
                engine.venue.add_instrument(instrument)?;
            }
        }

        for file in &config.data {
            let path = config.resolve(&file.path);
            let mut data = Vec::new();
            for record in load_records(&path)? {
                match record {
                    Record::Data(d) => data.push(d),
                    Record::Command(_) => {
                        warn!(file = %path.display(), "ignoring command record in data file")
                    }
                }
            }
            engine.add_data(file.name.clone(), data);
        }

        for script in &config.strategies {
            let path = config.resolve(&script.commands);
            let mut commands = Vec::new();
            for record in load_records(&path)? {
                match record {
                    Record::Command(c) => commands.push(c),
                    Record::Data(_) => {
                        warn!(file = %path.display(), "ignoring data record in command file")
                    }
                }
            }
            engine.add_strategy(Box::new(ScriptedStrategy::new(script.strategy_id.clone(), commands)));
        }

        Ok(engine)
    }

    pub fn add_instrument(&mut self, instrument: Instrument) -> Result<(), VenueError> {
        self.venue.add_instrument(Arc::new(instrument))
    }

    pub fn add_data(&mut self, name: impl Into<String>, data: Vec<Data>) {
        self.data.add_stream(name, data);
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    pub fn set_end_time(&mut self, end_time: Option<UnixNanos>) {
        self.end_time = end_time;
    }

    pub fn venue(&self) -> &SimulatedVenue {
        &self.venue
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn clock(&self) -> &TestClock {
        &self.clock
    }

    pub fn run(&mut self) -> anyhow::Result<BacktestResult> {
        let start = self.data.peek_ts().unwrap_or(0);
        self.clock.advance_to(start);
        info!(
            seed = self.seed,
            start = %fmt_ts(start),
            events = self.data.remaining(),
            strategies = self.strategies.len(),
            "backtest starting"
        );

        self.dispatch(None, |s, ctx| s.on_start(ctx));
        self.drain_commands();

        while let Some(data) = self.data.next() {
            let ts = data.ts_init();
            self.fire_timers(ts);

            let events = self
                .venue
                .process(&data)
                .with_context(|| format!("{} data for {} at {ts}", data.kind(), data.instrument_id()))?;
            self.deliver(events);

            self.dispatch(None, |s, ctx| s.on_data(&data, ctx));
            self.drain_commands();
        }

        if let Some(end) = self.end_time {
            self.fire_timers(end);
        }
        self.dispatch(None, |s, ctx| s.on_stop(ctx));
        self.drain_commands();

        let result = self.result();
        info!(
            seed = self.seed,
            data_events = result.data_events,
            end = %fmt_ts(self.clock.now()),
            fills = result.fills.len(),
            balance = %result.account.balance,
            "backtest finished"
        );
        Ok(result)
    }

    fn result(&self) -> BacktestResult {
        let spawn = self.twap.spawn_index();
        let exec_algorithms = spawn
            .primaries()
            .map(|primary| {
                let children = spawn.children(primary).to_vec();
                let filled_qty: Quantity = children
                    .iter()
                    .filter_map(|c| self.ledger.get(c))
                    .map(|e| e.filled_qty)
                    .sum();
                ExecAlgorithmSummary {
                    primary_id: primary.clone(),
                    quantity: self.twap.primary(primary).map(|o| o.quantity).unwrap_or_default(),
                    children,
                    filled_qty,
                    complete: self.completed_primaries.contains(primary),
                }
            })
            .collect();

        BacktestResult {
            seed: self.seed,
            data_events: self.data.emitted(),
            event_counts: self.event_counts.clone(),
            fills: self.venue.generate_fill_reports(None, None),
            orders: self.venue.generate_order_status_reports(false, None, None),
            positions: self.venue.generate_position_status_reports(),
            account: self.venue.generate_account_state(self.clock.now()),
            exec_algorithms,
        }
    }

    /// Run `callback` on one strategy (or all when `target` is `None`) and
    /// queue whatever commands it produced.
    fn dispatch<F>(&mut self, target: Option<usize>, mut callback: F)
    where
        F: FnMut(&mut dyn Strategy, &mut StrategyContext<'_>),
    {
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            if target.is_some_and(|t| t != index) {
                continue;
            }
            let id = strategy.id().clone();
            let mut ctx = StrategyContext::new(&id, &self.venue, &self.ledger, &mut self.clock);
            callback(strategy.as_mut(), &mut ctx);
            for command in ctx.into_commands() {
                self.queue.push_back((Some(index), command));
            }
        }
    }

    /// Fire every timer due at or before `ts`, each at its own time.
    fn fire_timers(&mut self, ts: UnixNanos) {
        while let Some(at) = self.clock.next_event_time().filter(|at| *at <= ts) {
            for event in self.clock.advance_to(at) {
                trace!(timer = %event.name, ts = event.ts_event, "time event");
                let expired = self.venue.iterate(event.ts_event);
                self.deliver(expired);

                if self.twap.owns_timer(&event.name) {
                    if let Some(child) = self.twap.on_timer(&event.name, event.ts_event) {
                        let owner = child
                            .exec_spawn_id
                            .as_ref()
                            .and_then(|primary| self.owners.get(primary))
                            .copied();
                        self.submit_child(owner, child);
                    }
                } else {
                    self.dispatch(None, |s, ctx| s.on_time(&event, ctx));
                }
                self.drain_commands();
            }
        }
        self.clock.advance_to(ts);
    }

    fn drain_commands(&mut self) {
        let mut rounds = 0;
        while !self.queue.is_empty() {
            if rounds == MAX_COMMAND_ROUNDS {
                warn!(
                    pending = self.queue.len(),
                    ts = self.clock.now(),
                    "command feedback did not settle; deferring the rest"
                );
                return;
            }
            rounds += 1;
            let batch: Vec<_> = self.queue.drain(..).collect();
            for (owner, command) in batch {
                self.send_command(owner, command);
            }
        }
    }

    fn send_command(&mut self, owner: Option<usize>, command: TradingCommand) {
        let ts = self.clock.now();
        match command {
            TradingCommand::Submit(SubmitOrder {
                order,
                exec_algorithm: Some(params),
                ..
            }) => {
                let instrument = self
                    .venue
                    .engine(&order.instrument_id)
                    .map(|e| Arc::clone(e.instrument()));
                let Some(instrument) = instrument else {
                    // unknown instrument: the venue rejects it
                    self.submit_child(owner, order);
                    return;
                };
                if let Some(owner) = owner {
                    self.owners.insert(order.client_order_id.clone(), owner);
                }
                let primary_id = order.client_order_id.clone();
                match self.twap.start(order, params, &instrument, &mut self.clock, ts) {
                    Ok(child) => self.submit_child(owner, child),
                    Err(e) => warn!(primary = %primary_id, error = %e, "TWAP not started"),
                }
            }
            command => {
                if let (TradingCommand::Submit(submit), Some(owner)) = (&command, owner) {
                    self.owners.insert(submit.order.client_order_id.clone(), owner);
                }
                debug!(instrument = %command.instrument_id(), ts, "sending command");
                let events = self.venue.process_command(command, ts);
                self.deliver(events);
            }
        }
    }

    fn submit_child(&mut self, owner: Option<usize>, order: Order) {
        if let Some(owner) = owner {
            self.owners.insert(order.client_order_id.clone(), owner);
        }
        let ts = self.clock.now();
        let events = self.venue.submit_order(order, ts);
        self.deliver(events);
    }

    fn deliver(&mut self, events: Vec<OrderEvent>) {
        for event in events {
            let id = event.client_order_id().clone();
            trace!(kind = event.kind(), order = %id, ts = event.ts_event(), "execution event");
            *self.event_counts.entry(event.kind().to_string()).or_default() += 1;

            if !self.ledger.apply(&event) {
                debug!(kind = event.kind(), order = %id, "duplicate event ignored");
                continue;
            }
            if event.as_fill().is_some() {
                if let Some(order) = self.venue.order(&id) {
                    self.ledger.mark_filled_if_complete(&id, order.quantity);
                }
            }

            if let Some(owner) = self.owners.get(&id).copied() {
                self.dispatch(Some(owner), |s, ctx| s.on_event(&event, ctx));
            }
            self.check_primary(&id);
        }
    }

    fn check_primary(&mut self, child: &ClientOrderId) {
        let spawn = self.twap.spawn_index();
        let Some(primary) = spawn.primary_of(child) else {
            return;
        };
        if self.completed_primaries.contains(primary) {
            return;
        }
        let ledger = &self.ledger;
        let closed = |c: &ClientOrderId| ledger.get(c).is_some_and(|e| e.status.is_closed());
        if spawn.is_primary_terminal(primary, closed) {
            info!(primary = %primary, children = spawn.children(primary).len(), "TWAP complete");
            self.completed_primaries.insert(primary.clone());
        }
    }
}

/// Run one backtest for `seed`.
pub fn run_backtest(config: &BacktestConfig, seed: u64) -> anyhow::Result<BacktestResult> {
    BacktestEngine::from_config(config, seed)?.run()
}

fn fmt_ts(ts: UnixNanos) -> String {
    DateTime::from_timestamp_nanos(i64::try_from(ts).unwrap_or(i64::MAX)).to_rfc3339()
}

fn load_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_records(&text).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use simex_core::{
        BookAction, BookOrder, BookType, FeeModel, InstrumentId, MatchingEngineConfig,
        OrderBookDelta, OrderKind, Side, StrategyId, TwapParams,
    };

    fn inst() -> InstrumentId {
        InstrumentId::new("AAPL.SIM")
    }

    fn engine() -> BacktestEngine {
        let config = VenueConfig {
            book_type: BookType::L2Mbp,
            matching: MatchingEngineConfig {
                trade_execution: true,
                ..Default::default()
            },
            fee_model: FeeModel::Zero,
            ..Default::default()
        };
        let mut engine = BacktestEngine::new(config);
        engine
            .add_instrument(Instrument::new("AAPL.SIM", 2, 0).unwrap())
            .unwrap();
        engine
    }

    fn ask(price: rust_decimal::Decimal, size: Quantity, id: u64, ts: UnixNanos) -> Data {
        Data::Delta(OrderBookDelta::new(
            inst(),
            BookAction::Add,
            BookOrder::new(Side::Sell, price, size, id),
            id,
            ts,
        ))
    }

    /// Buys once on the first data event.
    struct OneShot {
        id: StrategyId,
        sent: bool,
        events: Vec<String>,
        data_seen: usize,
    }

    impl Strategy for OneShot {
        fn id(&self) -> &StrategyId {
            &self.id
        }

        fn on_data(&mut self, _data: &Data, ctx: &mut StrategyContext<'_>) {
            self.data_seen += 1;
            assert!(ctx.book(&inst()).is_some());
            if !self.sent {
                self.sent = true;
                ctx.submit(Order::new(
                    self.id.clone(),
                    inst(),
                    ClientOrderId::new("O-1"),
                    Side::Buy,
                    OrderKind::Market,
                    dec!(3),
                    ctx.now(),
                ));
            }
        }

        fn on_event(&mut self, event: &OrderEvent, _ctx: &mut StrategyContext<'_>) {
            self.events.push(event.kind().to_string());
        }
    }

    #[test]
    fn strategy_commands_reach_the_venue_after_data() {
        let mut engine = engine();
        engine.add_data("book", vec![ask(dec!(101), dec!(10), 1, 10), ask(dec!(102), dec!(10), 2, 20)]);
        engine.add_strategy(Box::new(OneShot {
            id: StrategyId::new("S-1"),
            sent: false,
            events: Vec::new(),
            data_seen: 0,
        }));

        let result = engine.run().unwrap();
        assert_eq!(result.data_events, 2);
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].last_px, dec!(101));
        assert_eq!(result.event_counts.get("SUBMITTED"), Some(&1));
        assert_eq!(result.event_counts.get("FILLED"), Some(&1));
        assert_eq!(engine.ledger().get(&ClientOrderId::new("O-1")).unwrap().filled_qty, dec!(3));
    }

    /// Submits one TWAP primary on the first data event.
    struct TwapBuyer {
        id: StrategyId,
        sent: bool,
    }

    impl Strategy for TwapBuyer {
        fn id(&self) -> &StrategyId {
            &self.id
        }

        fn on_data(&mut self, _data: &Data, ctx: &mut StrategyContext<'_>) {
            if self.sent {
                return;
            }
            self.sent = true;
            let order = Order::new(
                self.id.clone(),
                inst(),
                ClientOrderId::new("P-1"),
                Side::Buy,
                OrderKind::Market,
                dec!(9),
                ctx.now(),
            );
            ctx.submit_twap(
                order,
                TwapParams {
                    horizon_secs: 3,
                    interval_secs: 1,
                },
            );
        }
    }

    #[test]
    fn twap_children_fill_over_horizon_and_complete_primary() {
        use simex_core::identifiers::NANOS_PER_SEC;

        let mut engine = engine();
        engine.add_data(
            "book",
            vec![
                ask(dec!(101), dec!(100), 1, 0),
                ask(dec!(105), dec!(100), 2, 5 * NANOS_PER_SEC),
            ],
        );
        engine.add_strategy(Box::new(TwapBuyer {
            id: StrategyId::new("S-1"),
            sent: false,
        }));

        let result = engine.run().unwrap();
        let fill_times: Vec<UnixNanos> = result.fills.iter().map(|f| f.ts_event).collect();
        assert_eq!(fill_times, vec![0, NANOS_PER_SEC, 2 * NANOS_PER_SEC]);
        assert!(result.fills.iter().all(|f| f.last_qty == dec!(3)));

        let summary = &result.exec_algorithms[0];
        assert_eq!(summary.primary_id, ClientOrderId::new("P-1"));
        assert_eq!(summary.children.len(), 3);
        assert_eq!(summary.filled_qty, dec!(9));
        assert!(summary.complete);
    }

    #[test]
    fn result_serializes_to_json() {
        let mut engine = engine();
        engine.add_data("book", vec![ask(dec!(101), dec!(10), 1, 10)]);
        let result = engine.run().unwrap();
        let json = result.to_json().unwrap();
        let back: BacktestResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
