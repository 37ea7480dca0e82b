//! TWAP execution algorithm.
//!
//! A primary order never reaches the venue. It is split into equal MARKET
//! children spread evenly over the horizon: the first child goes out on
//! submit, the rest on a clock timer. [`SpawnIndex`] keeps the
//! primary -> children relation.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use simex_core::identifiers::NANOS_PER_SEC;
use simex_core::{ClientOrderId, Instrument, Order, OrderKind, Quantity, TwapParams, UnixNanos};
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::{ClockError, TestClock};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlgorithmError {
    #[error("primary order {0} is already being executed")]
    DuplicatePrimary(ClientOrderId),

    #[error(transparent)]
    Clock(#[from] ClockError),
}

/// Child quantities for one primary.
///
/// `floor(horizon / interval)` slices of `floor(qty / slices)` (on the size
/// grid), with the remainder on the last slice. A slice below the size
/// increment or the instrument minimum sends everything as one child.
pub fn twap_slices(quantity: Quantity, params: &TwapParams, instrument: &Instrument) -> Vec<Quantity> {
    let count = if params.interval_secs == 0 {
        0
    } else {
        params.horizon_secs / params.interval_secs
    };
    if count <= 1 {
        return vec![quantity];
    }

    let each = instrument.floor_quantity(quantity / Decimal::from(count));
    let below_min = instrument.min_quantity.is_some_and(|min| each < min);
    if each < instrument.size_increment || below_min {
        return vec![quantity];
    }

    let mut slices = vec![each; count as usize];
    let remainder = quantity - each * Decimal::from(count);
    if let Some(last) = slices.last_mut() {
        *last += remainder;
    }
    slices
}

/// Primary -> children, plus whether the primary has spawned everything.
#[derive(Debug, Clone, Default)]
pub struct SpawnIndex {
    children: BTreeMap<ClientOrderId, Vec<ClientOrderId>>,
    primary_of: HashMap<ClientOrderId, ClientOrderId>,
    scheduled: HashSet<ClientOrderId>,
}

impl SpawnIndex {
    pub fn register_primary(&mut self, primary: ClientOrderId) {
        self.children.entry(primary).or_default();
    }

    pub fn add_child(&mut self, primary: &ClientOrderId, child: ClientOrderId) {
        self.primary_of.insert(child.clone(), primary.clone());
        self.children.entry(primary.clone()).or_default().push(child);
    }

    pub fn mark_fully_scheduled(&mut self, primary: &ClientOrderId) {
        self.scheduled.insert(primary.clone());
    }

    pub fn is_fully_scheduled(&self, primary: &ClientOrderId) -> bool {
        self.scheduled.contains(primary)
    }

    pub fn primary_of(&self, child: &ClientOrderId) -> Option<&ClientOrderId> {
        self.primary_of.get(child)
    }

    pub fn children(&self, primary: &ClientOrderId) -> &[ClientOrderId] {
        self.children.get(primary).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn primaries(&self) -> impl Iterator<Item = &ClientOrderId> {
        self.children.keys()
    }

    /// A primary is terminal once it is fully scheduled and every child is.
    pub fn is_primary_terminal<F>(&self, primary: &ClientOrderId, child_closed: F) -> bool
    where
        F: Fn(&ClientOrderId) -> bool,
    {
        self.is_fully_scheduled(primary) && self.children(primary).iter().all(child_closed)
    }
}

/// Per-primary execution summary for backtest output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecAlgorithmSummary {
    pub primary_id: ClientOrderId,
    pub quantity: Quantity,
    pub children: Vec<ClientOrderId>,
    pub filled_qty: Quantity,
    pub complete: bool,
}

struct Schedule {
    primary: Order,
    pending: VecDeque<Quantity>,
    next_seq: u32,
}

#[derive(Default)]
pub struct TwapAlgorithm {
    schedules: BTreeMap<ClientOrderId, Schedule>,
    timers: HashMap<String, ClientOrderId>,
    spawn: SpawnIndex,
}

impl TwapAlgorithm {
    pub fn new() -> Self {
        TwapAlgorithm::default()
    }

    pub fn spawn_index(&self) -> &SpawnIndex {
        &self.spawn
    }

    pub fn primary(&self, id: &ClientOrderId) -> Option<&Order> {
        self.schedules.get(id).map(|s| &s.primary)
    }

    pub fn owns_timer(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    /// Start executing `primary`; returns the first child to send now.
    pub fn start(
        &mut self,
        primary: Order,
        params: TwapParams,
        instrument: &Instrument,
        clock: &mut TestClock,
        ts: UnixNanos,
    ) -> Result<Order, AlgorithmError> {
        let primary_id = primary.client_order_id.clone();
        if self.schedules.contains_key(&primary_id) {
            return Err(AlgorithmError::DuplicatePrimary(primary_id));
        }

        let slices = twap_slices(primary.quantity, &params, instrument);
        info!(
            primary = %primary_id,
            quantity = %primary.quantity,
            slices = slices.len(),
            "starting TWAP"
        );

        let later = slices.len() as u64 - 1;
        if later > 0 {
            let interval = params.interval_secs * NANOS_PER_SEC;
            let timer = format!("TWAP-{primary_id}");
            clock.set_timer(timer.clone(), interval, ts, Some(ts + later * interval))?;
            self.timers.insert(timer, primary_id.clone());
        }

        let mut pending: VecDeque<Quantity> = slices.into();
        let first = pending.pop_front().unwrap_or(primary.quantity);
        self.spawn.register_primary(primary_id.clone());
        let mut schedule = Schedule {
            primary,
            pending,
            next_seq: 1,
        };
        let child = self.spawn_child(&mut schedule, first, ts);
        if schedule.pending.is_empty() {
            self.spawn.mark_fully_scheduled(&primary_id);
        }
        self.schedules.insert(primary_id, schedule);
        Ok(child)
    }

    /// Next child for the primary behind timer `name`, if any remain.
    pub fn on_timer(&mut self, name: &str, ts: UnixNanos) -> Option<Order> {
        let primary_id = self.timers.get(name)?.clone();
        let mut schedule = self.schedules.remove(&primary_id)?;

        let child = schedule
            .pending
            .pop_front()
            .map(|qty| self.spawn_child(&mut schedule, qty, ts));
        if schedule.pending.is_empty() {
            self.spawn.mark_fully_scheduled(&primary_id);
            self.timers.remove(name);
        }
        self.schedules.insert(primary_id, schedule);
        child
    }

    fn spawn_child(&mut self, schedule: &mut Schedule, quantity: Quantity, ts: UnixNanos) -> Order {
        let primary = &schedule.primary;
        let child_id = ClientOrderId::new(format!("{}-E{}", primary.client_order_id, schedule.next_seq));
        schedule.next_seq += 1;
        debug!(primary = %primary.client_order_id, child = %child_id, %quantity, "spawned child");

        self.spawn.add_child(&primary.client_order_id, child_id.clone());
        Order::new(
            primary.strategy_id.clone(),
            primary.instrument_id.clone(),
            child_id,
            primary.side,
            OrderKind::Market,
            quantity,
            ts,
        )
        .with_reduce_only(primary.reduce_only)
        .with_exec_spawn_id(primary.client_order_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use simex_core::{InstrumentId, Side, StrategyId};

    fn instrument() -> Instrument {
        Instrument::new("AAPL.SIM", 2, 0).unwrap()
    }

    fn primary(qty: Quantity) -> Order {
        Order::new(
            StrategyId::new("S-1"),
            InstrumentId::new("AAPL.SIM"),
            ClientOrderId::new("P-1"),
            Side::Buy,
            OrderKind::Market,
            qty,
            0,
        )
    }

    #[test]
    fn slices_put_remainder_on_last_child() {
        let params = TwapParams {
            horizon_secs: 60,
            interval_secs: 20,
        };
        assert_eq!(twap_slices(dec!(10), &params, &instrument()), vec![dec!(3), dec!(3), dec!(4)]);
    }

    #[test]
    fn slices_below_increment_or_minimum_send_everything_once() {
        let params = TwapParams {
            horizon_secs: 100,
            interval_secs: 10,
        };
        assert_eq!(twap_slices(dec!(5), &params, &instrument()), vec![dec!(5)]);

        let with_min = instrument().with_quantity_limits(Some(dec!(4)), None);
        assert_eq!(twap_slices(dec!(30), &params, &with_min), vec![dec!(30)]);

        let zero_interval = TwapParams {
            horizon_secs: 60,
            interval_secs: 0,
        };
        assert_eq!(twap_slices(dec!(30), &zero_interval, &instrument()), vec![dec!(30)]);
    }

    #[test]
    fn children_follow_timer_until_fully_scheduled() {
        let mut twap = TwapAlgorithm::new();
        let mut clock = TestClock::new();
        let params = TwapParams {
            horizon_secs: 3,
            interval_secs: 1,
        };

        let first = twap.start(primary(dec!(9)), params, &instrument(), &mut clock, 0).unwrap();
        assert_eq!(first.client_order_id, ClientOrderId::new("P-1-E1"));
        assert_eq!(first.exec_spawn_id, Some(ClientOrderId::new("P-1")));
        assert_eq!(first.quantity, dec!(3));

        let mut later = Vec::new();
        for event in clock.advance_to(10 * NANOS_PER_SEC) {
            assert!(twap.owns_timer(&event.name));
            later.extend(twap.on_timer(&event.name, event.ts_event));
        }
        let ids: Vec<String> = later.iter().map(|o| o.client_order_id.to_string()).collect();
        assert_eq!(ids, vec!["P-1-E2", "P-1-E3"]);
        assert_eq!(later[1].ts_init, 2 * NANOS_PER_SEC);

        let primary_id = ClientOrderId::new("P-1");
        let spawn = twap.spawn_index();
        assert!(spawn.is_fully_scheduled(&primary_id));
        assert_eq!(spawn.children(&primary_id).len(), 3);
        assert_eq!(spawn.primary_of(&ClientOrderId::new("P-1-E2")), Some(&primary_id));
    }

    #[test]
    fn primary_terminal_only_when_scheduled_and_children_closed() {
        let mut spawn = SpawnIndex::default();
        let p = ClientOrderId::new("P");
        spawn.register_primary(p.clone());
        spawn.add_child(&p, ClientOrderId::new("P-E1"));

        assert!(!spawn.is_primary_terminal(&p, |_| true));
        spawn.mark_fully_scheduled(&p);
        assert!(!spawn.is_primary_terminal(&p, |_| false));
        assert!(spawn.is_primary_terminal(&p, |_| true));
    }

    #[test]
    fn duplicate_primary_is_rejected() {
        let mut twap = TwapAlgorithm::new();
        let mut clock = TestClock::new();
        let params = TwapParams {
            horizon_secs: 2,
            interval_secs: 1,
        };
        twap.start(primary(dec!(4)), params, &instrument(), &mut clock, 0).unwrap();
        assert!(matches!(
            twap.start(primary(dec!(4)), params, &instrument(), &mut clock, 0),
            Err(AlgorithmError::DuplicatePrimary(_))
        ));
    }
}
