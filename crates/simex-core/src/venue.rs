//! Simulated venue: one matching engine per instrument.
//!
//! The venue routes commands and market data by instrument id, emits
//! `OrderSubmitted` ahead of every routed submit, and summarizes the
//! account from its engines' fills and positions.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::data::Data;
use crate::enums::{BookType, OrderStatus};
use crate::error::{BookError, VenueError};
use crate::fee_model::FeeModel;
use crate::fill_model::{FillModel, FillModelConfig, DEFAULT_SEED};
use crate::identifiers::{AccountId, ClientOrderId, InstrumentId, UnixNanos};
use crate::instrument::Instrument;
use crate::matching_engine::{MatchingEngineConfig, OrderMatchingEngine};
use crate::messages::{OrderEvent, TradingCommand};
use crate::order::Order;
use crate::order_book::OrderBook;
use crate::reports::{FillReport, OrderStatusReport, PositionStatusReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    pub name: String,
    pub account_id: AccountId,
    pub base_currency: String,
    pub starting_balance: Decimal,
    /// Book type for every engine; overrides `matching.book_type`.
    pub book_type: BookType,
    pub matching: MatchingEngineConfig,
    pub fill_model: FillModelConfig,
    pub fee_model: FeeModel,
    pub seed: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        VenueConfig {
            name: "SIM".to_string(),
            account_id: AccountId::new("SIM-001"),
            base_currency: "USD".to_string(),
            starting_balance: Decimal::from(1_000_000),
            book_type: BookType::L1Mbp,
            matching: MatchingEngineConfig::default(),
            fill_model: FillModelConfig::default(),
            fee_model: FeeModel::default(),
            seed: DEFAULT_SEED,
        }
    }
}

/// Account summary built from every engine on the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub account_id: AccountId,
    pub currency: String,
    /// Starting balance plus realized PnL minus commissions.
    pub balance: Decimal,
    pub commissions: Decimal,
    pub realized_pnl: Decimal,
    pub positions: Vec<PositionStatusReport>,
    pub ts_event: UnixNanos,
}

#[derive(Debug)]
pub struct SimulatedVenue {
    config: VenueConfig,
    engines: BTreeMap<InstrumentId, OrderMatchingEngine>,
}

impl SimulatedVenue {
    pub fn new(config: VenueConfig) -> Self {
        SimulatedVenue {
            config,
            engines: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &VenueConfig {
        &self.config
    }

    /// Create the matching engine for `instrument`.
    ///
    /// Engine `n` (in insertion order) gets fill model seed
    /// `seed + n`, so engines draw from independent streams.
    pub fn add_instrument(&mut self, instrument: Arc<Instrument>) -> Result<(), VenueError> {
        if self.engines.contains_key(&instrument.id) {
            return Err(VenueError::DuplicateInstrument(instrument.id.clone()));
        }
        instrument.validate()?;

        let index = self.engines.len();
        let base_seed = self.config.fill_model.seed.unwrap_or(self.config.seed);
        let fill_model = FillModel::from_config(&self.config.fill_model, base_seed)?
            .with_seed(base_seed.wrapping_add(index as u64));

        let matching = MatchingEngineConfig {
            book_type: self.config.book_type,
            ..self.config.matching.clone()
        };
        info!(
            venue = %self.config.name,
            instrument_id = %instrument.id,
            index,
            book_type = ?matching.book_type,
            seed = fill_model.seed(),
            "adding matching engine"
        );
        let engine = OrderMatchingEngine::new(Arc::clone(&instrument), matching)
            .with_fill_model(fill_model)
            .with_fee_model(self.config.fee_model.clone())
            .with_venue(self.config.name.clone(), index)
            .with_account_id(self.config.account_id.clone());
        self.engines.insert(instrument.id.clone(), engine);
        Ok(())
    }

    pub fn engine(&self, id: &InstrumentId) -> Option<&OrderMatchingEngine> {
        self.engines.get(id)
    }

    pub fn engines(&self) -> impl Iterator<Item = &OrderMatchingEngine> {
        self.engines.values()
    }

    /// Read-only view of an instrument's book.
    pub fn book(&self, id: &InstrumentId) -> Option<&OrderBook> {
        self.engines.get(id).map(OrderMatchingEngine::book)
    }

    pub fn instrument_ids(&self) -> impl Iterator<Item = &InstrumentId> {
        self.engines.keys()
    }

    pub fn order(&self, id: &ClientOrderId) -> Option<&Order> {
        self.engines.values().find_map(|engine| engine.order(id))
    }

    /// Process one trading command and return the resulting events.
    pub fn process_command(&mut self, command: TradingCommand, ts: UnixNanos) -> Vec<OrderEvent> {
        trace!(venue = %self.config.name, instrument_id = %command.instrument_id(), ts, "command");
        match command {
            TradingCommand::Submit(submit) => self.submit_order(submit.order, ts),
            TradingCommand::Modify(modify) => match self.engines.get_mut(&modify.instrument_id) {
                Some(engine) => engine.process_modify(&modify, ts),
                None => vec![OrderEvent::modify_rejected(
                    modify.instrument_id.clone(),
                    modify.client_order_id.clone(),
                    None,
                    unknown_instrument(&modify.instrument_id),
                    ts,
                )],
            },
            TradingCommand::Cancel(cancel) => match self.engines.get_mut(&cancel.instrument_id) {
                Some(engine) => engine.process_cancel(&cancel, ts),
                None => vec![OrderEvent::cancel_rejected(
                    cancel.instrument_id.clone(),
                    cancel.client_order_id.clone(),
                    None,
                    unknown_instrument(&cancel.instrument_id),
                    ts,
                )],
            },
            TradingCommand::CancelAll(cancel_all) => {
                match self.engines.get_mut(&cancel_all.instrument_id) {
                    Some(engine) => engine.cancel_all(cancel_all.order_side, ts),
                    None => {
                        warn!(instrument_id = %cancel_all.instrument_id, "cancel all for unknown instrument");
                        Vec::new()
                    }
                }
            }
            TradingCommand::BatchCancel(batch) => match self.engines.get_mut(&batch.instrument_id) {
                Some(engine) => engine.batch_cancel(&batch.cancels, ts),
                None => batch
                    .cancels
                    .iter()
                    .map(|cancel| {
                        OrderEvent::cancel_rejected(
                            cancel.instrument_id.clone(),
                            cancel.client_order_id.clone(),
                            None,
                            unknown_instrument(&batch.instrument_id),
                            ts,
                        )
                    })
                    .collect(),
            },
        }
    }

    /// Submit an order: emits `OrderSubmitted`, then the engine's events.
    pub fn submit_order(&mut self, mut order: Order, ts: UnixNanos) -> Vec<OrderEvent> {
        order.status = OrderStatus::Submitted;
        order.ts_last = order.ts_last.max(ts);

        let Some(engine) = self.engines.get_mut(&order.instrument_id) else {
            debug!(id = %order.client_order_id, instrument_id = %order.instrument_id, "unknown instrument");
            return vec![
                OrderEvent::submitted(&order, ts),
                OrderEvent::rejected(
                    order.instrument_id.clone(),
                    order.client_order_id.clone(),
                    unknown_instrument(&order.instrument_id),
                    ts,
                ),
            ];
        };

        // submitted carries the engine's (non-decreasing) timestamp
        let ts = ts.max(engine.ts_last());
        let mut events = vec![OrderEvent::submitted(&order, ts)];
        events.extend(engine.process_order(order, ts));
        events
    }

    /// Route market data to its instrument's engine.
    ///
    /// Data for an instrument the venue does not trade is ignored.
    pub fn process(&mut self, data: &Data) -> Result<Vec<OrderEvent>, BookError> {
        match self.engines.get_mut(data.instrument_id()) {
            Some(engine) => engine.process_data(data),
            None => {
                warn!(
                    venue = %self.config.name,
                    instrument_id = %data.instrument_id(),
                    "data for unknown instrument, dropping"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Run time-based expiry on every engine.
    pub fn iterate(&mut self, ts: UnixNanos) -> Vec<OrderEvent> {
        self.engines
            .values_mut()
            .flat_map(|engine| engine.iterate(ts))
            .collect()
    }

    pub fn generate_account_state(&self, ts: UnixNanos) -> AccountState {
        let commissions: Decimal = self.engines.values().map(|e| e.total_commission()).sum();
        let realized_pnl: Decimal = self
            .engines
            .values()
            .map(|e| e.position().realized_pnl)
            .sum();
        AccountState {
            account_id: self.config.account_id.clone(),
            currency: self.config.base_currency.clone(),
            balance: self.config.starting_balance + realized_pnl - commissions,
            commissions,
            realized_pnl,
            positions: self.generate_position_status_reports(),
            ts_event: ts,
        }
    }

    pub fn generate_order_status_report(&self, id: &ClientOrderId) -> Option<OrderStatusReport> {
        self.engines
            .values()
            .find_map(|engine| engine.generate_order_status_report(id))
    }

    pub fn generate_order_status_reports(
        &self,
        open_only: bool,
        start: Option<UnixNanos>,
        end: Option<UnixNanos>,
    ) -> Vec<OrderStatusReport> {
        let mut reports: Vec<OrderStatusReport> = self
            .engines
            .values()
            .flat_map(|engine| engine.generate_order_status_reports(open_only, start, end))
            .collect();
        reports.sort_by_key(|r| r.ts_init);
        reports
    }

    pub fn generate_fill_reports(
        &self,
        start: Option<UnixNanos>,
        end: Option<UnixNanos>,
    ) -> Vec<FillReport> {
        let mut reports: Vec<FillReport> = self
            .engines
            .values()
            .flat_map(|engine| engine.generate_fill_reports(start, end))
            .collect();
        reports.sort_by_key(|r| r.ts_event);
        reports
    }

    /// One report per instrument, flat positions included.
    pub fn generate_position_status_reports(&self) -> Vec<PositionStatusReport> {
        self.engines
            .values()
            .map(OrderMatchingEngine::generate_position_status_report)
            .collect()
    }
}

fn unknown_instrument(id: &InstrumentId) -> String {
    format!("instrument {id} not traded on this venue")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::QuoteTick;
    use crate::identifiers::StrategyId;
    use crate::messages::{CancelAllOrders, CancelOrder};
    use crate::order_type::OrderKind;
    use crate::side::Side;
    use rust_decimal_macros::dec;

    fn venue() -> SimulatedVenue {
        let config = VenueConfig {
            fee_model: FeeModel::Fixed {
                commission: dec!(1),
                charge_once: false,
            },
            ..Default::default()
        };
        let mut venue = SimulatedVenue::new(config);
        for id in ["AAPL.SIM", "MSFT.SIM"] {
            venue
                .add_instrument(Arc::new(Instrument::new(id, 2, 0).unwrap()))
                .unwrap();
        }
        venue
    }

    fn quote(id: &str, bid: Decimal, ask: Decimal, ts: UnixNanos) -> Data {
        Data::Quote(QuoteTick::new(InstrumentId::new(id), bid, ask, dec!(100), dec!(100), ts))
    }

    fn market(id: &str, coid: &str, side: Side, qty: Decimal) -> Order {
        Order::new(
            StrategyId::new("S-1"),
            InstrumentId::new(id),
            ClientOrderId::new(coid),
            side,
            OrderKind::Market,
            qty,
            0,
        )
    }

    #[test]
    fn duplicate_instrument_is_an_error() {
        let mut venue = venue();
        let err = venue
            .add_instrument(Arc::new(Instrument::new("AAPL.SIM", 2, 0).unwrap()))
            .unwrap_err();
        assert_eq!(err, VenueError::DuplicateInstrument(InstrumentId::new("AAPL.SIM")));
    }

    #[test]
    fn engines_get_consecutive_seeds() {
        let venue = venue();
        let seeds: Vec<(String, u64)> = venue
            .engines()
            .map(|e| (e.instrument().id.to_string(), e.fill_model().seed()))
            .collect();
        assert_eq!(
            seeds,
            vec![("AAPL.SIM".to_string(), 42), ("MSFT.SIM".to_string(), 43)]
        );
    }

    #[test]
    fn submit_emits_submitted_before_engine_events() {
        let mut venue = venue();
        venue.process(&quote("AAPL.SIM", dec!(99), dec!(100), 1)).unwrap();

        let cmd = TradingCommand::submit(market("AAPL.SIM", "O-1", Side::Buy, dec!(10)), 2);
        let events = venue.process_command(cmd, 2);
        let kinds: Vec<&str> = events.iter().map(OrderEvent::kind).collect();
        assert_eq!(kinds, vec!["SUBMITTED", "ACCEPTED", "FILLED"]);

        let unknown = venue.submit_order(market("TSLA.SIM", "O-2", Side::Buy, dec!(1)), 3);
        let kinds: Vec<&str> = unknown.iter().map(OrderEvent::kind).collect();
        assert_eq!(kinds, vec!["SUBMITTED", "REJECTED"]);
    }

    #[test]
    fn account_state_nets_pnl_and_commissions() {
        let mut venue = venue();
        venue.process(&quote("AAPL.SIM", dec!(99), dec!(100), 1)).unwrap();
        venue.submit_order(market("AAPL.SIM", "O-1", Side::Buy, dec!(10)), 2);
        venue.process(&quote("AAPL.SIM", dec!(104), dec!(105), 3)).unwrap();
        venue.submit_order(market("AAPL.SIM", "O-2", Side::Sell, dec!(10)), 4);

        let account = venue.generate_account_state(5);
        assert_eq!(account.realized_pnl, dec!(40));
        assert_eq!(account.commissions, dec!(2));
        assert_eq!(account.balance, dec!(1000038));
        assert_eq!(account.positions.len(), 2);
        assert_eq!(venue.generate_fill_reports(Some(3), None).len(), 1);
    }

    #[test]
    fn cancels_for_unknown_instrument_are_rejected() {
        let mut venue = venue();
        let cancel = TradingCommand::cancel(InstrumentId::new("TSLA.SIM"), ClientOrderId::new("O-9"), 1);
        let events = venue.process_command(cancel, 1);
        assert_eq!(events[0].kind(), "CANCEL_REJECTED");

        let cancel_all = TradingCommand::CancelAll(CancelAllOrders {
            instrument_id: InstrumentId::new("AAPL.SIM"),
            order_side: None,
            ts_init: 2,
        });
        assert!(venue.process_command(cancel_all, 2).is_empty());

        let cancel = CancelOrder {
            instrument_id: InstrumentId::new("AAPL.SIM"),
            client_order_id: ClientOrderId::new("O-9"),
            ts_init: 3,
        };
        let events = venue.process_command(TradingCommand::Cancel(cancel), 3);
        assert_eq!(events[0].kind(), "CANCEL_REJECTED");
    }
}
