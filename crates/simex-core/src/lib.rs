//! simex-core
//!
//! Deterministic execution simulation logic:
//! - identifiers, instruments and market data records
//! - orders, commands and execution events
//! - order book with simulated orders resting next to feed liquidity
//! - fill, fee and trailing-stop models
//! - per-instrument matching engine and the simulated venue
//! - execution reports and an idempotent order ledger

pub mod identifiers;
pub mod side;
pub mod enums;
pub mod order_type;
pub mod instrument;
pub mod error;
pub mod data;
pub mod order;
pub mod messages;
pub mod top_of_book;
pub mod ladder;
pub mod order_book;
pub mod fill_model;
pub mod fee_model;
pub mod trailing;
pub mod position;
pub mod matching_engine;
pub mod venue;
pub mod reports;

pub use identifiers::{
    AccountId, ClientOrderId, InstrumentId, Price, Quantity, StrategyId, TradeId, UnixNanos,
    VenueOrderId,
};
pub use side::Side;
pub use enums::{
    BookAction, BookType, LiquiditySide, OrderStatus, PositionSide, TimeInForce,
    TrailingOffsetType, TriggerType,
};
pub use order_type::{OrderKind, OrderType, Trailing};
pub use instrument::{Instrument, InstrumentRegistry};
pub use error::{BookError, FillModelError, InstrumentError, OrderError, VenueError};

pub use data::{
    Bar, BookOrder, Data, DepthSnapshot, MarkPriceUpdate, OrderBookDelta, OrderBookDeltas,
    QuoteTick, TradeTick,
};
pub use order::Order;
pub use messages::{
    BatchCancelOrders, CancelAllOrders, CancelOrder, Fill, ModifyOrder, OrderEvent, SubmitOrder,
    TradingCommand, TwapParams,
};

pub use top_of_book::TopOfBookSnapshot;
pub use ladder::{BookEntry, BookFill, EntryKey, Ladder, Level};
pub use order_book::{AlwaysFill, BookSnapshot, OrderBook, TouchPolicy};
pub use fill_model::{FillModel, FillModelConfig};
pub use fee_model::FeeModel;
pub use position::NetPosition;
pub use matching_engine::{MatchingEngineConfig, OrderMatchingEngine};
pub use venue::{AccountState, SimulatedVenue, VenueConfig};
pub use reports::{FillReport, LedgerEntry, OrderLedger, OrderStatusReport, PositionStatusReport};
