//! Error types for the simulation core.
//!
//! Normal trading outcomes (rejections, cancels) are delivered as
//! [`OrderEvent`](crate::messages::OrderEvent)s, not errors. The types
//! here cover configuration mistakes and strict-mode data problems.

use thiserror::Error;

use crate::enums::BookType;
use crate::identifiers::{InstrumentId, Price};
use crate::side::Side;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("instrument {0} already registered")]
    Duplicate(InstrumentId),

    #[error("instrument {instrument_id}: {field} must be positive")]
    NonPositiveIncrement {
        instrument_id: InstrumentId,
        field: &'static str,
    },

    #[error("instrument {instrument_id}: {field} has more decimals than precision {precision}")]
    PrecisionMismatch {
        instrument_id: InstrumentId,
        field: &'static str,
        precision: u32,
    },

    #[error("instrument {instrument_id}: min_quantity exceeds max_quantity")]
    InvalidQuantityLimits { instrument_id: InstrumentId },
}

/// Errors raised while applying market data to an [`OrderBook`](crate::order_book::OrderBook).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookError {
    /// UPDATE/DELETE referencing an order or level the book does not hold
    /// (only raised in strict mode).
    #[error("invalid delta for {instrument_id}: {action} {side:?} {key} not in book")]
    InvalidDelta {
        instrument_id: InstrumentId,
        action: &'static str,
        side: Side,
        key: String,
    },

    #[error("delta for {got} applied to book {expected}")]
    InstrumentMismatch {
        expected: InstrumentId,
        got: InstrumentId,
    },

    #[error("invalid size {size} at price {price}")]
    NegativeSize { price: Price, size: rust_decimal::Decimal },

    #[error("trade prints only set the top of an L1 book, not {0:?}")]
    NotTopOfBook(BookType),
}

#[derive(Debug, Error, PartialEq)]
pub enum FillModelError {
    #[error("{name} must be within [0, 1], was {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
}

#[derive(Debug, Error, PartialEq)]
pub enum VenueError {
    #[error("instrument {0} already added to venue")]
    DuplicateInstrument(InstrumentId),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    FillModel(#[from] FillModelError),
}

/// Reasons an order or a modification fails validation against its instrument.
///
/// The engine turns these into `OrderRejected` / `OrderModifyRejected`
/// events using the `Display` text as the reason.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("order instrument {got} does not match engine instrument {expected}")]
    InstrumentMismatch {
        expected: InstrumentId,
        got: InstrumentId,
    },

    #[error("quantity {0} must be positive")]
    NonPositiveQuantity(rust_decimal::Decimal),

    #[error("quantity {quantity} invalid for size precision {precision} / increment {increment}")]
    InvalidQuantity {
        quantity: rust_decimal::Decimal,
        precision: u32,
        increment: rust_decimal::Decimal,
    },

    #[error("quantity {quantity} below minimum {min}")]
    BelowMinQuantity {
        quantity: rust_decimal::Decimal,
        min: rust_decimal::Decimal,
    },

    #[error("quantity {quantity} above maximum {max}")]
    AboveMaxQuantity {
        quantity: rust_decimal::Decimal,
        max: rust_decimal::Decimal,
    },

    #[error("quantity {quantity} not above filled quantity {filled}")]
    QuantityBelowFilled {
        quantity: rust_decimal::Decimal,
        filled: rust_decimal::Decimal,
    },

    #[error("{field} {price} invalid for price precision {precision} / increment {increment}")]
    InvalidPrice {
        field: &'static str,
        price: Price,
        precision: u32,
        increment: Price,
    },

    #[error("{field} {price} outside instrument price limits")]
    PriceOutOfRange { field: &'static str, price: Price },

    #[error("post-only is only valid for limit orders, was {0}")]
    PostOnlyNotLimit(&'static str),

    #[error("GTD order missing expire_time")]
    MissingExpireTime,

    #[error("GTD expire_time {expire_time} already passed at {now}")]
    ExpireTimeInPast { expire_time: u64, now: u64 },

    #[error("GTD orders not supported")]
    GtdNotSupported,

    #[error("trailing offset {0} must not be negative")]
    NegativeTrailingOffset(rust_decimal::Decimal),
}
