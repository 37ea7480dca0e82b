//! Small closed enums shared across the engine.

use serde::{Deserialize, Serialize};

/// How long an order stays working.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[default]
    Gtc,
    Gtd,
    Ioc,
    Fok,
    Day,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Gtd => "GTD",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
            TimeInForce::Day => "DAY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GTC" => Some(TimeInForce::Gtc),
            "GTD" => Some(TimeInForce::Gtd),
            "IOC" => Some(TimeInForce::Ioc),
            "FOK" => Some(TimeInForce::Fok),
            "DAY" => Some(TimeInForce::Day),
            _ => None,
        }
    }

    /// IOC and FOK orders never rest in the book.
    pub fn is_immediate(self) -> bool {
        matches!(self, TimeInForce::Ioc | TimeInForce::Fok)
    }
}

/// Which market price a stop or touch condition is evaluated against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// Ask for buy orders, bid for sell orders.
    #[default]
    BidAsk,
    LastPrice,
    MarkPrice,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::BidAsk => "BID_ASK",
            TriggerType::LastPrice => "LAST_PRICE",
            TriggerType::MarkPrice => "MARK_PRICE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BID_ASK" => Some(TriggerType::BidAsk),
            "LAST_PRICE" | "LAST" => Some(TriggerType::LastPrice),
            "MARK_PRICE" | "MARK" => Some(TriggerType::MarkPrice),
            _ => None,
        }
    }
}

/// Unit of a trailing offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrailingOffsetType {
    #[default]
    Price,
    BasisPoints,
    Ticks,
}

impl TrailingOffsetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TrailingOffsetType::Price => "PRICE",
            TrailingOffsetType::BasisPoints => "BASIS_POINTS",
            TrailingOffsetType::Ticks => "TICKS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRICE" => Some(TrailingOffsetType::Price),
            "BASIS_POINTS" | "BPS" => Some(TrailingOffsetType::BasisPoints),
            "TICKS" => Some(TrailingOffsetType::Ticks),
            _ => None,
        }
    }
}

/// Whether a fill provided or consumed liquidity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiquiditySide {
    Maker,
    Taker,
}

impl LiquiditySide {
    pub fn as_char(self) -> char {
        match self {
            LiquiditySide::Maker => 'M',
            LiquiditySide::Taker => 'T',
        }
    }
}

/// Order lifecycle state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Initialized,
    Submitted,
    Accepted,
    Rejected,
    Triggered,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
}

impl OrderStatus {
    /// Terminal states: nothing can happen to the order afterwards.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            OrderStatus::Rejected | OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Expired
        )
    }

    pub fn is_open(self) -> bool {
        matches!(
            self,
            OrderStatus::Accepted | OrderStatus::Triggered | OrderStatus::PartiallyFilled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Initialized => "INITIALIZED",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Triggered => "TRIGGERED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
        }
    }
}

/// Granularity of the market data feeding a book.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BookType {
    /// Top of book only, driven by quotes.
    #[serde(rename = "L1_MBP")]
    #[default]
    L1Mbp,
    /// Aggregated size per price level.
    #[serde(rename = "L2_MBP")]
    L2Mbp,
    /// Individual orders.
    #[serde(rename = "L3_MBO")]
    L3Mbo,
}

/// Action carried by an order book delta.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookAction {
    Add,
    Update,
    Delete,
    Clear,
}

impl BookAction {
    pub fn as_char(self) -> char {
        match self {
            BookAction::Add => 'A',
            BookAction::Update => 'U',
            BookAction::Delete => 'D',
            BookAction::Clear => 'C',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(BookAction::Add),
            'U' => Some(BookAction::Update),
            'D' => Some(BookAction::Delete),
            'C' => Some(BookAction::Clear),
            _ => None,
        }
    }
}

/// Net position direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}
