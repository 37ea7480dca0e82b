//! CSV codec for replay files and regression scenarios.
//!
//! Every input line starts with a record type and the record timestamp
//! (nanoseconds). Decimal fields use `-` for "not set".
//!
//! Market data (lines → [`Data`]):
//!
//! - Quote:  `Q, ts, instrument, bid, ask, bid_size, ask_size`
//! - Trade:  `T, ts, instrument, price, size, aggressor(B/S/-), trade_id`
//! - Delta:  `D, ts, instrument, action(A/U/D), side(B/S), price, size, order_id, sequence`
//! - Clear:  `D, ts, instrument, C[, sequence]`
//! - Depth:  `DEPTH, ts, instrument, side, price:size|price:size|...`
//! - Bar:    `BAR, ts, instrument, open, high, low, close, volume`
//! - Mark:   `M, ts, instrument, price`
//!
//! Commands (lines → [`TradingCommand`]):
//!
//! - New order:
//!   `N, ts, strategy, instrument, client_order_id, side, type, qty, price, trigger, tif, expire, flags[, key=value...]`
//!   where `flags` holds `P` (post-only) and/or `R` (reduce-only), or `-`.
//!   A set `expire` makes the order GTD. Extra keys: `trigger_type`,
//!   `offset`, `offset_type`, `activation`, `limit_offset`, `twap=horizon/interval`.
//! - Modify:      `U, ts, instrument, client_order_id, qty, price, trigger`
//! - Cancel:      `X, ts, instrument, client_order_id`
//! - Cancel all:  `CA, ts, instrument, side(B/S/-)`
//! - Batch:       `BX, ts, instrument, id|id|...`
//!
//! Events ([`OrderEvent`] → line):
//!
//! - `SUB, ts, instrument, client_order_id`
//! - `ACK, ts, instrument, client_order_id, venue_order_id`
//! - `REJ, ts, instrument, client_order_id, reason`
//! - `TRG, ts, instrument, client_order_id`
//! - `UPD, ts, instrument, client_order_id, qty, price, trigger`
//! - `MRJ, ts, instrument, client_order_id, reason`
//! - `CRJ, ts, instrument, client_order_id, reason`
//! - `CXL, ts, instrument, client_order_id`
//! - `EXP, ts, instrument, client_order_id`
//! - `F, ts, instrument, client_order_id, trade_id, side, qty, px, liquidity(M/T), commission`

use rust_decimal::Decimal;
use simex_core::{
    BatchCancelOrders, Bar, BookAction, BookOrder, CancelAllOrders, CancelOrder, ClientOrderId,
    Data, DepthSnapshot, InstrumentId, MarkPriceUpdate, ModifyOrder, Order, OrderBookDelta,
    OrderEvent, OrderKind, OrderType, QuoteTick, Side, StrategyId, SubmitOrder, TimeInForce,
    TradeTick, TradingCommand, Trailing, TrailingOffsetType, TriggerType, TwapParams, UnixNanos,
};

use crate::error::ProtocolError;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Data(Data),
    Command(TradingCommand),
}

impl Record {
    pub fn ts(&self) -> UnixNanos {
        match self {
            Record::Data(data) => data.ts_init(),
            Record::Command(command) => command.ts_init(),
        }
    }
}

/// Parse one line. Blank lines and `#` comments give `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Record>, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let tokens = split_and_trim(trimmed, ',');
    let record = match tokens[0].as_str() {
        "Q" => Record::Data(parse_quote(&tokens)?),
        "T" => Record::Data(parse_trade(&tokens)?),
        "D" => Record::Data(parse_delta(&tokens)?),
        "DEPTH" => Record::Data(parse_depth(&tokens)?),
        "BAR" => Record::Data(parse_bar(&tokens)?),
        "M" => Record::Data(parse_mark(&tokens)?),
        "N" => Record::Command(parse_new_order(&tokens)?),
        "U" => Record::Command(parse_modify(&tokens)?),
        "X" => Record::Command(parse_cancel(&tokens)?),
        "CA" => Record::Command(parse_cancel_all(&tokens)?),
        "BX" => Record::Command(parse_batch_cancel(&tokens)?),
        other => return Err(ProtocolError::UnknownRecord(other.to_string())),
    };
    Ok(Some(record))
}

/// Parse a whole file, tagging errors with their 1-based line number.
pub fn parse_records(text: &str) -> Result<Vec<Record>, ProtocolError> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(source) => {
                return Err(ProtocolError::AtLine {
                    line: idx + 1,
                    source: Box::new(source),
                })
            }
        }
    }
    Ok(records)
}

// -----------------------------------------------------------------------------
// Market data
// -----------------------------------------------------------------------------

fn parse_quote(tokens: &[String]) -> Result<Data, ProtocolError> {
    // Q, ts, instrument, bid, ask, bid_size, ask_size
    expect_fields("Q", tokens, 7)?;
    Ok(Data::Quote(QuoteTick::new(
        InstrumentId::new(tokens[2].as_str()),
        parse_decimal("bid", &tokens[3])?,
        parse_decimal("ask", &tokens[4])?,
        parse_decimal("bid_size", &tokens[5])?,
        parse_decimal("ask_size", &tokens[6])?,
        parse_ts(&tokens[1])?,
    )))
}

fn parse_trade(tokens: &[String]) -> Result<Data, ProtocolError> {
    // T, ts, instrument, price, size, aggressor, trade_id
    expect_fields("T", tokens, 7)?;
    let aggressor = match tokens[5].as_str() {
        "-" => None,
        s => Some(parse_side(s)?),
    };
    Ok(Data::Trade(TradeTick::new(
        InstrumentId::new(tokens[2].as_str()),
        parse_decimal("price", &tokens[3])?,
        parse_decimal("size", &tokens[4])?,
        aggressor,
        tokens[6].as_str().into(),
        parse_ts(&tokens[1])?,
    )))
}

fn parse_delta(tokens: &[String]) -> Result<Data, ProtocolError> {
    if tokens.len() < 4 {
        return Err(ProtocolError::FieldCount {
            record: "D",
            expected: 9,
            got: tokens.len(),
        });
    }
    let ts = parse_ts(&tokens[1])?;
    let instrument_id = InstrumentId::new(tokens[2].as_str());
    let action = parse_action(&tokens[3])?;

    if action == BookAction::Clear {
        // D, ts, instrument, C[, sequence]
        let sequence = match tokens.get(4) {
            Some(s) => parse_u64("sequence", s)?,
            None => 0,
        };
        return Ok(Data::Delta(OrderBookDelta::clear(instrument_id, sequence, ts)));
    }

    // D, ts, instrument, action, side, price, size, order_id, sequence
    expect_fields("D", tokens, 9)?;
    let order = BookOrder::new(
        parse_side(&tokens[4])?,
        parse_decimal("price", &tokens[5])?,
        parse_decimal("size", &tokens[6])?,
        parse_u64("order_id", &tokens[7])?,
    );
    let sequence = parse_u64("sequence", &tokens[8])?;
    Ok(Data::Delta(OrderBookDelta::new(instrument_id, action, order, sequence, ts)))
}

fn parse_depth(tokens: &[String]) -> Result<Data, ProtocolError> {
    // DEPTH, ts, instrument, side, price:size|price:size
    expect_fields("DEPTH", tokens, 5)?;
    let ts = parse_ts(&tokens[1])?;
    let levels = tokens[4]
        .split('|')
        .filter(|level| !level.trim().is_empty())
        .map(|level| {
            let (px, sz) = level
                .split_once(':')
                .ok_or_else(|| ProtocolError::invalid("depth level", level))?;
            Ok((parse_decimal("price", px.trim())?, parse_decimal("size", sz.trim())?))
        })
        .collect::<Result<Vec<_>, ProtocolError>>()?;
    Ok(Data::Depth(DepthSnapshot {
        instrument_id: InstrumentId::new(tokens[2].as_str()),
        side: parse_side(&tokens[3])?,
        levels,
        ts_event: ts,
        ts_init: ts,
    }))
}

fn parse_bar(tokens: &[String]) -> Result<Data, ProtocolError> {
    // BAR, ts, instrument, open, high, low, close, volume
    expect_fields("BAR", tokens, 8)?;
    let ts = parse_ts(&tokens[1])?;
    Ok(Data::Bar(Bar {
        instrument_id: InstrumentId::new(tokens[2].as_str()),
        open: parse_decimal("open", &tokens[3])?,
        high: parse_decimal("high", &tokens[4])?,
        low: parse_decimal("low", &tokens[5])?,
        close: parse_decimal("close", &tokens[6])?,
        volume: parse_decimal("volume", &tokens[7])?,
        ts_event: ts,
        ts_init: ts,
    }))
}

fn parse_mark(tokens: &[String]) -> Result<Data, ProtocolError> {
    // M, ts, instrument, price
    expect_fields("M", tokens, 4)?;
    let ts = parse_ts(&tokens[1])?;
    Ok(Data::MarkPrice(MarkPriceUpdate {
        instrument_id: InstrumentId::new(tokens[2].as_str()),
        value: parse_decimal("price", &tokens[3])?,
        ts_event: ts,
        ts_init: ts,
    }))
}

// -----------------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------------

/// Optional `key=value` fields after the fixed part of an `N` record.
#[derive(Debug, Default)]
struct OrderExtras {
    trigger_type: Option<TriggerType>,
    offset: Option<Decimal>,
    offset_type: Option<TrailingOffsetType>,
    activation: Option<Decimal>,
    limit_offset: Option<Decimal>,
    twap: Option<TwapParams>,
}

fn parse_extras(tokens: &[String]) -> Result<OrderExtras, ProtocolError> {
    let mut extras = OrderExtras::default();
    for token in tokens {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| ProtocolError::invalid("order option", token))?;
        let value = value.trim();
        match key.trim() {
            "trigger_type" => {
                extras.trigger_type = Some(
                    TriggerType::parse(value)
                        .ok_or_else(|| ProtocolError::invalid("trigger_type", value))?,
                )
            }
            "offset" => extras.offset = Some(parse_decimal("offset", value)?),
            "offset_type" => {
                extras.offset_type = Some(
                    TrailingOffsetType::parse(value)
                        .ok_or_else(|| ProtocolError::invalid("offset_type", value))?,
                )
            }
            "activation" => extras.activation = Some(parse_decimal("activation", value)?),
            "limit_offset" => extras.limit_offset = Some(parse_decimal("limit_offset", value)?),
            "twap" => {
                let (horizon, interval) = value
                    .split_once('/')
                    .ok_or_else(|| ProtocolError::invalid("twap", value))?;
                extras.twap = Some(TwapParams {
                    horizon_secs: parse_u64("twap horizon", horizon.trim())?,
                    interval_secs: parse_u64("twap interval", interval.trim())?,
                });
            }
            _ => return Err(ProtocolError::invalid("order option", token)),
        }
    }
    Ok(extras)
}

fn parse_new_order(tokens: &[String]) -> Result<TradingCommand, ProtocolError> {
    // N, ts, strategy, instrument, coid, side, type, qty, price, trigger, tif, expire, flags, extras...
    if tokens.len() < 13 {
        return Err(ProtocolError::FieldCount {
            record: "N",
            expected: 13,
            got: tokens.len(),
        });
    }
    let ts = parse_ts(&tokens[1])?;
    let side = parse_side(&tokens[5])?;
    let order_type =
        OrderType::parse(&tokens[6]).ok_or_else(|| ProtocolError::invalid("order type", &tokens[6]))?;
    let quantity = parse_decimal("quantity", &tokens[7])?;
    let price = parse_opt_decimal("price", &tokens[8])?;
    let trigger = parse_opt_decimal("trigger", &tokens[9])?;
    let tif = TimeInForce::parse(&tokens[10])
        .ok_or_else(|| ProtocolError::invalid("time in force", &tokens[10]))?;
    let expire = match tokens[11].as_str() {
        "-" => None,
        s => Some(parse_u64("expire", s)?),
    };
    let flags = tokens[12].as_str();
    let extras = parse_extras(&tokens[13..])?;

    let kind = build_kind(order_type, price, trigger, &extras)?;
    let mut order = Order::new(
        StrategyId::new(tokens[2].as_str()),
        InstrumentId::new(tokens[3].as_str()),
        ClientOrderId::new(tokens[4].as_str()),
        side,
        kind,
        quantity,
        ts,
    )
    .with_time_in_force(tif)
    .with_post_only(flags.contains('P'))
    .with_reduce_only(flags.contains('R'));
    if let Some(expire_time) = expire {
        order = order.with_expire_time(expire_time);
    }

    Ok(TradingCommand::Submit(SubmitOrder {
        order,
        exec_algorithm: extras.twap,
        ts_init: ts,
    }))
}

fn build_kind(
    order_type: OrderType,
    price: Option<Decimal>,
    trigger: Option<Decimal>,
    extras: &OrderExtras,
) -> Result<OrderKind, ProtocolError> {
    let require = |value: Option<Decimal>, field: &'static str| {
        value.ok_or(ProtocolError::MissingField { record: "N", field })
    };
    let trigger_type = extras.trigger_type.unwrap_or_default();
    let trailing = || -> Result<Trailing, ProtocolError> {
        let offset = require(extras.offset, "offset")?;
        let mut trailing = Trailing::new(offset, extras.offset_type.unwrap_or(TrailingOffsetType::Price));
        if let Some(activation) = extras.activation {
            trailing = trailing.with_activation_price(activation);
        }
        Ok(trailing)
    };

    let kind = match order_type {
        OrderType::Market => OrderKind::Market,
        OrderType::Limit => OrderKind::Limit {
            price: require(price, "price")?,
        },
        OrderType::StopMarket => OrderKind::StopMarket {
            trigger_price: require(trigger, "trigger")?,
            trigger_type,
        },
        OrderType::StopLimit => OrderKind::StopLimit {
            price: require(price, "price")?,
            trigger_price: require(trigger, "trigger")?,
            trigger_type,
            triggered: false,
        },
        OrderType::MarketIfTouched => OrderKind::MarketIfTouched {
            trigger_price: require(trigger, "trigger")?,
            trigger_type,
        },
        OrderType::LimitIfTouched => OrderKind::LimitIfTouched {
            price: require(price, "price")?,
            trigger_price: require(trigger, "trigger")?,
            trigger_type,
            triggered: false,
        },
        OrderType::TrailingStopMarket => OrderKind::TrailingStopMarket {
            trigger_price: trigger,
            trigger_type,
            trailing: trailing()?,
        },
        OrderType::TrailingStopLimit => OrderKind::TrailingStopLimit {
            price,
            trigger_price: trigger,
            trigger_type,
            limit_offset: require(extras.limit_offset, "limit_offset")?,
            trailing: trailing()?,
            triggered: false,
        },
    };
    Ok(kind)
}

fn parse_modify(tokens: &[String]) -> Result<TradingCommand, ProtocolError> {
    // U, ts, instrument, coid, qty, price, trigger
    expect_fields("U", tokens, 7)?;
    Ok(TradingCommand::Modify(ModifyOrder {
        instrument_id: InstrumentId::new(tokens[2].as_str()),
        client_order_id: ClientOrderId::new(tokens[3].as_str()),
        quantity: parse_opt_decimal("quantity", &tokens[4])?,
        price: parse_opt_decimal("price", &tokens[5])?,
        trigger_price: parse_opt_decimal("trigger", &tokens[6])?,
        ts_init: parse_ts(&tokens[1])?,
    }))
}

fn parse_cancel(tokens: &[String]) -> Result<TradingCommand, ProtocolError> {
    // X, ts, instrument, coid
    expect_fields("X", tokens, 4)?;
    Ok(TradingCommand::cancel(
        InstrumentId::new(tokens[2].as_str()),
        ClientOrderId::new(tokens[3].as_str()),
        parse_ts(&tokens[1])?,
    ))
}

fn parse_cancel_all(tokens: &[String]) -> Result<TradingCommand, ProtocolError> {
    // CA, ts, instrument, side
    expect_fields("CA", tokens, 4)?;
    let order_side = match tokens[3].as_str() {
        "-" => None,
        s => Some(parse_side(s)?),
    };
    Ok(TradingCommand::CancelAll(CancelAllOrders {
        instrument_id: InstrumentId::new(tokens[2].as_str()),
        order_side,
        ts_init: parse_ts(&tokens[1])?,
    }))
}

fn parse_batch_cancel(tokens: &[String]) -> Result<TradingCommand, ProtocolError> {
    // BX, ts, instrument, id|id|...
    expect_fields("BX", tokens, 4)?;
    let ts = parse_ts(&tokens[1])?;
    let instrument_id = InstrumentId::new(tokens[2].as_str());
    let cancels = tokens[3]
        .split('|')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| CancelOrder {
            instrument_id: instrument_id.clone(),
            client_order_id: ClientOrderId::new(id),
            ts_init: ts,
        })
        .collect();
    Ok(TradingCommand::BatchCancel(BatchCancelOrders {
        instrument_id,
        cancels,
        ts_init: ts,
    }))
}

// -----------------------------------------------------------------------------
// Events
// -----------------------------------------------------------------------------

/// Format an execution event as one CSV line.
pub fn format_event(event: &OrderEvent) -> String {
    match event {
        OrderEvent::Submitted(e) => {
            format!("SUB, {}, {}, {}", e.ts_event, e.instrument_id, e.client_order_id)
        }
        OrderEvent::Accepted(e) => format!(
            "ACK, {}, {}, {}, {}",
            e.ts_event, e.instrument_id, e.client_order_id, e.venue_order_id
        ),
        OrderEvent::Rejected(e) => format!(
            "REJ, {}, {}, {}, {}",
            e.ts_event, e.instrument_id, e.client_order_id, e.reason
        ),
        OrderEvent::Triggered(e) => {
            format!("TRG, {}, {}, {}", e.ts_event, e.instrument_id, e.client_order_id)
        }
        OrderEvent::Updated(e) => format!(
            "UPD, {}, {}, {}, {}, {}, {}",
            e.ts_event,
            e.instrument_id,
            e.client_order_id,
            e.quantity.normalize(),
            fmt_opt(e.price),
            fmt_opt(e.trigger_price)
        ),
        OrderEvent::ModifyRejected(e) => format!(
            "MRJ, {}, {}, {}, {}",
            e.ts_event, e.instrument_id, e.client_order_id, e.reason
        ),
        OrderEvent::CancelRejected(e) => format!(
            "CRJ, {}, {}, {}, {}",
            e.ts_event, e.instrument_id, e.client_order_id, e.reason
        ),
        OrderEvent::Canceled(e) => {
            format!("CXL, {}, {}, {}", e.ts_event, e.instrument_id, e.client_order_id)
        }
        OrderEvent::Expired(e) => {
            format!("EXP, {}, {}, {}", e.ts_event, e.instrument_id, e.client_order_id)
        }
        OrderEvent::Filled(f) => format!(
            "F, {}, {}, {}, {}, {}, {}, {}, {}, {}",
            f.ts_event,
            f.instrument_id,
            f.client_order_id,
            f.trade_id,
            f.order_side.as_char(),
            f.last_qty.normalize(),
            f.last_px.normalize(),
            f.liquidity_side.as_char(),
            f.commission.normalize()
        ),
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn split_and_trim(s: &str, delimiter: char) -> Vec<String> {
    s.split(delimiter)
        .map(|tok| tok.trim().to_string())
        .collect()
}

fn expect_fields(record: &'static str, tokens: &[String], expected: usize) -> Result<(), ProtocolError> {
    if tokens.len() != expected {
        return Err(ProtocolError::FieldCount {
            record,
            expected,
            got: tokens.len(),
        });
    }
    Ok(())
}

fn parse_ts(s: &str) -> Result<UnixNanos, ProtocolError> {
    parse_u64("timestamp", s)
}

fn parse_u64(field: &'static str, s: &str) -> Result<u64, ProtocolError> {
    s.parse::<u64>().map_err(|_| ProtocolError::invalid(field, s))
}

fn parse_decimal(field: &'static str, s: &str) -> Result<Decimal, ProtocolError> {
    s.parse::<Decimal>().map_err(|_| ProtocolError::invalid(field, s))
}

fn parse_opt_decimal(field: &'static str, s: &str) -> Result<Option<Decimal>, ProtocolError> {
    match s {
        "-" => Ok(None),
        _ => parse_decimal(field, s).map(Some),
    }
}

fn parse_side(s: &str) -> Result<Side, ProtocolError> {
    s.chars()
        .next()
        .filter(|_| s.len() == 1)
        .and_then(Side::from_char)
        .ok_or_else(|| ProtocolError::invalid("side", s))
}

fn parse_action(s: &str) -> Result<BookAction, ProtocolError> {
    s.chars()
        .next()
        .filter(|_| s.len() == 1)
        .and_then(BookAction::from_char)
        .ok_or_else(|| ProtocolError::invalid("book action", s))
}

fn fmt_opt(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.normalize().to_string())
}
