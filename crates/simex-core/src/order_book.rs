//! Single-instrument order book with price-time priority.
//!
//! - One instance per instrument, owned by its matching engine.
//! - Bids: descending by price (best = highest).
//! - Asks: ascending by price (best = lowest).
//! - FIFO (time priority) within each price level.
//!
//! Feed liquidity and simulated orders share the same levels. Any feed
//! update that would cross the book is resolved on the spot: the incoming
//! entry trades against whatever it crosses, simulated orders on the other
//! side are filled as makers, and the book is never observably crossed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::data::{DepthSnapshot, OrderBookDelta, OrderBookDeltas};
use crate::enums::{BookAction, BookType};
use crate::error::BookError;
use crate::identifiers::{ClientOrderId, InstrumentId, Price, Quantity, UnixNanos};
use crate::ladder::{BookEntry, BookFill, EntryKey, Ladder};
use crate::side::Side;
use crate::top_of_book::TopOfBookSnapshot;

/// Decides whether a simulated order resting exactly at the touched price
/// gets filled (queue position is unknown to the simulator).
pub trait TouchPolicy {
    fn fills_at_touch(&mut self) -> bool;
}

/// Touch policy that always fills.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFill;

impl TouchPolicy for AlwaysFill {
    fn fills_at_touch(&mut self) -> bool {
        true
    }
}

/// Read-only copy of the book for consumers outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub instrument_id: InstrumentId,
    /// Best first.
    pub bids: Vec<(Price, Quantity)>,
    /// Best first.
    pub asks: Vec<(Price, Quantity)>,
    pub sequence: u64,
    pub ts_last: UnixNanos,
}

/// Single-instrument order book.
#[derive(Debug, Clone)]
pub struct OrderBook {
    instrument_id: InstrumentId,
    book_type: BookType,
    /// Fail on UPDATE/DELETE of unknown entries instead of warning.
    strict: bool,

    bids: Ladder,
    asks: Ladder,

    /// Simulated orders currently resting, by side.
    own: HashMap<ClientOrderId, Side>,

    sequence: u64,
    ts_last: UnixNanos,
    update_count: u64,

    /// Cache of top-of-book, refreshed on every mutation.
    top: TopOfBookSnapshot,
}

impl OrderBook {
    /// Create a new, empty order book.
    pub fn new(instrument_id: InstrumentId, book_type: BookType) -> Self {
        OrderBook {
            instrument_id,
            book_type,
            strict: false,
            bids: Ladder::new(Side::Buy),
            asks: Ladder::new(Side::Sell),
            own: HashMap::new(),
            sequence: 0,
            ts_last: 0,
            update_count: 0,
            top: TopOfBookSnapshot::default(),
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    pub fn book_type(&self) -> BookType {
        self.book_type
    }

    pub fn bids(&self) -> &Ladder {
        &self.bids
    }

    pub fn asks(&self) -> &Ladder {
        &self.asks
    }

    pub fn ladder(&self, side: Side) -> &Ladder {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn ts_last(&self) -> UnixNanos {
        self.ts_last
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Current cached top-of-book.
    pub fn top_of_book(&self) -> TopOfBookSnapshot {
        self.top
    }

    pub fn best_bid_price(&self) -> Option<Price> {
        self.top.bid_price
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.top.ask_price
    }

    pub fn best_bid_size(&self) -> Option<Quantity> {
        self.top.bid_price.map(|_| self.top.bid_size)
    }

    pub fn best_ask_size(&self) -> Option<Quantity> {
        self.top.ask_price.map(|_| self.top.ask_size)
    }

    pub fn spread(&self) -> Option<Price> {
        self.top.spread()
    }

    pub fn midpoint(&self) -> Option<Price> {
        self.top.mid()
    }

    /// Best price an aggressor on `side` would trade against.
    pub fn best_opposite(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.top.ask_price,
            Side::Sell => self.top.bid_price,
        }
    }

    /// Aggregated `(price, size)` levels, best first, at most `depth` of them.
    pub fn levels(&self, side: Side, depth: usize) -> Vec<(Price, Quantity)> {
        self.ladder(side)
            .levels()
            .take(depth)
            .map(|level| (level.price, level.size()))
            .collect()
    }

    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            instrument_id: self.instrument_id.clone(),
            bids: self.levels(Side::Buy, depth),
            asks: self.levels(Side::Sell, depth),
            sequence: self.sequence,
            ts_last: self.ts_last,
        }
    }

    // -------------------------------------------------------------------------
    // Feed updates
    // -------------------------------------------------------------------------

    /// Apply a single delta, filling crossed simulated orders unconditionally.
    pub fn apply_delta(&mut self, delta: &OrderBookDelta) -> Result<Vec<BookFill>, BookError> {
        self.apply_delta_with(delta, &mut AlwaysFill)
    }

    /// Apply a single delta.
    ///
    /// Returns the fills of simulated orders the delta traded against.
    pub fn apply_delta_with(
        &mut self,
        delta: &OrderBookDelta,
        touch: &mut dyn TouchPolicy,
    ) -> Result<Vec<BookFill>, BookError> {
        self.check_instrument(&delta.instrument_id)?;
        let order = &delta.order;
        if order.size < Quantity::ZERO {
            return Err(BookError::NegativeSize {
                price: order.price,
                size: order.size,
            });
        }

        let key = self.external_key(delta);
        let mut fills = Vec::new();

        match delta.action {
            BookAction::Clear => {
                self.bids.clear_external();
                self.asks.clear_external();
            }
            BookAction::Add => {
                if self.book_type == BookType::L1Mbp {
                    self.ladder_mut(order.side).clear_external();
                }
                self.ladder_mut(order.side).add(key.clone(), order.price, order.size);
                fills = self.resolve_cross(order.side, &key, touch);
            }
            BookAction::Update => {
                let ladder = match order.side {
                    Side::Buy => &mut self.bids,
                    Side::Sell => &mut self.asks,
                };
                if ladder.contains(&key) {
                    ladder.update(&key, order.price, order.size);
                } else if ladder.take_absorbed(&key) || self.book_type == BookType::L1Mbp {
                    if self.book_type == BookType::L1Mbp {
                        ladder.clear_external();
                    }
                    ladder.add(key.clone(), order.price, order.size);
                } else {
                    self.missing_entry("UPDATE", order.side, &key)?;
                    return Ok(fills);
                }
                fills = self.resolve_cross(order.side, &key, touch);
            }
            BookAction::Delete => {
                let ladder = self.ladder_mut(order.side);
                if ladder.remove(&key).is_none() && !ladder.take_absorbed(&key) {
                    self.missing_entry("DELETE", order.side, &key)?;
                    return Ok(fills);
                }
            }
        }

        self.sequence = self.sequence.max(delta.sequence);
        self.finish_update(delta.ts_event);
        Ok(fills)
    }

    /// Apply a batch of deltas in order.
    pub fn apply_deltas_with(
        &mut self,
        deltas: &OrderBookDeltas,
        touch: &mut dyn TouchPolicy,
    ) -> Result<Vec<BookFill>, BookError> {
        let mut fills = Vec::new();
        for delta in &deltas.deltas {
            fills.extend(self.apply_delta_with(delta, touch)?);
        }
        Ok(fills)
    }

    /// Replace all feed liquidity on one side with `levels`.
    pub fn apply_depth_snapshot(
        &mut self,
        snapshot: &DepthSnapshot,
    ) -> Result<Vec<BookFill>, BookError> {
        self.apply_depth_snapshot_with(snapshot, &mut AlwaysFill)
    }

    pub fn apply_depth_snapshot_with(
        &mut self,
        snapshot: &DepthSnapshot,
        touch: &mut dyn TouchPolicy,
    ) -> Result<Vec<BookFill>, BookError> {
        self.check_instrument(&snapshot.instrument_id)?;
        if let Some((price, size)) = snapshot.levels.iter().find(|(_, size)| *size < Quantity::ZERO)
        {
            return Err(BookError::NegativeSize {
                price: *price,
                size: *size,
            });
        }

        let side = snapshot.side;
        let mut levels: Vec<(Price, Quantity)> = snapshot
            .levels
            .iter()
            .copied()
            .filter(|(_, size)| *size > Quantity::ZERO)
            .collect();
        // best first, so crossing levels resolve in priority order
        match side {
            Side::Buy => levels.sort_by(|a, b| b.0.cmp(&a.0)),
            Side::Sell => levels.sort_by(|a, b| a.0.cmp(&b.0)),
        }
        if self.book_type == BookType::L1Mbp {
            levels.truncate(1);
        }

        let ladder = self.ladder_mut(side);
        ladder.clear_external();
        for (price, size) in &levels {
            ladder.add(EntryKey::Level(*price), *price, *size);
        }

        let mut fills = Vec::new();
        for (price, _) in &levels {
            fills.extend(self.resolve_cross(side, &EntryKey::Level(*price), touch));
        }

        self.finish_update(snapshot.ts_event);
        Ok(fills)
    }

    /// Replace the top of book from a quote (L1 books).
    pub fn update_quote_with(
        &mut self,
        bid: (Price, Quantity),
        ask: (Price, Quantity),
        ts: UnixNanos,
        touch: &mut dyn TouchPolicy,
    ) -> Vec<BookFill> {
        self.bids.clear_external();
        self.asks.clear_external();
        self.bids.add(EntryKey::Level(bid.0), bid.0, bid.1);
        self.asks.add(EntryKey::Level(ask.0), ask.0, ask.1);

        let mut fills = self.resolve_cross(Side::Buy, &EntryKey::Level(bid.0), touch);
        fills.extend(self.resolve_cross(Side::Sell, &EntryKey::Level(ask.0), touch));

        self.finish_update(ts);
        fills
    }

    /// Move the top of an L1 book to a printed trade.
    ///
    /// The side the aggressor took sits at `price` and the other side one
    /// `tick` away (a print with no aggressor counts as a lifted ask), both
    /// sized `size`. Simulated orders are not traded here: a synthetic
    /// level that would cross one is left out.
    pub fn update_trade_tick(
        &mut self,
        price: Price,
        size: Quantity,
        aggressor: Option<Side>,
        tick: Price,
        ts: UnixNanos,
    ) -> Result<(), BookError> {
        if self.book_type != BookType::L1Mbp {
            return Err(BookError::NotTopOfBook(self.book_type));
        }
        let (bid, ask) = match aggressor {
            Some(Side::Sell) => (price, price + tick),
            Some(Side::Buy) | None => (price - tick, price),
        };

        self.bids.clear_external();
        self.asks.clear_external();
        if self.asks.best_price().map_or(true, |own_ask| own_ask > bid) {
            self.bids.add(EntryKey::Level(bid), bid, size);
        }
        if self.bids.best_price().map_or(true, |own_bid| own_bid < ask) {
            self.asks.add(EntryKey::Level(ask), ask, size);
        }

        self.finish_update(ts);
        Ok(())
    }

    /// Fill simulated orders that a printed trade passed through.
    ///
    /// A trade at `price` reaches resting orders priced at or better than it
    /// on the side the aggressor hit (both sides when the aggressor is
    /// unknown). Volume is shared in queue order: on L2/L3 books feed
    /// entries ahead of a simulated order consume the trade size first; on
    /// L1 books the equal-price case is left to `touch`.
    pub fn simulate_trade(
        &mut self,
        price: Price,
        size: Quantity,
        aggressor: Option<Side>,
        ts: UnixNanos,
        touch: &mut dyn TouchPolicy,
    ) -> Vec<BookFill> {
        let sides: &[Side] = match aggressor {
            Some(Side::Buy) => &[Side::Sell],
            Some(Side::Sell) => &[Side::Buy],
            None => &[Side::Buy, Side::Sell],
        };

        let mut fills = Vec::new();
        for resting_side in sides {
            let planned = self.plan_trade_fills(*resting_side, price, size, touch);
            let ladder = self.ladder_mut(*resting_side);
            for fill in &planned {
                let remaining = ladder.size_of(&fill.maker).unwrap_or_default() - fill.size;
                ladder.set_size(&fill.maker, remaining);
            }
            for fill in &planned {
                if let Some(id) = fill.maker.own_id() {
                    if !self.ladder(*resting_side).contains(&fill.maker) {
                        self.own.remove(id);
                    }
                }
            }
            fills.extend(planned);
        }

        self.finish_update(ts);
        fills
    }

    // -------------------------------------------------------------------------
    // Simulated orders
    // -------------------------------------------------------------------------

    /// Rest a simulated order at the back of its price level.
    ///
    /// The caller must have matched away any marketable part first.
    pub fn add_own(&mut self, side: Side, price: Price, id: ClientOrderId, size: Quantity) {
        self.ladder_mut(side).add(EntryKey::Own(id.clone()), price, size);
        self.own.insert(id, side);
        self.refresh_top();
        self.assert_uncrossed();
    }

    /// Remove a simulated order, returning what was resting.
    pub fn remove_own(&mut self, id: &ClientOrderId) -> Option<BookEntry> {
        let side = self.own.remove(id)?;
        let removed = self.ladder_mut(side).remove(&EntryKey::Own(id.clone()));
        self.refresh_top();
        removed
    }

    /// Resize a simulated order in place, keeping its queue position.
    pub fn set_own_size(&mut self, id: &ClientOrderId, size: Quantity) -> bool {
        let Some(side) = self.own.get(id).copied() else {
            return false;
        };
        let key = EntryKey::Own(id.clone());
        let updated = self.ladder_mut(side).set_size(&key, size);
        if !self.ladder(side).contains(&key) {
            self.own.remove(id);
        }
        self.refresh_top();
        updated
    }

    /// `(side, price, size)` of a resting simulated order.
    pub fn own_order(&self, id: &ClientOrderId) -> Option<(Side, Price, Quantity)> {
        let side = *self.own.get(id)?;
        let key = EntryKey::Own(id.clone());
        let ladder = self.ladder(side);
        Some((side, ladder.price_of(&key)?, ladder.size_of(&key)?))
    }

    pub fn own_count(&self) -> usize {
        self.own.len()
    }

    /// Quantity an aggressor on `side` limited at `limit` could trade now.
    pub fn available(&self, side: Side, limit: Option<Price>) -> Quantity {
        self.ladder(side.opposite()).available(limit)
    }

    /// `true` if an aggressor on `side` limited at `limit` would trade now.
    pub fn is_marketable(&self, side: Side, limit: Option<Price>) -> bool {
        let opposite = self.ladder(side.opposite());
        opposite
            .best_price()
            .is_some_and(|best| opposite.is_marketable(best, limit))
    }

    /// Trade an aggressor on `side` against the opposite side, best price
    /// first and FIFO within a level, consuming what it matches.
    pub fn match_taker(
        &mut self,
        side: Side,
        limit: Option<Price>,
        qty: Quantity,
    ) -> Vec<BookFill> {
        let fills = self.ladder_mut(side.opposite()).consume(limit, qty);
        for fill in &fills {
            if let Some(id) = fill.maker.own_id() {
                if !self.ladder(side.opposite()).contains(&fill.maker) {
                    self.own.remove(id);
                }
            }
        }
        self.refresh_top();
        self.assert_uncrossed();
        fills
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn ladder_mut(&mut self, side: Side) -> &mut Ladder {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn check_instrument(&self, instrument_id: &InstrumentId) -> Result<(), BookError> {
        if instrument_id != &self.instrument_id {
            return Err(BookError::InstrumentMismatch {
                expected: self.instrument_id.clone(),
                got: instrument_id.clone(),
            });
        }
        Ok(())
    }

    fn external_key(&self, delta: &OrderBookDelta) -> EntryKey {
        match self.book_type {
            BookType::L3Mbo => EntryKey::Order(delta.order.order_id),
            BookType::L1Mbp | BookType::L2Mbp => EntryKey::Level(delta.order.price),
        }
    }

    fn missing_entry(&self, action: &'static str, side: Side, key: &EntryKey) -> Result<(), BookError> {
        if self.strict {
            return Err(BookError::InvalidDelta {
                instrument_id: self.instrument_id.clone(),
                action,
                side,
                key: key.to_string(),
            });
        }
        warn!(
            instrument_id = %self.instrument_id,
            action,
            ?side,
            %key,
            "delta references entry not in book, ignoring"
        );
        Ok(())
    }

    /// Trade the feed entry `key` on `side` against anything it crosses.
    ///
    /// Simulated orders on the other side are filled (at their own price);
    /// crossing feed liquidity on both sides is absorbed. When `touch`
    /// declines to fill a simulated order at an equal price, the rest of
    /// the incoming entry is absorbed so it cannot rest crossed.
    fn resolve_cross(
        &mut self,
        side: Side,
        key: &EntryKey,
        touch: &mut dyn TouchPolicy,
    ) -> Vec<BookFill> {
        let mut fills = Vec::new();
        let (same, other) = match side {
            Side::Buy => (&mut self.bids, &mut self.asks),
            Side::Sell => (&mut self.asks, &mut self.bids),
        };
        let (Some(price), Some(mut remaining)) = (same.price_of(key), same.size_of(key)) else {
            return fills;
        };

        let mut declined = false;
        while remaining > Quantity::ZERO && !declined {
            let Some(best) = other.best_price() else {
                break;
            };
            let crossing = match side {
                Side::Buy => best <= price,
                Side::Sell => best >= price,
            };
            if !crossing {
                break;
            }
            let at_touch = best == price;

            let Some((entries, index, absorbed)) = other.parts_mut(best) else {
                break;
            };
            while remaining > Quantity::ZERO {
                let Some(front) = entries.front_mut() else {
                    break;
                };
                let take = remaining.min(front.size);
                if let EntryKey::Own(id) = &front.key {
                    if at_touch && !touch.fills_at_touch() {
                        declined = true;
                        break;
                    }
                    fills.push(BookFill {
                        maker: front.key.clone(),
                        price: best,
                        size: take,
                    });
                    trace!(%id, %best, %take, "feed update crossed simulated order");
                }
                front.size -= take;
                remaining -= take;
                if front.size.is_zero() {
                    if let Some(done) = entries.pop_front() {
                        index.remove(&done.key);
                        match done.key.own_id() {
                            Some(id) => {
                                self.own.remove(id);
                            }
                            None => {
                                absorbed.insert(done.key);
                            }
                        }
                    }
                }
            }
            other.prune(best);
        }

        if remaining.is_zero() || declined {
            same.remove(key);
            same.mark_absorbed(key.clone());
        } else {
            same.set_size(key, remaining);
        }
        fills
    }

    /// Work out which simulated orders on `resting_side` a trade reaches.
    fn plan_trade_fills(
        &self,
        resting_side: Side,
        price: Price,
        size: Quantity,
        touch: &mut dyn TouchPolicy,
    ) -> Vec<BookFill> {
        let ladder = self.ladder(resting_side);
        let queue_known = self.book_type != BookType::L1Mbp;
        let mut remaining = size;
        let mut planned = Vec::new();

        for level in ladder.levels() {
            if remaining <= Quantity::ZERO || !ladder.is_marketable(level.price, Some(price)) {
                break;
            }
            let at_touch = level.price == price;
            for entry in level.entries() {
                if remaining <= Quantity::ZERO {
                    break;
                }
                match &entry.key {
                    EntryKey::Own(_) => {
                        if at_touch && !queue_known && !touch.fills_at_touch() {
                            continue;
                        }
                        let take = remaining.min(entry.size);
                        planned.push(BookFill {
                            maker: entry.key.clone(),
                            price: level.price,
                            size: take,
                        });
                        remaining -= take;
                    }
                    _ if queue_known => remaining -= remaining.min(entry.size),
                    _ => {}
                }
            }
        }
        planned
    }

    fn finish_update(&mut self, ts: UnixNanos) {
        self.ts_last = self.ts_last.max(ts);
        self.update_count += 1;
        self.refresh_top();
        self.assert_uncrossed();
    }

    fn refresh_top(&mut self) {
        let (bid_price, bid_size) = match self.bids.best_level() {
            Some(level) => (Some(level.price), level.size()),
            None => (None, Quantity::ZERO),
        };
        let (ask_price, ask_size) = match self.asks.best_level() {
            Some(level) => (Some(level.price), level.size()),
            None => (None, Quantity::ZERO),
        };
        self.top = TopOfBookSnapshot::new(bid_price, bid_size, ask_price, ask_size);
    }

    /// A crossed book is a logic defect, never a valid state.
    fn assert_uncrossed(&self) {
        if let (Some(bid), Some(ask)) = (self.top.bid_price, self.top.ask_price) {
            assert!(
                bid < ask,
                "crossed book for {}: bid {} >= ask {}",
                self.instrument_id,
                bid,
                ask
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BookOrder;
    use rust_decimal_macros::dec;

    struct Never;

    impl TouchPolicy for Never {
        fn fills_at_touch(&mut self) -> bool {
            false
        }
    }

    fn inst() -> InstrumentId {
        InstrumentId::new("AAPL.SIM")
    }

    fn delta(action: BookAction, side: Side, px: Price, sz: Quantity, id: u64) -> OrderBookDelta {
        OrderBookDelta::new(inst(), action, BookOrder::new(side, px, sz, id), id, id)
    }

    fn l2_book() -> OrderBook {
        let mut book = OrderBook::new(inst(), BookType::L2Mbp);
        book.apply_delta(&delta(BookAction::Add, Side::Buy, dec!(100), dec!(10), 1)).unwrap();
        book.apply_delta(&delta(BookAction::Add, Side::Buy, dec!(99), dec!(5), 2)).unwrap();
        book.apply_delta(&delta(BookAction::Add, Side::Sell, dec!(101), dec!(8), 3)).unwrap();
        book
    }

    #[test]
    fn top_of_book_cache_follows_deltas() {
        let mut book = l2_book();
        assert_eq!(book.best_bid_price(), Some(dec!(100)));
        assert_eq!(book.best_bid_size(), Some(dec!(10)));
        assert_eq!(book.best_ask_price(), Some(dec!(101)));
        assert_eq!(book.spread(), Some(dec!(1)));

        book.apply_delta(&delta(BookAction::Update, Side::Buy, dec!(100), dec!(3), 4)).unwrap();
        assert_eq!(book.best_bid_size(), Some(dec!(3)));

        book.apply_delta(&delta(BookAction::Delete, Side::Buy, dec!(100), dec!(0), 5)).unwrap();
        assert_eq!(book.best_bid_price(), Some(dec!(99)));

        book.apply_delta(&OrderBookDelta::clear(inst(), 6, 6)).unwrap();
        assert_eq!(book.best_bid_price(), None);
        assert_eq!(book.best_ask_price(), None);
        assert_eq!(book.spread(), None);
        assert_eq!(book.sequence(), 6);
    }

    #[test]
    fn strict_mode_rejects_unknown_entries() {
        let mut book = OrderBook::new(inst(), BookType::L3Mbo).with_strict(true);
        let err = book
            .apply_delta(&delta(BookAction::Delete, Side::Sell, dec!(101), dec!(1), 42))
            .unwrap_err();
        assert!(matches!(err, BookError::InvalidDelta { action: "DELETE", .. }));

        let mut lenient = OrderBook::new(inst(), BookType::L3Mbo);
        assert!(lenient
            .apply_delta(&delta(BookAction::Update, Side::Sell, dec!(101), dec!(1), 42))
            .unwrap()
            .is_empty());
        assert_eq!(lenient.best_ask_price(), None);
    }

    #[test]
    fn crossing_feed_entry_fills_simulated_maker() {
        let mut book = l2_book();
        book.add_own(Side::Buy, dec!(100.5), ClientOrderId::new("O-1"), dec!(4));
        assert_eq!(book.best_bid_price(), Some(dec!(100.5)));

        // ask drops through the simulated bid
        let fills = book
            .apply_delta(&delta(BookAction::Add, Side::Sell, dec!(100.5), dec!(6), 7))
            .unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].maker, EntryKey::Own(ClientOrderId::new("O-1")));
        assert_eq!(fills[0].size, dec!(4));
        assert_eq!(fills[0].price, dec!(100.5));
        assert_eq!(book.own_count(), 0);

        // the remaining 2 rests above the external 100 bid
        assert_eq!(book.best_ask_price(), Some(dec!(100.5)));
        assert_eq!(book.best_ask_size(), Some(dec!(2)));
        assert_eq!(book.best_bid_price(), Some(dec!(100)));

        // a deeper ask absorbs the external 100 bid and rests with the rest
        let fills = book
            .apply_delta(&delta(BookAction::Add, Side::Sell, dec!(99.5), dec!(20), 8))
            .unwrap();
        assert!(fills.is_empty());
        assert_eq!(book.best_bid_price(), Some(dec!(99)));
        assert_eq!(book.best_ask_price(), Some(dec!(99.5)));
        assert_eq!(book.best_ask_size(), Some(dec!(10)));

        // the feed may still delete the absorbed bid
        let mut strict = book.clone().with_strict(true);
        assert!(strict
            .apply_delta(&delta(BookAction::Delete, Side::Buy, dec!(100), dec!(0), 9))
            .is_ok());
        assert_eq!(strict.levels(Side::Buy, 5), vec![(dec!(99), dec!(5))]);
        assert!(book.best_bid_price() < book.best_ask_price());
    }

    #[test]
    fn declined_touch_absorbs_incoming_liquidity() {
        let mut book = OrderBook::new(inst(), BookType::L2Mbp);
        book.add_own(Side::Buy, dec!(100), ClientOrderId::new("O-1"), dec!(4));
        let fills = book
            .apply_delta_with(&delta(BookAction::Add, Side::Sell, dec!(100), dec!(6), 1), &mut Never)
            .unwrap();
        assert!(fills.is_empty());
        assert_eq!(book.best_ask_price(), None);
        assert_eq!(book.own_order(&ClientOrderId::new("O-1")), Some((Side::Buy, dec!(100), dec!(4))));

        // the absorbed level can still be deleted without a strict error
        let mut strict = book.clone().with_strict(true);
        strict.apply_delta(&delta(BookAction::Delete, Side::Sell, dec!(100), dec!(0), 2)).unwrap();
    }

    #[test]
    fn match_taker_walks_levels_and_stops_at_limit() {
        let mut book = l2_book();
        book.apply_delta(&delta(BookAction::Add, Side::Sell, dec!(102), dec!(5), 9)).unwrap();
        assert_eq!(book.available(Side::Buy, Some(dec!(101))), dec!(8));
        assert!(book.is_marketable(Side::Buy, Some(dec!(101))));
        assert!(!book.is_marketable(Side::Buy, Some(dec!(100.5))));

        let fills = book.match_taker(Side::Buy, Some(dec!(101)), dec!(12));
        let total: Quantity = fills.iter().map(|f| f.size).sum();
        assert_eq!(total, dec!(8));
        assert_eq!(book.best_ask_price(), Some(dec!(102)));
    }

    #[test]
    fn depth_snapshot_replaces_one_side_only() {
        let mut book = l2_book();
        book.add_own(Side::Sell, dec!(103), ClientOrderId::new("O-2"), dec!(1));
        let snapshot = DepthSnapshot {
            instrument_id: inst(),
            side: Side::Sell,
            levels: vec![(dec!(105), dec!(2)), (dec!(104), dec!(1))],
            ts_event: 10,
            ts_init: 10,
        };
        book.apply_depth_snapshot(&snapshot).unwrap();
        assert_eq!(
            book.levels(Side::Sell, 10),
            vec![(dec!(103), dec!(1)), (dec!(104), dec!(1)), (dec!(105), dec!(2))]
        );
        assert_eq!(book.best_bid_price(), Some(dec!(100)));
        assert_eq!(book.ts_last(), 10);
    }

    #[test]
    fn trade_respects_queue_on_l2() {
        let mut book = OrderBook::new(inst(), BookType::L2Mbp);
        book.apply_delta(&delta(BookAction::Add, Side::Buy, dec!(100), dec!(5), 1)).unwrap();
        book.add_own(Side::Buy, dec!(100), ClientOrderId::new("O-1"), dec!(3));

        // 4 traded at 100: all consumed by the 5 ahead in the queue
        let fills = book.simulate_trade(dec!(100), dec!(4), Some(Side::Sell), 2, &mut AlwaysFill);
        assert!(fills.is_empty());

        // 7 traded: 5 ahead, 2 for us
        let fills = book.simulate_trade(dec!(100), dec!(7), Some(Side::Sell), 3, &mut AlwaysFill);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].size, dec!(2));
        assert_eq!(book.own_order(&ClientOrderId::new("O-1")).map(|o| o.2), Some(dec!(1)));

        // a buy aggressor never reaches resting bids
        assert!(book
            .simulate_trade(dec!(99), dec!(10), Some(Side::Buy), 4, &mut AlwaysFill)
            .is_empty());
    }

    #[test]
    fn auction_between_two_venues_books() {
        use crate::ladder::DepthMetric;

        let mut home = OrderBook::new(inst(), BookType::L3Mbo);
        home.apply_delta(&delta(BookAction::Add, Side::Buy, dec!(101), dec!(4), 1)).unwrap();
        home.apply_delta(&delta(BookAction::Add, Side::Buy, dec!(100), dec!(6), 2)).unwrap();
        home.apply_delta(&delta(BookAction::Add, Side::Buy, dec!(98), dec!(9), 3)).unwrap();
        let mut away = OrderBook::new(inst(), BookType::L3Mbo);
        away.apply_delta(&delta(BookAction::Add, Side::Sell, dec!(100), dec!(5), 4)).unwrap();
        away.apply_delta(&delta(BookAction::Add, Side::Sell, dec!(100.5), dec!(5), 5)).unwrap();
        away.apply_delta(&delta(BookAction::Add, Side::Sell, dec!(103), dec!(1), 6)).unwrap();

        // bids at or above 100 and asks at or below 101 both hold 10
        let (bids, asks) = home.bids().auction_match(away.asks(), DepthMetric::Volume);
        assert_eq!(bids, vec![(dec!(101), dec!(4)), (dec!(100), dec!(6))]);
        assert_eq!(asks, vec![(dec!(100), dec!(5)), (dec!(100.5), dec!(5))]);

        // exposure: 1004 bid against 1002.5 ask, the last bid split to fit
        let (bids, asks) = home.bids().auction_match(away.asks(), DepthMetric::Exposure);
        assert_eq!(bids, vec![(dec!(101), dec!(4)), (dec!(100), dec!(5.985))]);
        assert_eq!(asks, vec![(dec!(100), dec!(5)), (dec!(100.5), dec!(5))]);

        // matching a side against itself clears nothing
        assert_eq!(home.bids().auction_match(home.bids(), DepthMetric::Volume), (vec![], vec![]));
        // nor does it move either book
        assert_eq!(home.best_bid_size(), Some(dec!(4)));
        assert_eq!(away.best_ask_size(), Some(dec!(5)));
    }

    #[test]
    fn l1_trade_print_sets_top_around_trade_price() {
        let mut book = OrderBook::new(inst(), BookType::L1Mbp);
        book.update_trade_tick(dec!(100), dec!(5), None, dec!(0.01), 1).unwrap();
        assert_eq!(book.best_bid_price(), Some(dec!(99.99)));
        assert_eq!(book.best_ask_price(), Some(dec!(100)));
        assert_eq!(book.best_ask_size(), Some(dec!(5)));

        book.update_trade_tick(dec!(101), dec!(2), Some(Side::Sell), dec!(0.01), 2).unwrap();
        assert_eq!(book.best_bid_price(), Some(dec!(101)));
        assert_eq!(book.best_ask_price(), Some(dec!(101.01)));
        assert_eq!(book.levels(Side::Buy, 5), vec![(dec!(101), dec!(2))]);
        assert_eq!(book.ts_last(), 2);
    }

    #[test]
    fn l1_trade_print_never_crosses_simulated_orders() {
        let mut book = OrderBook::new(inst(), BookType::L1Mbp);
        book.add_own(Side::Buy, dec!(100.5), ClientOrderId::new("O-1"), dec!(3));

        book.update_trade_tick(dec!(100), dec!(5), Some(Side::Buy), dec!(0.01), 1).unwrap();
        assert_eq!(book.best_bid_price(), Some(dec!(100.5)));
        assert_eq!(book.best_ask_price(), None);
        assert_eq!(book.own_order(&ClientOrderId::new("O-1")), Some((Side::Buy, dec!(100.5), dec!(3))));
        assert_eq!(book.levels(Side::Buy, 5), vec![(dec!(100.5), dec!(3)), (dec!(99.99), dec!(5))]);
    }

    #[test]
    fn trade_print_update_is_l1_only() {
        let mut book = l2_book();
        let err = book.update_trade_tick(dec!(100), dec!(1), None, dec!(0.01), 10).unwrap_err();
        assert_eq!(err, BookError::NotTopOfBook(BookType::L2Mbp));
        assert_eq!(book.best_ask_price(), Some(dec!(101)));
    }

    #[test]
    #[should_panic(expected = "crossed book")]
    fn resting_a_marketable_simulated_order_panics() {
        let mut book = l2_book();
        book.add_own(Side::Buy, dec!(101), ClientOrderId::new("O-9"), dec!(1));
    }
}
