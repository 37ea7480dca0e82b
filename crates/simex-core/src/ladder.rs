//! One side of an order book: price levels holding FIFO queues of entries.
//!
//! - Bids: best = highest price.
//! - Asks: best = lowest price.
//! - FIFO (time priority) within each price level.
//!
//! Entries are either external liquidity from the feed (keyed by feed
//! order id for L3, by price for aggregated books) or simulated orders
//! owned by the matching engine. Both share the same queues.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identifiers::{ClientOrderId, Price, Quantity};
use crate::side::Side;

/// Identity of an entry resting in a ladder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKey {
    /// Individual feed order (L3).
    Order(u64),
    /// Aggregated feed size at a price (L1/L2 and depth snapshots).
    Level(Price),
    /// Simulated order owned by the matching engine.
    Own(ClientOrderId),
}

impl EntryKey {
    pub fn is_own(&self) -> bool {
        matches!(self, EntryKey::Own(_))
    }

    pub fn own_id(&self) -> Option<&ClientOrderId> {
        match self {
            EntryKey::Own(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKey::Order(id) => write!(f, "order {id}"),
            EntryKey::Level(price) => write!(f, "level {price}"),
            EntryKey::Own(id) => write!(f, "own {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookEntry {
    pub key: EntryKey,
    pub size: Quantity,
}

/// Quantity traded against one resting entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFill {
    pub maker: EntryKey,
    pub price: Price,
    pub size: Quantity,
}

/// How depth is accumulated while walking a ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DepthMetric {
    /// Sum of sizes.
    #[default]
    Volume,
    /// Sum of price × size.
    Exposure,
}

/// A single price level.
#[derive(Debug, Clone)]
pub struct Level {
    pub price: Price,
    entries: VecDeque<BookEntry>,
}

impl Level {
    fn new(price: Price) -> Self {
        Level {
            price,
            entries: VecDeque::new(),
        }
    }

    /// Aggregate size of all entries at this level.
    pub fn size(&self) -> Quantity {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Entries in time priority.
    pub fn entries(&self) -> impl Iterator<Item = &BookEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &EntryKey) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }
}

/// One side of the book.
#[derive(Debug, Clone)]
pub struct Ladder {
    side: Side,
    levels: BTreeMap<Price, Level>,
    /// Entry -> price of the level holding it.
    index: HashMap<EntryKey, Price>,
    /// External entries consumed by matching that the feed may still reference.
    absorbed: HashSet<EntryKey>,
}

impl Ladder {
    pub fn new(side: Side) -> Self {
        Ladder {
            side,
            levels: BTreeMap::new(),
            index: HashMap::new(),
            absorbed: HashSet::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn best_price(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.levels.keys().next_back().copied(),
            Side::Sell => self.levels.keys().next().copied(),
        }
    }

    pub fn best_level(&self) -> Option<&Level> {
        match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        }
    }

    /// Levels from best to worst.
    pub fn levels(&self) -> Box<dyn Iterator<Item = &Level> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    pub fn level(&self, price: Price) -> Option<&Level> {
        self.levels.get(&price)
    }

    /// Aggregate size at `price` (zero if no level).
    pub fn level_size(&self, price: Price) -> Quantity {
        self.levels.get(&price).map(Level::size).unwrap_or_default()
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn price_of(&self, key: &EntryKey) -> Option<Price> {
        self.index.get(key).copied()
    }

    pub fn size_of(&self, key: &EntryKey) -> Option<Quantity> {
        let price = self.index.get(key)?;
        let level = self.levels.get(price)?;
        level.entries.iter().find(|e| &e.key == key).map(|e| e.size)
    }

    /// `true` when a level at `level_price` on this side is reachable by an
    /// opposite-side aggressor limited at `limit` (`None` = market).
    pub fn is_marketable(&self, level_price: Price, limit: Option<Price>) -> bool {
        match limit {
            None => true,
            Some(limit) => match self.side {
                Side::Sell => level_price <= limit,
                Side::Buy => level_price >= limit,
            },
        }
    }

    /// Add an entry at the back of its level. An existing key is updated instead.
    pub fn add(&mut self, key: EntryKey, price: Price, size: Quantity) {
        if self.index.contains_key(&key) {
            self.update(&key, price, size);
            return;
        }
        if size <= Quantity::ZERO {
            return;
        }
        self.absorbed.remove(&key);
        self.levels
            .entry(price)
            .or_insert_with(|| Level::new(price))
            .entries
            .push_back(BookEntry {
                key: key.clone(),
                size,
            });
        self.index.insert(key, price);
    }

    /// Replace the size (same price, priority kept) or move the entry to the
    /// back of a new level. A zero size removes it. Returns `false` if unknown.
    pub fn update(&mut self, key: &EntryKey, price: Price, size: Quantity) -> bool {
        let Some(current) = self.index.get(key).copied() else {
            return false;
        };
        if size <= Quantity::ZERO {
            self.remove(key);
            return true;
        }
        if current == price {
            if let Some(entry) = self
                .levels
                .get_mut(&current)
                .and_then(|level| level.entries.iter_mut().find(|e| &e.key == key))
            {
                entry.size = size;
            }
        } else {
            self.remove(key);
            self.add(key.clone(), price, size);
        }
        true
    }

    /// Change the size of an entry in place, keeping its queue position.
    pub fn set_size(&mut self, key: &EntryKey, size: Quantity) -> bool {
        match self.index.get(key).copied() {
            Some(price) => self.update(key, price, size),
            None => false,
        }
    }

    pub fn remove(&mut self, key: &EntryKey) -> Option<BookEntry> {
        let price = self.index.remove(key)?;
        let level = self.levels.get_mut(&price)?;
        let removed = level.position(key).and_then(|idx| level.entries.remove(idx));
        if level.entries.is_empty() {
            self.levels.remove(&price);
        }
        removed
    }

    /// Remove every feed entry, keeping simulated orders in place.
    pub fn clear_external(&mut self) {
        for level in self.levels.values_mut() {
            level.entries.retain(|e| e.key.is_own());
        }
        self.levels.retain(|_, level| !level.entries.is_empty());
        self.index.retain(|key, _| key.is_own());
        self.absorbed.clear();
    }

    /// Simulated orders resting on this side, best level first.
    pub fn own_entries(&self) -> Vec<(Price, &BookEntry)> {
        self.levels()
            .flat_map(|level| {
                level
                    .entries
                    .iter()
                    .filter(|e| e.key.is_own())
                    .map(move |e| (level.price, e))
            })
            .collect()
    }

    pub(crate) fn mark_absorbed(&mut self, key: EntryKey) {
        if !key.is_own() {
            self.absorbed.insert(key);
        }
    }

    /// Forget an absorbed key, returning whether it was known.
    pub(crate) fn take_absorbed(&mut self, key: &EntryKey) -> bool {
        self.absorbed.remove(key)
    }

    /// Total size reachable by an opposite aggressor limited at `limit`.
    pub fn available(&self, limit: Option<Price>) -> Quantity {
        self.levels()
            .take_while(|level| self.is_marketable(level.price, limit))
            .map(Level::size)
            .sum()
    }

    /// Cumulative volume or exposure from the best level through `price` inclusive.
    pub fn depth_at_price(&self, price: Price, metric: DepthMetric) -> Decimal {
        self.levels()
            .take_while(|level| self.is_marketable(level.price, Some(price)))
            .map(|level| match metric {
                DepthMetric::Volume => level.size(),
                DepthMetric::Exposure => level.size() * level.price,
            })
            .sum()
    }

    /// Entries (as `(price, size)`) needed to reach `target` volume or exposure,
    /// best first, with the last entry split to match the remainder exactly.
    pub fn depth_for_volume(&self, target: Decimal, metric: DepthMetric) -> Vec<(Price, Quantity)> {
        let mut consumed = Vec::new();
        let mut remaining = target;

        'levels: for level in self.levels() {
            for entry in level.entries.iter() {
                if remaining <= Decimal::ZERO {
                    break 'levels;
                }
                let amount = match metric {
                    DepthMetric::Volume => entry.size,
                    DepthMetric::Exposure => {
                        if level.price <= Decimal::ZERO {
                            continue;
                        }
                        entry.size * level.price
                    }
                };
                if amount <= remaining {
                    consumed.push((level.price, entry.size));
                    remaining -= amount;
                } else {
                    let size = match metric {
                        DepthMetric::Volume => remaining,
                        DepthMetric::Exposure => remaining / level.price,
                    };
                    consumed.push((level.price, size));
                    remaining = Decimal::ZERO;
                }
            }
        }

        consumed
    }

    /// Largest volume (or exposure) that clears between this ladder and an
    /// opposite-side ladder at a single crossing price.
    ///
    /// Returns `(consumed_from_self, consumed_from_other)`; both empty when
    /// either side is empty, the sides are the same, or nothing crosses.
    pub fn auction_match(
        &self,
        other: &Ladder,
        metric: DepthMetric,
    ) -> (Vec<(Price, Quantity)>, Vec<(Price, Quantity)>) {
        if self.side == other.side {
            return (Vec::new(), Vec::new());
        }
        let (Some(self_best), Some(other_best)) = (self.best_price(), other.best_price()) else {
            return (Vec::new(), Vec::new());
        };
        let crosses = match self.side {
            Side::Buy => self_best >= other_best,
            Side::Sell => self_best <= other_best,
        };
        if !crosses {
            return (Vec::new(), Vec::new());
        }

        let self_depth = self.depth_at_price(other_best, metric);
        let other_depth = other.depth_at_price(self_best, metric);
        let matched = self_depth.min(other_depth);
        if matched <= Decimal::ZERO {
            return (Vec::new(), Vec::new());
        }

        (
            self.depth_for_volume(matched, metric),
            other.depth_for_volume(matched, metric),
        )
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Consume liquidity for an opposite-side taker, best level first and
    /// FIFO within a level, until `qty` is filled or `limit` stops matching.
    pub(crate) fn consume(&mut self, limit: Option<Price>, qty: Quantity) -> Vec<BookFill> {
        let mut fills = Vec::new();
        let mut remaining = qty;

        while remaining > Quantity::ZERO {
            let Some(best) = self.best_price() else {
                break;
            };
            if !self.is_marketable(best, limit) {
                break;
            }

            let Some(level) = self.levels.get_mut(&best) else {
                break;
            };
            while remaining > Quantity::ZERO {
                let Some(front) = level.entries.front_mut() else {
                    break;
                };
                let take = remaining.min(front.size);
                fills.push(BookFill {
                    maker: front.key.clone(),
                    price: best,
                    size: take,
                });
                front.size -= take;
                remaining -= take;

                if front.size.is_zero() {
                    if let Some(done) = level.entries.pop_front() {
                        self.index.remove(&done.key);
                        if !done.key.is_own() {
                            self.absorbed.insert(done.key);
                        }
                    }
                }
            }

            if level.entries.is_empty() {
                self.levels.remove(&best);
            }
        }

        fills
    }

    /// Mutable access to the level at `price` together with the index and
    /// absorbed set, for book-level crossing resolution.
    pub(crate) fn parts_mut(
        &mut self,
        price: Price,
    ) -> Option<(
        &mut VecDeque<BookEntry>,
        &mut HashMap<EntryKey, Price>,
        &mut HashSet<EntryKey>,
    )> {
        let level = self.levels.get_mut(&price)?;
        Some((&mut level.entries, &mut self.index, &mut self.absorbed))
    }

    /// Drop the level at `price` if it no longer holds entries.
    pub(crate) fn prune(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(Level::is_empty) {
            self.levels.remove(&price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ask_ladder(levels: &[(Decimal, Decimal)]) -> Ladder {
        let mut ladder = Ladder::new(Side::Sell);
        for (i, (px, sz)) in levels.iter().enumerate() {
            ladder.add(EntryKey::Order(i as u64 + 1), *px, *sz);
        }
        ladder
    }

    #[test]
    fn best_price_per_side() {
        let mut bids = Ladder::new(Side::Buy);
        bids.add(EntryKey::Level(dec!(99)), dec!(99), dec!(5));
        bids.add(EntryKey::Level(dec!(100)), dec!(100), dec!(10));
        assert_eq!(bids.best_price(), Some(dec!(100)));

        let asks = ask_ladder(&[(dec!(102), dec!(1)), (dec!(101), dec!(8))]);
        assert_eq!(asks.best_price(), Some(dec!(101)));
        let prices: Vec<_> = asks.levels().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec!(101), dec!(102)]);
    }

    #[test]
    fn update_same_price_keeps_priority_and_zero_removes() {
        let mut ladder = Ladder::new(Side::Sell);
        ladder.add(EntryKey::Order(1), dec!(101), dec!(5));
        ladder.add(EntryKey::Order(2), dec!(101), dec!(5));
        ladder.update(&EntryKey::Order(1), dec!(101), dec!(2));

        let keys: Vec<_> = ladder.level(dec!(101)).unwrap().entries().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec![EntryKey::Order(1), EntryKey::Order(2)]);

        ladder.update(&EntryKey::Order(1), dec!(101), dec!(0));
        ladder.update(&EntryKey::Order(2), dec!(101), dec!(0));
        assert!(ladder.is_empty());
        assert!(!ladder.update(&EntryKey::Order(3), dec!(101), dec!(1)));
    }

    #[test]
    fn consume_is_fifo_and_splits_last_entry() {
        let mut ladder = ask_ladder(&[(dec!(101), dec!(3)), (dec!(101), dec!(4)), (dec!(102), dec!(5))]);
        let fills = ladder.consume(Some(dec!(101)), dec!(5));
        assert_eq!(fills.len(), 2);
        assert_eq!((fills[0].maker.clone(), fills[0].size), (EntryKey::Order(1), dec!(3)));
        assert_eq!((fills[1].maker.clone(), fills[1].size), (EntryKey::Order(2), dec!(2)));
        assert_eq!(ladder.size_of(&EntryKey::Order(2)), Some(dec!(2)));
        assert!(ladder.take_absorbed(&EntryKey::Order(1)));
        // limit stops at 101
        assert_eq!(ladder.available(Some(dec!(101))), dec!(2));
        assert_eq!(ladder.available(None), dec!(7));
    }

    #[test]
    fn depth_queries_by_volume_and_exposure() {
        let ladder = ask_ladder(&[(dec!(10), dec!(2)), (dec!(20), dec!(3))]);
        assert_eq!(ladder.depth_at_price(dec!(10), DepthMetric::Volume), dec!(2));
        assert_eq!(ladder.depth_at_price(dec!(20), DepthMetric::Volume), dec!(5));
        assert_eq!(ladder.depth_at_price(dec!(20), DepthMetric::Exposure), dec!(80));

        assert_eq!(
            ladder.depth_for_volume(dec!(3), DepthMetric::Volume),
            vec![(dec!(10), dec!(2)), (dec!(20), dec!(1))]
        );
        // 20 of exposure at 10, the remaining 30 at price 20 => 1.5
        assert_eq!(
            ladder.depth_for_volume(dec!(50), DepthMetric::Exposure),
            vec![(dec!(10), dec!(2)), (dec!(20), dec!(1.5))]
        );
    }

    #[test]
    fn auction_match_clears_crossing_volume() {
        let mut bids = Ladder::new(Side::Buy);
        bids.add(EntryKey::Order(10), dec!(101), dec!(4));
        bids.add(EntryKey::Order(11), dec!(100), dec!(6));
        let asks = ask_ladder(&[(dec!(100), dec!(3)), (dec!(102), dec!(9))]);

        // bids at or above 100: 10; asks at or below 101: 3
        let (b, a) = bids.auction_match(&asks, DepthMetric::Volume);
        assert_eq!(b, vec![(dec!(101), dec!(3))]);
        assert_eq!(a, vec![(dec!(100), dec!(3))]);

        let empty = Ladder::new(Side::Sell);
        assert_eq!(bids.auction_match(&empty, DepthMetric::Volume), (vec![], vec![]));

        let far = ask_ladder(&[(dec!(105), dec!(1))]);
        assert_eq!(bids.auction_match(&far, DepthMetric::Volume), (vec![], vec![]));
    }
}
