//! Time-ordered merge of several market data streams.
//!
//! Each stream is a `Vec<Data>` already sorted by `ts_init`. The iterator
//! keeps one head per stream in a min-heap keyed by
//! `(ts_init, stream index)`, so equal timestamps come out in stream
//! registration order and, within a stream, in file order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use simex_core::{Data, UnixNanos};
use tracing::{debug, warn};

struct Stream {
    name: String,
    items: VecDeque<Data>,
}

#[derive(Default)]
pub struct DataIterator {
    streams: Vec<Stream>,
    heap: BinaryHeap<Reverse<(UnixNanos, usize)>>,
    emitted: u64,
}

impl DataIterator {
    pub fn new() -> Self {
        DataIterator::default()
    }

    /// Register a stream. Out-of-order input is sorted stably by `ts_init`
    /// with a warning.
    pub fn add_stream(&mut self, name: impl Into<String>, mut data: Vec<Data>) {
        let name = name.into();
        if data.windows(2).any(|w| w[0].ts_init() > w[1].ts_init()) {
            warn!(stream = %name, "stream not sorted by ts_init; sorting");
            data.sort_by_key(Data::ts_init);
        }
        debug!(stream = %name, len = data.len(), "added data stream");

        let index = self.streams.len();
        if let Some(first) = data.first() {
            self.heap.push(Reverse((first.ts_init(), index)));
        }
        self.streams.push(Stream {
            name,
            items: data.into(),
        });
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(|s| s.name.as_str())
    }

    /// Timestamp of the next item without consuming it.
    pub fn peek_ts(&self) -> Option<UnixNanos> {
        self.heap.peek().map(|Reverse((ts, _))| *ts)
    }

    pub fn remaining(&self) -> usize {
        self.streams.iter().map(|s| s.items.len()).sum()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl Iterator for DataIterator {
    type Item = Data;

    fn next(&mut self) -> Option<Data> {
        let Reverse((_, index)) = self.heap.pop()?;
        let stream = &mut self.streams[index];
        let item = stream.items.pop_front()?;
        if let Some(next) = stream.items.front() {
            self.heap.push(Reverse((next.ts_init(), index)));
        }
        self.emitted += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use simex_core::{InstrumentId, MarkPriceUpdate};

    fn mark(inst: &str, ts: UnixNanos) -> Data {
        Data::MarkPrice(MarkPriceUpdate {
            instrument_id: InstrumentId::new(inst),
            value: dec!(1),
            ts_event: ts,
            ts_init: ts,
        })
    }

    fn order(iter: DataIterator) -> Vec<(String, UnixNanos)> {
        iter.map(|d| (d.instrument_id().to_string(), d.ts_init())).collect()
    }

    #[test]
    fn merges_by_timestamp() {
        let mut iter = DataIterator::new();
        iter.add_stream("a", vec![mark("A", 1), mark("A", 4), mark("A", 9)]);
        iter.add_stream("b", vec![mark("B", 2), mark("B", 3), mark("B", 10)]);
        assert_eq!(iter.peek_ts(), Some(1));
        assert_eq!(iter.remaining(), 6);

        let ts: Vec<UnixNanos> = order(iter).into_iter().map(|(_, ts)| ts).collect();
        assert_eq!(ts, vec![1, 2, 3, 4, 9, 10]);
    }

    #[test]
    fn ties_follow_registration_then_file_order() {
        let mut iter = DataIterator::new();
        iter.add_stream("b", vec![mark("B1", 5), mark("B2", 5)]);
        iter.add_stream("a", vec![mark("A1", 5)]);
        iter.add_stream("empty", Vec::new());

        let ids: Vec<String> = order(iter).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["B1", "B2", "A1"]);
    }

    #[test]
    fn unsorted_stream_is_sorted_stably() {
        let mut iter = DataIterator::new();
        iter.add_stream("a", vec![mark("X", 3), mark("Y", 1), mark("Z", 3)]);
        let ids: Vec<String> = order(iter).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["Y", "X", "Z"]);
    }
}
