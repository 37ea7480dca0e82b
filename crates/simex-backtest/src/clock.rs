//! Simulated clock for backtests.
//!
//! Time only moves when the driver calls [`TestClock::advance_to`]; every
//! timer that came due on the way is returned as a [`TimeEvent`], oldest
//! first.

use std::collections::BTreeMap;

use simex_core::UnixNanos;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("timer '{0}' already exists")]
    DuplicateTimer(String),

    #[error("timer '{0}' needs a positive interval")]
    ZeroInterval(String),

    #[error("time alert '{name}' at {at} is before the clock time {now}")]
    AlertInPast {
        name: String,
        at: UnixNanos,
        now: UnixNanos,
    },
}

/// One firing of a named timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEvent {
    pub name: String,
    pub ts_event: UnixNanos,
}

#[derive(Debug, Clone)]
struct Timer {
    interval: UnixNanos,
    next: UnixNanos,
    stop: Option<UnixNanos>,
}

impl Timer {
    fn is_expired(&self) -> bool {
        self.stop.is_some_and(|stop| self.next > stop)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestClock {
    now: UnixNanos,
    // BTreeMap so equal-time events come out in name order
    timers: BTreeMap<String, Timer>,
}

impl TestClock {
    pub fn new() -> Self {
        TestClock::default()
    }

    pub fn now(&self) -> UnixNanos {
        self.now
    }

    /// Repeating timer firing at `start + interval`, `start + 2 * interval`, ...
    /// up to and including `stop` when given.
    pub fn set_timer(
        &mut self,
        name: impl Into<String>,
        interval: UnixNanos,
        start: UnixNanos,
        stop: Option<UnixNanos>,
    ) -> Result<(), ClockError> {
        let name = name.into();
        if interval == 0 {
            return Err(ClockError::ZeroInterval(name));
        }
        if self.timers.contains_key(&name) {
            return Err(ClockError::DuplicateTimer(name));
        }
        debug!(timer = %name, interval, start, ?stop, "set timer");
        self.timers.insert(
            name,
            Timer {
                interval,
                next: start.saturating_add(interval),
                stop,
            },
        );
        Ok(())
    }

    /// One-shot timer firing at `at`.
    pub fn set_time_alert(&mut self, name: impl Into<String>, at: UnixNanos) -> Result<(), ClockError> {
        let name = name.into();
        if at < self.now {
            return Err(ClockError::AlertInPast {
                name,
                at,
                now: self.now,
            });
        }
        if self.timers.contains_key(&name) {
            return Err(ClockError::DuplicateTimer(name));
        }
        self.timers.insert(
            name,
            Timer {
                interval: UnixNanos::MAX,
                next: at,
                stop: Some(at),
            },
        );
        Ok(())
    }

    pub fn cancel_timer(&mut self, name: &str) -> bool {
        self.timers.remove(name).is_some()
    }

    pub fn timer_names(&self) -> impl Iterator<Item = &str> {
        self.timers.keys().map(String::as_str)
    }

    pub fn next_time(&self, name: &str) -> Option<UnixNanos> {
        self.timers.get(name).map(|t| t.next)
    }

    /// Earliest pending event time across all timers.
    pub fn next_event_time(&self) -> Option<UnixNanos> {
        self.timers.values().map(|t| t.next).min()
    }

    /// Move the clock to `ts` (never backwards) and collect every event due
    /// at or before it, ordered by time and then timer name.
    pub fn advance_to(&mut self, ts: UnixNanos) -> Vec<TimeEvent> {
        if ts < self.now {
            return Vec::new();
        }
        self.now = ts;

        let mut events = Vec::new();
        self.timers.retain(|name, timer| {
            while timer.next <= ts && !timer.is_expired() {
                events.push(TimeEvent {
                    name: name.clone(),
                    ts_event: timer.next,
                });
                timer.next = timer.next.saturating_add(timer.interval);
            }
            !timer.is_expired()
        });
        // stable: name order survives within one timestamp
        events.sort_by_key(|e| e.ts_event);
        events
    }
}
