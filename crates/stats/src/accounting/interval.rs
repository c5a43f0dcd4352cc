//! Current-interval accumulation and the frozen last-interval snapshot.
//!
//! The scheduler that decides when an interval ends lives outside this crate;
//! it calls [`IntervalWindow::rotate`] and, once per second,
//! [`IntervalWindow::tick_second`].

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;

use super::average::AverageState;
use super::counter::Counter;
use super::totals::{
    RequestKind, RequestRateAccumulator, RequestRateStats, RequestTimeAccumulator,
    RequestTimeStats, TotalCounters, TotalStats,
};
use crate::time::Timestamp;

/// Live accumulator for the interval in progress plus the last completed one.
#[derive(Debug, Default)]
pub struct IntervalWindow {
    pub live: TotalStats,
    bounds: Mutex<SessionBounds>,
    request_times: [Mutex<RequestTimeAccumulator>; 3],
    request_rates: [Mutex<RequestRateAccumulator>; 3],
    requests_this_second: [Counter; 3],
    last: Mutex<IntervalSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SessionBounds {
    min: u64,
    max: u64,
}

/// Immutable copy of a completed interval. Read-only to the export path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntervalSnapshot {
    pub counters: TotalCounters,
    pub average: AverageState,
    pub calls_duration: Duration,
    pub min_managed_sessions: u64,
    pub max_managed_sessions: u64,
    pub request_times: [RequestTimeStats; 3],
    pub request_rates: [RequestRateStats; 3],
}

impl IntervalSnapshot {
    pub fn request_time(&self, kind: RequestKind) -> RequestTimeStats {
        self.request_times[kind.index()]
    }

    pub fn request_rate(&self, kind: RequestKind) -> RequestRateStats {
        self.request_rates[kind.index()]
    }
}

impl IntervalWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session owned by this instance started; `managed` is the live
    /// session-table size minus foreign sessions.
    pub fn observe_session_start(&self, managed: u64) {
        let mut b = self.bounds.lock();
        b.max = b.max.max(managed);
    }

    /// An owned session ended.
    pub fn observe_session_end(&self, managed: u64) {
        let mut b = self.bounds.lock();
        b.min = b.min.min(managed);
    }

    /// Current (min, max) managed-session bounds of the live interval.
    pub fn session_bounds(&self) -> (u64, u64) {
        let b = self.bounds.lock();
        (b.min, b.max)
    }

    /// One offer/answer/delete request finished after `elapsed`.
    pub fn record_request(&self, kind: RequestKind, elapsed: Duration) {
        self.request_times[kind.index()].lock().record(elapsed);
        self.requests_this_second[kind.index()].increment();
    }

    /// Close the current second: fold each kind's request count into its rate stats.
    pub fn tick_second(&self) {
        for kind in RequestKind::ALL {
            let n = self.requests_this_second[kind.index()].take();
            self.request_rates[kind.index()].lock().record_second(n);
        }
    }

    /// Freeze the live accumulator into the last-interval snapshot and start a
    /// new interval. Min/max bounds restart from `managed`.
    pub fn rotate(&self, managed: u64) -> IntervalSnapshot {
        let mut last = self.last.lock();

        let (counters, average, calls_duration) = self.live.take();
        let bounds = std::mem::replace(
            &mut *self.bounds.lock(),
            SessionBounds { min: managed, max: managed },
        );
        let request_times =
            std::array::from_fn(|i| std::mem::take(&mut *self.request_times[i].lock()).stats());
        let request_rates =
            std::array::from_fn(|i| std::mem::take(&mut *self.request_rates[i].lock()).stats());

        *last = IntervalSnapshot {
            counters,
            average,
            calls_duration,
            min_managed_sessions: bounds.min,
            max_managed_sessions: bounds.max,
            request_times,
            request_rates,
        };
        last.clone()
    }

    pub fn last(&self) -> IntervalSnapshot {
        self.last.lock().clone()
    }
}

/// Duration of a call that is creditable to the interval starting at
/// `interval_start`.
///
/// When the interval boundary has already moved past `call_stop`, it is rolled
/// back by whole intervals (rounding up) until it no longer is. A reference
/// later than `call_start` replaces it as the lower bound. Returns `None` and
/// logs when the result would be negative.
pub fn credited_duration(
    call_start: Timestamp,
    call_stop: Timestamp,
    interval_start: Option<Timestamp>,
    interval_secs: u64,
) -> Option<Duration> {
    let mut start = call_start;

    if let Some(iv_start) = interval_start {
        let mut reference = iv_start;

        if reference > call_stop && interval_secs > 0 {
            let gap = reference.as_micros() - call_stop.as_micros();
            let step = interval_secs as i64 * 1_000_000;
            let whole = (gap + step - 1) / step;
            reference = iv_start - Duration::from_secs(whole as u64 * interval_secs);
        }

        if reference > call_start {
            start = reference;
        }
    }

    let duration = call_stop.checked_since(start);
    if duration.is_none() {
        error!(
            call_start = call_start.as_micros(),
            call_stop = call_stop.as_micros(),
            credited_start = start.as_micros(),
            "Call start seems to exceed call stop"
        );
    }
    duration
}

impl TotalStats {
    /// Add a call's creditable duration to this accumulator's duration sum.
    /// An inconsistent call is logged and skipped.
    pub fn record_duration(
        &self,
        call_start: Timestamp,
        call_stop: Timestamp,
        interval_start: Option<Timestamp>,
        interval_secs: u64,
    ) {
        if let Some(d) = credited_duration(call_start, call_stop, interval_start, interval_secs) {
            self.add_call_duration(d);
        }
    }
}
