//! One set of process-wide accumulators.
//!
//! The same [`TotalStats`] shape is used twice: once for lifetime totals and
//! once as the live accumulator of the current reporting interval.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::average::{AverageState, RollingAverage};
use super::counter::Counter;

/// Why a session's first participant terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermReason {
    Unknown,
    Regular,
    Forced,
    Timeout,
    SilentTimeout,
    OfferTimeout,
    FinalTimeout,
}

/// The three timed request types of the interval statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Offer,
    Answer,
    Delete,
}

impl RequestKind {
    pub const ALL: [RequestKind; 3] =
        [RequestKind::Offer, RequestKind::Answer, RequestKind::Delete];

    pub const fn index(self) -> usize {
        match self {
            RequestKind::Offer => 0,
            RequestKind::Answer => 1,
            RequestKind::Delete => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            RequestKind::Offer => "offer",
            RequestKind::Answer => "answer",
            RequestKind::Delete => "delete",
        }
    }
}

/// Packet counters of one relayed stream, added to the totals on teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PacketTotals {
    pub packets: u64,
    pub bytes: u64,
    pub errors: u64,
}

/// Accumulators shared by the lifetime and the interval view.
#[derive(Debug, Default)]
pub struct TotalStats {
    /// Sample count doubles as the managed-session count.
    pub average: RollingAverage,
    pub rejected_sessions: Counter,
    pub timeout_sessions: Counter,
    pub silent_timeout_sessions: Counter,
    pub final_timeout_sessions: Counter,
    pub offer_timeout_sessions: Counter,
    pub regular_term_sessions: Counter,
    pub forced_term_sessions: Counter,
    pub relayed_packets: Counter,
    pub relayed_errors: Counter,
    pub relayed_bytes: Counter,
    pub zero_way_streams: Counter,
    pub one_way_streams: Counter,
    pub foreign_sessions: Counter,
    calls_duration: Mutex<Duration>,
}

/// Plain copy of every counter in a [`TotalStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalCounters {
    pub rejected_sessions: u64,
    pub timeout_sessions: u64,
    pub silent_timeout_sessions: u64,
    pub final_timeout_sessions: u64,
    pub offer_timeout_sessions: u64,
    pub regular_term_sessions: u64,
    pub forced_term_sessions: u64,
    pub relayed_packets: u64,
    pub relayed_errors: u64,
    pub relayed_bytes: u64,
    pub zero_way_streams: u64,
    pub one_way_streams: u64,
    pub foreign_sessions: u64,
}

impl TotalStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a termination reason. `Unknown` is not tallied.
    pub fn count_termination(&self, reason: TermReason) {
        let counter = match reason {
            TermReason::Timeout => &self.timeout_sessions,
            TermReason::SilentTimeout => &self.silent_timeout_sessions,
            TermReason::OfferTimeout => &self.offer_timeout_sessions,
            TermReason::FinalTimeout => &self.final_timeout_sessions,
            TermReason::Regular => &self.regular_term_sessions,
            TermReason::Forced => &self.forced_term_sessions,
            TermReason::Unknown => return,
        };
        counter.increment();
    }

    pub fn add_packets(&self, totals: &PacketTotals) {
        self.relayed_packets.add(totals.packets);
        self.relayed_errors.add(totals.errors);
        self.relayed_bytes.add(totals.bytes);
    }

    pub fn add_call_duration(&self, d: Duration) {
        *self.calls_duration.lock() += d;
    }

    pub fn calls_duration(&self) -> Duration {
        *self.calls_duration.lock()
    }

    pub fn managed_sessions(&self) -> u64 {
        self.average.samples()
    }

    pub fn counters(&self) -> TotalCounters {
        TotalCounters {
            rejected_sessions: self.rejected_sessions.get(),
            timeout_sessions: self.timeout_sessions.get(),
            silent_timeout_sessions: self.silent_timeout_sessions.get(),
            final_timeout_sessions: self.final_timeout_sessions.get(),
            offer_timeout_sessions: self.offer_timeout_sessions.get(),
            regular_term_sessions: self.regular_term_sessions.get(),
            forced_term_sessions: self.forced_term_sessions.get(),
            relayed_packets: self.relayed_packets.get(),
            relayed_errors: self.relayed_errors.get(),
            relayed_bytes: self.relayed_bytes.get(),
            zero_way_streams: self.zero_way_streams.get(),
            one_way_streams: self.one_way_streams.get(),
            foreign_sessions: self.foreign_sessions.get(),
        }
    }

    /// Read every counter, the average and the duration sum, zeroing each.
    pub(crate) fn take(&self) -> (TotalCounters, AverageState, Duration) {
        let counters = TotalCounters {
            rejected_sessions: self.rejected_sessions.take(),
            timeout_sessions: self.timeout_sessions.take(),
            silent_timeout_sessions: self.silent_timeout_sessions.take(),
            final_timeout_sessions: self.final_timeout_sessions.take(),
            offer_timeout_sessions: self.offer_timeout_sessions.take(),
            regular_term_sessions: self.regular_term_sessions.take(),
            forced_term_sessions: self.forced_term_sessions.take(),
            relayed_packets: self.relayed_packets.take(),
            relayed_errors: self.relayed_errors.take(),
            relayed_bytes: self.relayed_bytes.take(),
            zero_way_streams: self.zero_way_streams.take(),
            one_way_streams: self.one_way_streams.take(),
            foreign_sessions: self.foreign_sessions.take(),
        };
        let average = self.average.take();
        let duration = std::mem::take(&mut *self.calls_duration.lock());
        (counters, average, duration)
    }
}

// ── Request timing ───────────────────────────────────────────────────────

/// Running min/max/sum of request processing times within one interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestTimeAccumulator {
    min: Option<Duration>,
    max: Duration,
    total: Duration,
    count: u64,
}

/// Min/max/avg request processing delay over a completed interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestTimeStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub count: u64,
}

impl RequestTimeAccumulator {
    pub fn record(&mut self, d: Duration) {
        self.min = Some(self.min.map_or(d, |m| m.min(d)));
        self.max = self.max.max(d);
        self.total += d;
        self.count += 1;
    }

    pub fn stats(&self) -> RequestTimeStats {
        let avg = match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => {
                Duration::from_micros((self.total.as_micros() / u128::from(self.count)) as u64)
            }
        };
        RequestTimeStats {
            min: self.min.unwrap_or_default(),
            max: self.max,
            avg,
            count: self.count,
        }
    }
}

// ── Request rates ────────────────────────────────────────────────────────

/// Requests-per-second extremes and mean, fed one completed second at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestRateAccumulator {
    min: Option<u64>,
    max: u64,
    sum: u64,
    seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestRateStats {
    pub min: u64,
    pub max: u64,
    pub avg: u64,
}

impl RequestRateAccumulator {
    pub fn record_second(&mut self, requests: u64) {
        self.min = Some(self.min.map_or(requests, |m| m.min(requests)));
        self.max = self.max.max(requests);
        self.sum = self.sum.wrapping_add(requests);
        self.seconds += 1;
    }

    pub fn stats(&self) -> RequestRateStats {
        RequestRateStats {
            min: self.min.unwrap_or(0),
            max: self.max,
            avg: self.sum.checked_div(self.seconds).unwrap_or(0),
        }
    }
}
