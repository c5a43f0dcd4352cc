//! The process-wide statistics aggregator.
//!
//! One [`Statistics`] is created at daemon start and handed by reference to
//! every call site that reports a lifecycle event. Tests create as many
//! independent instances as they like.

use std::sync::atomic::Ordering::{AcqRel, Acquire};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::accounting::{
    CodecRateTable, Counter, CountOp, FamilyClass, IntervalSnapshot, IntervalWindow, Ownership,
    PacketTotals, RequestKind, SessionInfo, SessionReport, TermReason, TotalStats,
};
use crate::time::Timestamp;

/// Gauges describing what is running right now.
#[derive(Debug, Default)]
pub struct CurrentStats {
    pub foreign_sessions: Counter,
    pub ipv4_sessions: Counter,
    pub ipv6_sessions: Counter,
    pub mixed_sessions: Counter,
    pub transcoded_media: Counter,
    /// Relayed packets during the last completed second.
    pub packet_rate: Counter,
    pub byte_rate: Counter,
    pub error_rate: Counter,
}

#[derive(Debug)]
pub struct Statistics {
    /// Lifetime totals.
    pub totals: TotalStats,
    /// Current reporting interval and the last completed one.
    pub interval: IntervalWindow,
    pub current: CurrentStats,
    pub codecs: CodecRateTable,
    started: Timestamp,
    /// Lifetime relayed totals at the previous per-second tick.
    rate_base: Mutex<PacketTotals>,
}

impl Statistics {
    pub fn new(started: Timestamp) -> Self {
        Self {
            totals: TotalStats::new(),
            interval: IntervalWindow::new(),
            current: CurrentStats::default(),
            codecs: CodecRateTable::new(),
            started,
            rate_base: Mutex::new(PacketTotals::default()),
        }
    }

    pub fn started(&self) -> Timestamp {
        self.started
    }

    /// Whole seconds since start.
    pub fn uptime(&self, now: Timestamp) -> u64 {
        now.saturating_since(self.started).as_secs()
    }

    /// Lifetime and current-interval accumulators, in that order.
    fn both(&self) -> [&TotalStats; 2] {
        [&self.totals, &self.interval.live]
    }

    /// Sessions owned by this instance, given the session-table size.
    pub fn managed_sessions(&self, session_count: u64) -> u64 {
        session_count.saturating_sub(self.current.foreign_sessions.get())
    }

    /// Add one relayed stream's counters to lifetime and interval totals.
    pub fn update_totals(&self, stream: &PacketTotals) {
        for t in self.both() {
            t.add_packets(stream);
        }
    }

    /// Move a session into or out of the IP-family gauges.
    ///
    /// A session whose offer or answer carries no address family is left
    /// alone. Repeating a transition without the reverse one in between is a
    /// no-op.
    pub fn update_ip46<S: SessionInfo + ?Sized>(&self, session: &S, op: CountOp) {
        let Some(class) = FamilyClass::classify(session.offer_families(), session.answer_families())
        else {
            return;
        };

        let counted = op == CountOp::Increment;
        if session
            .media_counted()
            .compare_exchange(!counted, counted, AcqRel, Acquire)
            .is_err()
        {
            return;
        }

        let gauge = match class {
            FamilyClass::Ipv4 => &self.current.ipv4_sessions,
            FamilyClass::Ipv6 => &self.current.ipv6_sessions,
            FamilyClass::Mixed => &self.current.mixed_sessions,
        };
        match op {
            CountOp::Increment => gauge.increment(),
            CountOp::Decrement => gauge.decrement(),
        }
    }

    /// A session was added to the table, which now holds `session_count` entries.
    pub fn session_started<S: SessionInfo + ?Sized>(&self, session: &S, session_count: u64) {
        match session.ownership() {
            Ownership::Own => self
                .interval
                .observe_session_start(self.managed_sessions(session_count)),
            Ownership::Foreign => {
                self.current.foreign_sessions.increment();
                self.totals.foreign_sessions.increment();
            }
        }
    }

    /// A session was removed from the table, which now holds `session_count` entries.
    pub fn session_ended<S: SessionInfo + ?Sized>(&self, session: &S, session_count: u64) {
        match session.ownership() {
            Ownership::Own => self
                .interval
                .observe_session_end(self.managed_sessions(session_count)),
            Ownership::Foreign => self.current.foreign_sessions.decrement(),
        }
    }

    pub fn session_rejected(&self) {
        for t in self.both() {
            t.rejected_sessions.increment();
        }
    }

    /// Teardown accounting for a finished session.
    ///
    /// Counts one-way and zero-way streams, then credits the first
    /// participant's termination reason, duration sample and call duration.
    /// `interval_start` and `interval_secs` locate the current reporting
    /// interval for the interval duration sum.
    pub fn session_closed(
        &self,
        report: &SessionReport,
        now: Timestamp,
        interval_start: Option<Timestamp>,
        interval_secs: u64,
    ) {
        let own = report.ownership == Ownership::Own;

        let mut no_packets_relayed = 0u64;
        for ml in &report.monologues {
            let Some(rtp) = ml.rtp else { continue };
            if rtp.sink_packets != Some(0) {
                continue;
            }
            if rtp.packets != 0 && own {
                for t in self.both() {
                    t.one_way_streams.increment();
                }
            } else {
                no_packets_relayed += 1;
            }
        }

        // each silent pair is seen once from either side
        if own {
            for t in self.both() {
                t.zero_way_streams.add(no_packets_relayed / 2);
            }
        }

        let Some(first) = report.monologues.first() else {
            return;
        };

        if own {
            for t in self.both() {
                t.count_termination(first.term_reason);
            }
            let elapsed = now.saturating_since(first.started);
            self.totals.average.add_sample(elapsed);
            self.interval.live.average.add_sample(elapsed);

            self.interval
                .live
                .record_duration(first.started, first.terminated, interval_start, interval_secs);
            self.totals
                .record_duration(first.started, first.terminated, None, 0);
        } else if first.term_reason == TermReason::FinalTimeout {
            for t in self.both() {
                t.count_termination(TermReason::FinalTimeout);
            }
        }
    }

    /// One offer, answer or delete request was processed in `elapsed`.
    pub fn record_request(&self, kind: RequestKind, elapsed: Duration) {
        self.interval.record_request(kind, elapsed);
    }

    pub fn transcoder_started(&self, chain: &str) {
        self.codecs.transcoder_started(chain);
        self.current.transcoded_media.increment();
    }

    pub fn transcoder_stopped(&self, chain: &str) {
        self.codecs.transcoder_stopped(chain);
        self.current.transcoded_media.decrement();
    }

    pub fn record_transcoded_packet(&self, chain: &str, bytes: u64, samples: u64, now: Timestamp) {
        self.codecs.record_packet(chain, bytes, samples, now);
    }

    /// Once-per-second housekeeping: request-rate sampling and the current
    /// packet/byte/error rates.
    pub fn tick_second(&self) {
        self.interval.tick_second();

        let now = PacketTotals {
            packets: self.totals.relayed_packets.get(),
            bytes: self.totals.relayed_bytes.get(),
            errors: self.totals.relayed_errors.get(),
        };
        let prev = std::mem::replace(&mut *self.rate_base.lock(), now);
        self.current.packet_rate.set(now.packets.wrapping_sub(prev.packets));
        self.current.byte_rate.set(now.bytes.wrapping_sub(prev.bytes));
        self.current.error_rate.set(now.errors.wrapping_sub(prev.errors));
    }

    /// Close the current reporting interval.
    pub fn rotate_interval(&self, session_count: u64) -> IntervalSnapshot {
        let snap = self.interval.rotate(self.managed_sessions(session_count));
        debug!(
            managed = snap.average.samples,
            min = snap.min_managed_sessions,
            max = snap.max_managed_sessions,
            "interval rotated"
        );
        snap
    }

    /// Release the codec-chain table.
    pub fn teardown(&self) {
        self.codecs.clear();
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(Timestamp::now())
    }
}
