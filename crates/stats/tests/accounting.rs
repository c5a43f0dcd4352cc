//! Accumulator behaviour under parallel writers, plus the algebraic
//! properties of the rolling average and the call-duration rollback.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use proptest::prelude::*;
use rayon::prelude::*;
use relay_stats::accounting::{
    CodecRateTable, CountOp, MediaFamilies, MonologueReport, Ownership, PacketTotals, RequestKind,
    RollingAverage, SessionInfo, SessionReport, StreamReport, TermReason, credited_duration,
};
use relay_stats::{Statistics, Timestamp};

struct Call {
    ownership: Ownership,
    offer: MediaFamilies,
    answer: MediaFamilies,
    counted: AtomicBool,
}

impl Call {
    fn own(offer: MediaFamilies, answer: MediaFamilies) -> Self {
        Self { ownership: Ownership::Own, offer, answer, counted: AtomicBool::new(false) }
    }
}

impl SessionInfo for Call {
    fn ownership(&self) -> Ownership {
        self.ownership
    }
    fn offer_families(&self) -> MediaFamilies {
        self.offer
    }
    fn answer_families(&self) -> MediaFamilies {
        self.answer
    }
    fn media_counted(&self) -> &AtomicBool {
        &self.counted
    }
}

fn ts(secs: i64) -> Timestamp {
    Timestamp::from_secs(secs)
}

// ---------------------------------------------------------------------------
// Parallel writers
// ---------------------------------------------------------------------------

#[test]
fn parallel_packet_totals_add_up() {
    let stats = Statistics::new(ts(0));
    (0..10_000u64).into_par_iter().for_each(|i| {
        stats.update_totals(&PacketTotals {
            packets: 1,
            bytes: i % 7,
            errors: u64::from(i % 100 == 0),
        });
    });

    let expected_bytes: u64 = (0..10_000u64).map(|i| i % 7).sum();
    for t in [&stats.totals, &stats.interval.live] {
        let c = t.counters();
        assert_eq!(c.relayed_packets, 10_000);
        assert_eq!(c.relayed_bytes, expected_bytes);
        assert_eq!(c.relayed_errors, 100);
    }
}

#[test]
fn parallel_average_samples_are_all_counted() {
    let avg = RollingAverage::new();
    (0..5_000).into_par_iter().for_each(|_| avg.add_sample(Duration::from_secs(2)));
    let s = avg.snapshot();
    assert_eq!(s.samples, 5_000);
    assert_eq!(s.average, Duration::from_secs(2));
}

#[test]
fn racing_ip46_transitions_count_once() {
    let stats = Statistics::new(ts(0));
    let call = Call::own(MediaFamilies::DUAL, MediaFamilies::V6);

    (0..64).into_par_iter().for_each(|_| stats.update_ip46(&call, CountOp::Increment));
    assert_eq!(stats.current.ipv6_sessions.get(), 1);

    (0..64).into_par_iter().for_each(|_| stats.update_ip46(&call, CountOp::Decrement));
    assert_eq!(stats.current.ipv6_sessions.get(), 0);
}

#[test]
fn parallel_codec_updates_keep_lifetime_totals() {
    let table = CodecRateTable::new();
    let now = Timestamp::from_secs(500);
    (0..4_000u64).into_par_iter().for_each(|i| {
        let chain = if i % 2 == 0 { "PCMA -> opus" } else { "G722 -> PCMU" };
        table.record_packet(chain, 160, 160, now);
    });

    let all = table.snapshot_all(Timestamp::from_secs(501));
    assert_eq!(all.len(), 2);
    for chain in all {
        assert_eq!(chain.packets, 2_000);
        assert_eq!(chain.bytes, 320_000);
        let rate = chain.rate.expect("rate for the second just elapsed");
        assert_eq!(rate.packets, 2_000);
    }
}

#[test]
fn parallel_requests_feed_interval_stats() {
    let stats = Statistics::new(ts(0));
    (0..300u64).into_par_iter().for_each(|i| {
        stats.record_request(RequestKind::Answer, Duration::from_millis(1 + i % 3));
    });
    stats.tick_second();

    let snap = stats.rotate_interval(0);
    let t = snap.request_time(RequestKind::Answer);
    assert_eq!(t.count, 300);
    assert_eq!(t.min, Duration::from_millis(1));
    assert_eq!(t.max, Duration::from_millis(3));
    assert_eq!(t.avg, Duration::from_millis(2));
    assert_eq!(snap.request_rate(RequestKind::Answer).max, 300);
}

// ---------------------------------------------------------------------------
// Session teardown
// ---------------------------------------------------------------------------

fn silent(packets: u64) -> MonologueReport {
    MonologueReport {
        started: ts(10),
        terminated: ts(20),
        term_reason: TermReason::Timeout,
        rtp: Some(StreamReport { packets, sink_packets: Some(0) }),
    }
}

#[test]
fn zero_way_tally_is_halved_and_truncated() {
    let stats = Statistics::new(ts(0));
    let report = SessionReport {
        ownership: Ownership::Own,
        monologues: vec![silent(0), silent(0), silent(0)],
    };
    stats.session_closed(&report, ts(30), None, 0);

    let c = stats.totals.counters();
    assert_eq!(c.zero_way_streams, 1);
    assert_eq!(c.one_way_streams, 0);
    assert_eq!(c.timeout_sessions, 1);
}

#[test]
fn streams_without_a_sink_are_ignored() {
    let stats = Statistics::new(ts(0));
    let mut ml = silent(10);
    ml.rtp = Some(StreamReport { packets: 10, sink_packets: None });
    let report = SessionReport { ownership: Ownership::Own, monologues: vec![ml] };
    stats.session_closed(&report, ts(30), None, 0);

    let c = stats.totals.counters();
    assert_eq!(c.one_way_streams, 0);
    assert_eq!(c.zero_way_streams, 0);
}

#[test]
fn empty_session_only_counts_streams() {
    let stats = Statistics::new(ts(0));
    let report = SessionReport { ownership: Ownership::Own, monologues: Vec::new() };
    stats.session_closed(&report, ts(30), None, 0);
    assert_eq!(stats.totals.managed_sessions(), 0);
}

#[test]
fn interval_duration_uses_the_rolled_back_boundary() {
    let stats = Statistics::new(ts(0));
    let report = SessionReport {
        ownership: Ownership::Own,
        monologues: vec![MonologueReport {
            started: ts(900),
            terminated: ts(1000),
            term_reason: TermReason::Regular,
            rtp: None,
        }],
    };
    stats.session_closed(&report, ts(1000), Some(ts(1125)), 60);

    assert_eq!(stats.interval.live.calls_duration(), Duration::from_secs(55));
    assert_eq!(stats.totals.calls_duration(), Duration::from_secs(100));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn average_tracks_the_mean(samples in prop::collection::vec(0u64..1_000_000_000, 1..64)) {
        let avg = RollingAverage::new();
        for &us in &samples {
            avg.add_sample(Duration::from_micros(us));
        }
        let s = avg.snapshot();
        let n = samples.len() as u128;
        let mean = samples.iter().map(|&v| u128::from(v)).sum::<u128>() / n;

        prop_assert_eq!(s.samples, samples.len() as u64);
        // each step truncates by less than a microsecond either way
        prop_assert!(s.average.as_micros().abs_diff(mean) <= n + 1);
    }

    #[test]
    fn zero_interval_never_moves_an_earlier_boundary(
        start in 0i64..10_000,
        len in 0i64..10_000,
        offset in 0i64..10_000,
    ) {
        let stop = start + len;
        let boundary = (start - 5_000 + offset).min(stop);
        let d = credited_duration(ts(start), ts(stop), Some(ts(boundary)), 0).unwrap();
        let credited_start = boundary.max(start);
        prop_assert_eq!(d, Duration::from_secs((stop - credited_start) as u64));
    }

    #[test]
    fn rollback_lands_within_one_interval_of_the_stop(
        stop in 10_000i64..20_000,
        gap in 1i64..100_000,
        iv in 1u64..600,
    ) {
        // call started long before any candidate boundary
        let d = credited_duration(ts(0), ts(stop), Some(ts(stop + gap)), iv).unwrap();
        let step = iv as i64;
        let back = (gap + step - 1) / step * step;
        let reference = stop + gap - back;
        prop_assert!(reference <= stop && stop - reference < step);
        prop_assert_eq!(d, Duration::from_secs((stop - reference.max(0)) as u64));
    }
}
