//! Periodic housekeeping: the once-per-second tick and interval rotation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relay_stats::Timestamp;
use relay_stats::time::format_duration;

use crate::Daemon;

/// Where the current reporting interval started. Session teardown reads it
/// to credit call durations to the right interval.
#[derive(Debug)]
pub struct IntervalClock {
    secs: u64,
    start: Mutex<Option<Timestamp>>,
}

impl IntervalClock {
    /// `secs == 0` disables rotation; the start then never moves.
    pub fn new(secs: u64, start: Option<Timestamp>) -> Self {
        Self { secs, start: Mutex::new(start) }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn start(&self) -> Option<Timestamp> {
        *self.start.lock()
    }

    pub fn advance(&self, now: Timestamp) {
        *self.start.lock() = Some(now);
    }
}

/// Close the current interval and open the next one at `now`.
pub fn rotate(daemon: &Daemon, now: Timestamp) {
    daemon.clock.advance(now);
    let snap = daemon.stats.rotate_interval(daemon.sessions.len() as u64);
    tracing::info!(
        "Interval closed: {} calls, managed {}..{}, calls duration {}s",
        snap.average.samples,
        snap.min_managed_sessions,
        snap.max_managed_sessions,
        format_duration(snap.calls_duration),
    );
}

/// Start the tick and rotation tasks. They run until the runtime shuts down.
pub fn spawn(daemon: Arc<Daemon>) {
    let ticker = Arc::clone(&daemon);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await; // first tick is immediate, skip it
        loop {
            interval.tick().await;
            ticker.stats.tick_second();
            tracing::trace!("Second tick");
        }
    });

    let secs = daemon.clock.secs();
    if secs == 0 {
        tracing::info!("Interval rotation disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(secs));
        interval.tick().await;
        loop {
            interval.tick().await;
            tracing::debug!("Rotating interval");
            rotate(&daemon, Timestamp::now());
        }
    });
}
