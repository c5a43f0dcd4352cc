//! Session table.
//!
//! Tracks just enough per call for the statistics: ownership, the address
//! families each side offered, per-leg packet counters and the media port
//! each leg holds. Every transition is reported to [`Statistics`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Result, anyhow, bail};
use parking_lot::{Mutex, RwLock};
use relay_stats::accounting::{
    CountOp, MediaFamilies, MonologueReport, Ownership, PacketTotals, SessionInfo, SessionReport,
    StreamReport, TermReason,
};
use relay_stats::{Statistics, Timestamp};
use serde::Serialize;

use crate::ports::{Interfaces, PortLease};
use crate::scheduler::IntervalClock;

/// One participant of a call.
#[derive(Debug, Clone, Serialize)]
pub struct Leg {
    pub tag: String,
    #[serde(skip)]
    pub started: Timestamp,
    /// Counters of the stream this leg sends to us.
    pub received: PacketTotals,
    /// Packets relayed out of this leg's stream towards the other side.
    pub forwarded: u64,
    pub port: Option<u16>,
    #[serde(skip)]
    lease: Option<PortLease>,
}

impl Leg {
    fn new(tag: &str, started: Timestamp, lease: Option<PortLease>) -> Self {
        Self {
            tag: tag.to_owned(),
            started,
            received: PacketTotals::default(),
            forwarded: 0,
            port: lease.map(|l| l.port),
            lease,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub call_id: String,
    pub created: Timestamp,
    ownership: Ownership,
    families: RwLock<(MediaFamilies, MediaFamilies)>,
    media_counted: AtomicBool,
    legs: Mutex<Vec<Leg>>,
    transcoding: Option<String>,
}

impl Session {
    pub fn legs(&self) -> Vec<Leg> {
        self.legs.lock().clone()
    }

    pub fn transcoding(&self) -> Option<&str> {
        self.transcoding.as_deref()
    }

    /// Snapshot for teardown accounting. Each leg's stream has a sink only
    /// once the other side has answered.
    fn report(&self, reason: TermReason, now: Timestamp) -> SessionReport {
        let legs = self.legs.lock();
        let has_sink = legs.len() > 1;
        let monologues = legs
            .iter()
            .map(|leg| MonologueReport {
                started: leg.started,
                terminated: now,
                term_reason: reason,
                rtp: Some(StreamReport {
                    packets: leg.received.packets,
                    sink_packets: has_sink.then_some(leg.forwarded),
                }),
            })
            .collect();
        SessionReport { ownership: self.ownership, monologues }
    }
}

impl SessionInfo for Session {
    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn offer_families(&self) -> MediaFamilies {
        self.families.read().0
    }

    fn answer_families(&self) -> MediaFamilies {
        self.families.read().1
    }

    fn media_counted(&self) -> &AtomicBool {
        &self.media_counted
    }
}

/// What an `offer` asks for.
#[derive(Debug, Clone, Default)]
pub struct OfferParams {
    pub from_tag: String,
    pub ownership: Option<Ownership>,
    pub families: MediaFamilies,
    pub interface: Option<String>,
    pub transcode: Option<String>,
}

/// Thread-safe table of all active sessions, keyed by call id.
#[derive(Debug)]
pub struct SessionTable {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    stats: Arc<Statistics>,
    interfaces: Arc<Interfaces>,
    clock: Arc<IntervalClock>,
}

impl SessionTable {
    pub fn new(
        stats: Arc<Statistics>,
        interfaces: Arc<Interfaces>,
        clock: Arc<IntervalClock>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            stats,
            interfaces,
            clock,
        }
    }

    /// Create a session, or update the offer side of an existing one.
    /// Returns the session and the port allocated for the offering leg.
    ///
    /// Lookup, port allocation and insertion happen under one write lock, so
    /// concurrent offers for a new call id create and count it exactly once.
    pub fn offer(
        &self,
        call_id: &str,
        params: OfferParams,
        now: Timestamp,
    ) -> Result<(Arc<Session>, Option<u16>)> {
        let mut sessions = self.sessions.write();

        if let Some(existing) = sessions.get(call_id).cloned() {
            drop(sessions);
            let port = self.reoffer(&existing, &params);
            return Ok((existing, port));
        }

        let Some(lease) = self.interfaces.allocate(params.interface.as_deref()) else {
            drop(sessions);
            self.stats.session_rejected();
            bail!("Ran out of ports");
        };

        let session = Arc::new(Session {
            call_id: call_id.to_owned(),
            created: now,
            ownership: params.ownership.unwrap_or(Ownership::Own),
            families: RwLock::new((params.families, MediaFamilies::NONE)),
            media_counted: AtomicBool::new(false),
            legs: Mutex::new(vec![Leg::new(&params.from_tag, now, Some(lease))]),
            transcoding: params.transcode,
        });

        sessions.insert(call_id.to_owned(), Arc::clone(&session));
        self.stats.session_started(session.as_ref(), sessions.len() as u64);
        if let Some(chain) = session.transcoding() {
            self.stats.transcoder_started(chain);
        }
        drop(sessions);

        tracing::debug!(call_id, port = lease.port, "Session created");
        Ok((session, Some(lease.port)))
    }

    fn reoffer(&self, session: &Session, params: &OfferParams) -> Option<u16> {
        self.stats.update_ip46(session, CountOp::Decrement);
        session.families.write().0 = params.families;
        self.stats.update_ip46(session, CountOp::Increment);
        session
            .legs
            .lock()
            .iter()
            .find(|l| l.tag == params.from_tag)
            .and_then(|l| l.port)
    }

    /// Add the answering leg and count the session in the IP-family gauges.
    pub fn answer(
        &self,
        call_id: &str,
        to_tag: &str,
        families: MediaFamilies,
        now: Timestamp,
    ) -> Result<(Arc<Session>, Option<u16>)> {
        let session = self
            .get(call_id)
            .ok_or_else(|| anyhow!("Unknown call-id"))?;

        let port = {
            let mut legs = session.legs.lock();
            match legs.iter().find(|l| l.tag == to_tag) {
                Some(leg) => leg.port,
                None => {
                    let lease = self.interfaces.allocate(None);
                    legs.push(Leg::new(to_tag, now, lease));
                    lease.map(|l| l.port)
                }
            }
        };

        self.stats.update_ip46(session.as_ref(), CountOp::Decrement);
        session.families.write().1 = families;
        self.stats.update_ip46(session.as_ref(), CountOp::Increment);

        Ok((session, port))
    }

    /// Tear a session down and run its teardown accounting.
    pub fn delete(
        &self,
        call_id: &str,
        reason: TermReason,
        now: Timestamp,
    ) -> Result<SessionReport> {
        let (session, count) = {
            let mut sessions = self.sessions.write();
            let session = sessions
                .remove(call_id)
                .ok_or_else(|| anyhow!("Unknown call-id"))?;
            (session, sessions.len())
        };

        self.stats.update_ip46(session.as_ref(), CountOp::Decrement);
        for leg in session.legs.lock().iter() {
            if let Some(lease) = leg.lease {
                self.interfaces.release(lease);
            }
            self.stats.update_totals(&leg.received);
        }
        if let Some(chain) = session.transcoding() {
            self.stats.transcoder_stopped(chain);
        }
        self.stats.session_ended(session.as_ref(), count as u64);

        let report = session.report(reason, now);
        self.stats
            .session_closed(&report, now, self.clock.start(), self.clock.secs());

        tracing::debug!(call_id, ?reason, "Session deleted");
        Ok(report)
    }

    /// Account relayed media for the leg tagged `tag`. Packets count as
    /// forwarded once another leg exists to receive them.
    pub fn record_media(&self, call_id: &str, tag: &str, totals: PacketTotals) -> Result<()> {
        let session = self
            .get(call_id)
            .ok_or_else(|| anyhow!("Unknown call-id"))?;
        let mut legs = session.legs.lock();
        let has_sink = legs.len() > 1;
        let leg = legs
            .iter_mut()
            .find(|l| l.tag == tag)
            .ok_or_else(|| anyhow!("Unknown tag"))?;
        leg.received.packets += totals.packets;
        leg.received.bytes += totals.bytes;
        leg.received.errors += totals.errors;
        if has_sink {
            leg.forwarded += totals.packets;
        }
        Ok(())
    }

    /// One packet went through the session's transcoder.
    pub fn record_transcoded(
        &self,
        call_id: &str,
        bytes: u64,
        samples: u64,
        now: Timestamp,
    ) -> Result<()> {
        let session = self
            .get(call_id)
            .ok_or_else(|| anyhow!("Unknown call-id"))?;
        let chain = session
            .transcoding()
            .ok_or_else(|| anyhow!("Session is not transcoding"))?;
        self.stats.record_transcoded_packet(chain, bytes, samples, now);
        Ok(())
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(call_id).cloned()
    }

    /// Call ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of sessions, foreign ones included.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Sessions this instance is authoritative for.
    pub fn managed_count(&self) -> u64 {
        self.stats.managed_sessions(self.len() as u64)
    }
}
