//! What the statistics need to know about a session.
//!
//! The session model itself lives elsewhere; it hands in either a live
//! [`SessionInfo`] (ownership and IP-family transitions) or a finished
//! [`SessionReport`] (teardown accounting).

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use super::totals::TermReason;
use crate::time::Timestamp;

/// Whether this instance or a cluster peer is authoritative for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Own,
    Foreign,
}

/// Address families present in one side's media description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaFamilies {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl MediaFamilies {
    pub const V4: MediaFamilies = MediaFamilies { ipv4: true, ipv6: false };
    pub const V6: MediaFamilies = MediaFamilies { ipv4: false, ipv6: true };
    pub const DUAL: MediaFamilies = MediaFamilies { ipv4: true, ipv6: true };
    pub const NONE: MediaFamilies = MediaFamilies { ipv4: false, ipv6: false };
}

/// Which IP-family gauge a session counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyClass {
    Ipv4,
    Ipv6,
    Mixed,
}

impl FamilyClass {
    /// Classify by offer and answer families. `None` when either side has no
    /// address family at all.
    pub fn classify(offer: MediaFamilies, answer: MediaFamilies) -> Option<FamilyClass> {
        use FamilyClass::*;

        let side = |f: MediaFamilies| match (f.ipv4, f.ipv6) {
            (true, false) => Some(Ipv4),
            (false, true) => Some(Ipv6),
            (true, true) => Some(Mixed),
            (false, false) => None,
        };

        Some(match (side(offer)?, side(answer)?) {
            (Ipv4, Ipv4) | (Ipv4, Mixed) => Ipv4,
            (Ipv4, Ipv6) | (Ipv6, Ipv4) => Mixed,
            (Ipv6, Ipv6) | (Ipv6, Mixed) => Ipv6,
            (Mixed, Ipv4) => Ipv4,
            (Mixed, Ipv6) => Ipv6,
            (Mixed, Mixed) => Mixed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOp {
    Increment,
    Decrement,
}

/// Live view of a session, implemented by the session model.
pub trait SessionInfo {
    fn ownership(&self) -> Ownership;

    fn offer_families(&self) -> MediaFamilies;

    fn answer_families(&self) -> MediaFamilies;

    /// Set while the session is included in the IP-family gauges. Guards
    /// against counting the same session twice under racing start/stop.
    fn media_counted(&self) -> &AtomicBool;
}

/// First RTP stream of a participant and the packets its sink relayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub packets: u64,
    /// `None` when the stream has no sink.
    pub sink_packets: Option<u64>,
}

/// One participant ("monologue") of a terminated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonologueReport {
    pub started: Timestamp,
    pub terminated: Timestamp,
    pub term_reason: TermReason,
    /// `None` when the participant has no RTP stream.
    pub rtp: Option<StreamReport>,
}

/// Read snapshot of a session at teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub ownership: Ownership,
    pub monologues: Vec<MonologueReport>,
}

#[cfg(test)]
mod tests {
    use super::FamilyClass::*;
    use super::*;

    #[test]
    fn classification_table() {
        let v4 = MediaFamilies::V4;
        let v6 = MediaFamilies::V6;
        let both = MediaFamilies::DUAL;
        let none = MediaFamilies::NONE;

        assert_eq!(FamilyClass::classify(v4, v4), Some(Ipv4));
        assert_eq!(FamilyClass::classify(v4, v6), Some(Mixed));
        assert_eq!(FamilyClass::classify(v4, both), Some(Ipv4));
        assert_eq!(FamilyClass::classify(v6, v4), Some(Mixed));
        assert_eq!(FamilyClass::classify(v6, v6), Some(Ipv6));
        assert_eq!(FamilyClass::classify(v6, both), Some(Ipv6));
        assert_eq!(FamilyClass::classify(both, v4), Some(Ipv4));
        assert_eq!(FamilyClass::classify(both, v6), Some(Ipv6));
        assert_eq!(FamilyClass::classify(both, both), Some(Mixed));
        assert_eq!(FamilyClass::classify(none, v4), None);
        assert_eq!(FamilyClass::classify(v4, none), None);
    }
}
