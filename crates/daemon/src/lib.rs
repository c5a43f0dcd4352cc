//! Media relay statistics daemon.
//!
//! Owns the process-wide [`Statistics`] and the state it reads from at export
//! time: the session table, the control peers and the local interfaces.

pub mod config;
pub mod control;
pub mod exposition;
pub mod http;
pub mod ports;
pub mod registry;
pub mod scheduler;

use std::sync::Arc;

use relay_stats::accounting::{ControlPeerStats, ControlPeerTable};
use relay_stats::export::{Collaborators, InterfaceSnapshot};
use relay_stats::{Statistics, Timestamp};

use config::Config;
use ports::Interfaces;
use registry::SessionTable;
use scheduler::IntervalClock;

#[derive(Debug)]
pub struct Daemon {
    pub stats: Arc<Statistics>,
    pub sessions: SessionTable,
    pub peers: ControlPeerTable,
    pub interfaces: Arc<Interfaces>,
    pub clock: Arc<IntervalClock>,
}

impl Daemon {
    pub fn new(config: &Config, started: Timestamp) -> Self {
        let stats = Arc::new(Statistics::new(started));
        let interfaces = Arc::new(Interfaces::from_config(&config.interfaces));
        let clock = Arc::new(IntervalClock::new(config.interval_seconds, Some(started)));
        Self {
            sessions: SessionTable::new(
                Arc::clone(&stats),
                Arc::clone(&interfaces),
                Arc::clone(&clock),
            ),
            peers: ControlPeerTable::new(),
            stats,
            interfaces,
            clock,
        }
    }

    /// Release what the statistics hold beyond plain counters.
    pub fn shutdown(&self) {
        tracing::info!(
            sessions = self.sessions.len(),
            managed = self.stats.totals.managed_sessions(),
            "Shutting down"
        );
        self.stats.teardown();
    }
}

impl Collaborators for Daemon {
    fn session_count(&self) -> u64 {
        self.sessions.len() as u64
    }

    fn control_peers(&self) -> Vec<Arc<ControlPeerStats>> {
        self.peers.peers()
    }

    fn local_interfaces(&self) -> Vec<InterfaceSnapshot> {
        self.interfaces.snapshots()
    }
}
