//! Per-controller request statistics.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use super::totals::RequestKind;

/// Commands a control peer can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NgCommand {
    Ping,
    Offer,
    Answer,
    Delete,
    Query,
    List,
    StartRecording,
    StopRecording,
    StartForwarding,
    StopForwarding,
    BlockDtmf,
    UnblockDtmf,
    BlockMedia,
    UnblockMedia,
    PlayMedia,
    StopMedia,
    PlayDtmf,
    Statistics,
}

impl NgCommand {
    pub const COUNT: usize = 18;

    pub const ALL: [NgCommand; Self::COUNT] = [
        NgCommand::Ping,
        NgCommand::Offer,
        NgCommand::Answer,
        NgCommand::Delete,
        NgCommand::Query,
        NgCommand::List,
        NgCommand::StartRecording,
        NgCommand::StopRecording,
        NgCommand::StartForwarding,
        NgCommand::StopForwarding,
        NgCommand::BlockDtmf,
        NgCommand::UnblockDtmf,
        NgCommand::BlockMedia,
        NgCommand::UnblockMedia,
        NgCommand::PlayMedia,
        NgCommand::StopMedia,
        NgCommand::PlayDtmf,
        NgCommand::Statistics,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Wire name, as sent in the `command` key of a request.
    pub const fn name(self) -> &'static str {
        match self {
            NgCommand::Ping => "ping",
            NgCommand::Offer => "offer",
            NgCommand::Answer => "answer",
            NgCommand::Delete => "delete",
            NgCommand::Query => "query",
            NgCommand::List => "list",
            NgCommand::StartRecording => "start recording",
            NgCommand::StopRecording => "stop recording",
            NgCommand::StartForwarding => "start forwarding",
            NgCommand::StopForwarding => "stop forwarding",
            NgCommand::BlockDtmf => "block DTMF",
            NgCommand::UnblockDtmf => "unblock DTMF",
            NgCommand::BlockMedia => "block media",
            NgCommand::UnblockMedia => "unblock media",
            NgCommand::PlayMedia => "play media",
            NgCommand::StopMedia => "stop media",
            NgCommand::PlayDtmf => "play DTMF",
            NgCommand::Statistics => "statistics",
        }
    }

    /// Column heading; lowercased it also prefixes the per-command metric labels.
    pub const fn short_name(self) -> &'static str {
        match self {
            NgCommand::Ping => "Ping",
            NgCommand::Offer => "Offer",
            NgCommand::Answer => "Answer",
            NgCommand::Delete => "Delete",
            NgCommand::Query => "Query",
            NgCommand::List => "List",
            NgCommand::StartRecording => "StartRec",
            NgCommand::StopRecording => "StopRec",
            NgCommand::StartForwarding => "StartFwd",
            NgCommand::StopForwarding => "StopFwd",
            NgCommand::BlockDtmf => "BlkDTMF",
            NgCommand::UnblockDtmf => "UnblkDTMF",
            NgCommand::BlockMedia => "BlkMedia",
            NgCommand::UnblockMedia => "UnblkMedia",
            NgCommand::PlayMedia => "PlayMedia",
            NgCommand::StopMedia => "StopMedia",
            NgCommand::PlayDtmf => "PlayDTMF",
            NgCommand::Statistics => "Statistics",
        }
    }

    pub fn from_name(name: &str) -> Option<NgCommand> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// The interval-timed request type, for the three commands that have one.
    pub const fn request_kind(self) -> Option<RequestKind> {
        match self {
            NgCommand::Offer => Some(RequestKind::Offer),
            NgCommand::Answer => Some(RequestKind::Answer),
            NgCommand::Delete => Some(RequestKind::Delete),
            _ => None,
        }
    }
}

/// Count and cumulative processing time of one command type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandStats {
    pub count: u64,
    pub time: Duration,
}

/// Statistics of a single control peer. Each command slot has its own lock.
#[derive(Debug)]
pub struct ControlPeerStats {
    addr: IpAddr,
    commands: [Mutex<CommandStats>; NgCommand::COUNT],
    errors: AtomicU64,
}

impl ControlPeerStats {
    pub fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            commands: Default::default(),
            errors: AtomicU64::new(0),
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn record(&self, cmd: NgCommand, elapsed: Duration) {
        let mut slot = self.commands[cmd.index()].lock();
        slot.count += 1;
        slot.time += elapsed;
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Relaxed);
    }

    pub fn command(&self, cmd: NgCommand) -> CommandStats {
        *self.commands[cmd.index()].lock()
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Relaxed)
    }
}

/// All peers that have ever sent a request, keyed by source IP address.
#[derive(Debug, Default)]
pub struct ControlPeerTable {
    peers: Mutex<HashMap<IpAddr, Arc<ControlPeerStats>>>,
}

impl ControlPeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a peer, creating its entry on first contact.
    pub fn peer(&self, addr: IpAddr) -> Arc<ControlPeerStats> {
        let mut peers = self.peers.lock();
        Arc::clone(
            peers
                .entry(addr)
                .or_insert_with(|| Arc::new(ControlPeerStats::new(addr))),
        )
    }

    /// Every known peer, ordered by address.
    pub fn peers(&self) -> Vec<Arc<ControlPeerStats>> {
        let mut all: Vec<_> = self.peers.lock().values().cloned().collect();
        all.sort_by_key(|p| p.addr());
        all
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_table_is_consistent() {
        for (i, cmd) in NgCommand::ALL.into_iter().enumerate() {
            assert_eq!(cmd.index(), i);
            assert_eq!(NgCommand::from_name(cmd.name()), Some(cmd));
        }
        assert_eq!(NgCommand::from_name("OFFER"), Some(NgCommand::Offer));
        assert_eq!(NgCommand::from_name("bogus"), None);
    }

    #[test]
    fn peer_entries_are_shared() {
        let table = ControlPeerTable::new();
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        table.peer(addr).record(NgCommand::Offer, Duration::from_millis(3));
        table.peer(addr).record(NgCommand::Offer, Duration::from_millis(2));
        table.peer(addr).record_error();

        assert_eq!(table.len(), 1);
        let p = table.peer(addr);
        assert_eq!(
            p.command(NgCommand::Offer),
            CommandStats { count: 2, time: Duration::from_millis(5) }
        );
        assert_eq!(p.command(NgCommand::Answer).count, 0);
        assert_eq!(p.errors(), 1);
    }
}
