//! Per-chain transcoding throughput.
//!
//! Each chain keeps atomic lifetime counters plus a two-slot ring of
//! per-second counters indexed by `second mod 2`. A slot is stamped with the
//! second it belongs to and is only reported as a rate while that second is
//! exactly the one that just elapsed. Stale slots are detected at read time,
//! so nothing ever sweeps the table.
//!
//! The ring sits behind a per-chain mutex: restamping a slot and adding to it
//! must not interleave, or packets recorded during the reset are lost.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering::Relaxed};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::time::Timestamp;

/// One second's worth of traffic.
#[derive(Debug, Clone, Copy)]
struct Slot {
    second: i64,
    rate: CodecRate,
}

impl Default for Slot {
    fn default() -> Self {
        Self { second: i64::MIN, rate: CodecRate { packets: 0, bytes: 0, samples: 0 } }
    }
}

/// Counters for a single transcoding chain, e.g. `"PCMA -> opus"`.
#[derive(Debug, Default)]
pub struct CodecChainStats {
    transcoders: AtomicI64,
    packets: AtomicU64,
    bytes: AtomicU64,
    samples: AtomicU64,
    slots: Mutex<[Slot; 2]>,
}

/// Throughput of the most recently completed second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CodecRate {
    pub packets: u64,
    pub bytes: u64,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodecChainSnapshot {
    pub chain: String,
    pub transcoders: i64,
    /// Absent when the chain saw no traffic in the last completed second.
    pub rate: Option<CodecRate>,
    pub packets: u64,
    pub bytes: u64,
    pub samples: u64,
}

impl CodecChainStats {
    fn record(&self, bytes: u64, samples: u64, second: i64) {
        self.packets.fetch_add(1, Relaxed);
        self.bytes.fetch_add(bytes, Relaxed);
        self.samples.fetch_add(samples, Relaxed);

        let mut slots = self.slots.lock();
        let slot = &mut slots[second.rem_euclid(2) as usize];
        if slot.second != second {
            *slot = Slot { second, ..Slot::default() };
        }
        slot.rate.packets += 1;
        slot.rate.bytes += bytes;
        slot.rate.samples += samples;
    }

    fn snapshot(&self, chain: &str, now: Timestamp) -> CodecChainSnapshot {
        let last = now.as_secs() - 1;
        let slot = self.slots.lock()[last.rem_euclid(2) as usize];
        let rate = (slot.second == last).then_some(slot.rate);
        CodecChainSnapshot {
            chain: chain.to_owned(),
            transcoders: self.transcoders.load(Relaxed),
            rate,
            packets: self.packets.load(Relaxed),
            bytes: self.bytes.load(Relaxed),
            samples: self.samples.load(Relaxed),
        }
    }
}

/// Table of codec chains. Entries are created on first observation and live
/// until [`CodecRateTable::clear`].
///
/// The map's shard locks guard only the key set; a lookup hands out an `Arc`
/// and releases the shard immediately.
#[derive(Debug, Default)]
pub struct CodecRateTable {
    chains: DashMap<String, Arc<CodecChainStats>>,
}

impl CodecRateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, chain: &str) -> Arc<CodecChainStats> {
        if let Some(e) = self.chains.get(chain) {
            return Arc::clone(&e);
        }
        Arc::clone(&self.chains.entry(chain.to_owned()).or_default())
    }

    /// Account one packet of `bytes` carrying `samples` decoded samples.
    pub fn record_packet(&self, chain: &str, bytes: u64, samples: u64, now: Timestamp) {
        self.entry(chain).record(bytes, samples, now.as_secs());
    }

    pub fn transcoder_started(&self, chain: &str) {
        self.entry(chain).transcoders.fetch_add(1, Relaxed);
    }

    pub fn transcoder_stopped(&self, chain: &str) {
        self.entry(chain).transcoders.fetch_sub(1, Relaxed);
    }

    pub fn snapshot(&self, chain: &str, now: Timestamp) -> Option<CodecChainSnapshot> {
        self.chains.get(chain).map(|e| e.snapshot(chain, now))
    }

    /// Snapshot of every chain, sorted by chain name.
    pub fn snapshot_all(&self, now: Timestamp) -> Vec<CodecChainSnapshot> {
        let mut all: Vec<_> = self
            .chains
            .iter()
            .map(|e| e.value().snapshot(e.key(), now))
            .collect();
        all.sort_by(|a, b| a.chain.cmp(&b.chain));
        all
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Drop every chain (teardown).
    pub fn clear(&self) {
        self.chains.clear();
    }
}
