//! Local interfaces and their media port pools.
//!
//! Pools only account for allocations so the statistics can report usage;
//! no socket is ever bound here.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering::Relaxed};

use parking_lot::Mutex;
use relay_stats::export::{AddressFamily, InterfaceSnapshot};

use crate::config::InterfaceConfig;

#[derive(Debug)]
pub struct PortPool {
    min: u16,
    max: u16,
    used: Mutex<BTreeSet<u16>>,
    free: AtomicU32,
    last_used: AtomicU16,
}

impl PortPool {
    pub fn new(min: u16, max: u16) -> Self {
        Self {
            min,
            max,
            used: Mutex::new(BTreeSet::new()),
            free: AtomicU32::new(u32::from(max - min) + 1),
            last_used: AtomicU16::new(0),
        }
    }

    /// Take the next free port after the last one handed out, wrapping
    /// around the range. `None` when the pool is exhausted.
    pub fn allocate(&self) -> Option<u16> {
        let mut used = self.used.lock();
        let span = u32::from(self.max - self.min) + 1;
        let last = self.last_used.load(Relaxed);
        let start = if (self.min..self.max).contains(&last) { last + 1 } else { self.min };

        let port = (0..span)
            .map(|i| {
                let offset = (u32::from(start - self.min) + i) % span;
                self.min + offset as u16
            })
            .find(|p| !used.contains(p))?;

        used.insert(port);
        self.free.fetch_sub(1, Relaxed);
        self.last_used.store(port, Relaxed);
        Some(port)
    }

    /// Return a port. Releasing a port that is not in use is ignored.
    pub fn release(&self, port: u16) {
        if self.used.lock().remove(&port) {
            self.free.fetch_add(1, Relaxed);
        }
    }

    pub fn free(&self) -> u32 {
        self.free.load(Relaxed)
    }

    pub fn last_used(&self) -> u16 {
        self.last_used.load(Relaxed)
    }
}

/// One address of a logical interface together with its port pool.
#[derive(Debug)]
pub struct LocalInterface {
    pub name: String,
    pub address: IpAddr,
    pub preferred_family: AddressFamily,
    pub pool: PortPool,
}

impl LocalInterface {
    pub fn snapshot(&self) -> InterfaceSnapshot {
        InterfaceSnapshot {
            name: self.name.clone(),
            address: self.address,
            preferred_family: self.preferred_family,
            port_min: self.pool.min,
            port_max: self.pool.max,
            free_ports: self.pool.free(),
            last_used: self.pool.last_used(),
        }
    }
}

/// Every configured interface address, in configuration order.
#[derive(Debug, Default)]
pub struct Interfaces {
    list: Vec<LocalInterface>,
}

/// A port handed out by [`Interfaces::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLease {
    pub interface: usize,
    pub address: IpAddr,
    pub port: u16,
}

impl Interfaces {
    pub fn from_config(configs: &[InterfaceConfig]) -> Self {
        let mut list: Vec<LocalInterface> = Vec::with_capacity(configs.len());
        for c in configs {
            let preferred_family = list
                .iter()
                .find(|l| l.name == c.name)
                .map_or(AddressFamily::of(&c.address), |l| l.preferred_family);
            list.push(LocalInterface {
                name: c.name.clone(),
                address: c.address,
                preferred_family,
                pool: PortPool::new(c.port_min, c.port_max),
            });
        }
        Self { list }
    }

    /// Allocate from the first address of `name` (any interface when `None`)
    /// in the interface's preferred family that still has a free port.
    pub fn allocate(&self, name: Option<&str>) -> Option<PortLease> {
        self.list
            .iter()
            .enumerate()
            .filter(|(_, l)| name.is_none_or(|n| n == l.name))
            .filter(|(_, l)| AddressFamily::of(&l.address) == l.preferred_family)
            .find_map(|(i, l)| {
                l.pool.allocate().map(|port| PortLease { interface: i, address: l.address, port })
            })
    }

    pub fn release(&self, lease: PortLease) {
        if let Some(l) = self.list.get(lease.interface) {
            l.pool.release(lease.port);
        }
    }

    pub fn snapshots(&self) -> Vec<InterfaceSnapshot> {
        self.list.iter().map(LocalInterface::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_wraps_and_exhausts() {
        let pool = PortPool::new(100, 102);
        assert_eq!(pool.allocate(), Some(100));
        assert_eq!(pool.allocate(), Some(101));
        pool.release(100);
        assert_eq!(pool.allocate(), Some(102));
        assert_eq!(pool.allocate(), Some(100));
        assert_eq!(pool.allocate(), None);
        assert_eq!(pool.free(), 0);
        assert_eq!(pool.last_used(), 100);
    }

    #[test]
    fn double_release_is_ignored() {
        let pool = PortPool::new(5000, 5009);
        let p = pool.allocate().unwrap();
        pool.release(p);
        pool.release(p);
        assert_eq!(pool.free(), 10);
    }

    #[test]
    fn preferred_family_comes_from_first_address() {
        let ifs = Interfaces::from_config(&[
            InterfaceConfig {
                name: "pub".into(),
                address: "192.0.2.1".parse().unwrap(),
                port_min: 1000,
                port_max: 1001,
            },
            InterfaceConfig {
                name: "pub".into(),
                address: "2001:db8::1".parse().unwrap(),
                port_min: 1000,
                port_max: 1001,
            },
        ]);
        let snaps = ifs.snapshots();
        assert!(snaps[0].is_first_order());
        assert!(!snaps[1].is_first_order());

        let lease = ifs.allocate(Some("pub")).unwrap();
        assert_eq!(lease.interface, 0);
        assert!(ifs.allocate(Some("other")).is_none());
    }
}
