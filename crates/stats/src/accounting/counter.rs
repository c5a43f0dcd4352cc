use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Lock-free 64-bit accumulator.
///
/// Updates never block and never allocate. Reads are not synchronized with any
/// other counter, so a reader may see two counters from slightly different
/// instants. Overflow wraps.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Relaxed);
    }

    #[inline]
    pub fn sub(&self, delta: u64) {
        self.0.fetch_sub(delta, Relaxed);
    }

    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    #[inline]
    pub fn decrement(&self) {
        self.sub(1);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Relaxed)
    }

    #[inline]
    pub fn set(&self, value: u64) {
        self.0.store(value, Relaxed);
    }

    /// Read and reset to zero in one step (interval rollover).
    #[inline]
    pub fn take(&self) -> u64 {
        self.0.swap(0, Relaxed)
    }
}
