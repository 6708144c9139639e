//! Live-record counters for tombstone configurations.

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Counter of live (non-dead) records.
///
/// Policies without tombstones use [`NoCount`]; there the store length is
/// the live count and the counter is never consulted.
pub trait LiveCount: Default {
    fn get(&self) -> usize;
    fn set(&self, n: usize);
    fn increment(&self);
    fn decrement(&self);
}

/// Inert counter for policies where every stored record is live.
#[derive(Default, Debug)]
pub struct NoCount;

impl LiveCount for NoCount {
    fn get(&self) -> usize {
        0
    }
    fn set(&self, _n: usize) {}
    fn increment(&self) {}
    fn decrement(&self) {}
}

/// Single-threaded counter.
#[derive(Default, Debug)]
pub struct PlainCount(Cell<usize>);

impl LiveCount for PlainCount {
    fn get(&self) -> usize {
        self.0.get()
    }

    fn set(&self, n: usize) {
        self.0.set(n);
    }

    fn increment(&self) {
        self.0.set(self.0.get() + 1);
    }

    fn decrement(&self) {
        let c = self.0.get();
        assert!(c > 0, "live counter underflow");
        self.0.set(c - 1);
    }
}

/// Atomic counter so `len()` stays readable while other threads hold
/// shared references to the container.
#[derive(Default, Debug)]
pub struct AtomicCount(AtomicUsize);

impl LiveCount for AtomicCount {
    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn set(&self, n: usize) {
        self.0.store(n, Ordering::Relaxed);
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement(&self) {
        let prev = self.0.fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "live counter underflow");
    }
}
