//! Shared identifier generator
//!
//! One generator is constructed explicitly and shared by `Arc` with every
//! component that mints identifiers. Time-ordered ids from one generator are
//! strictly increasing, even when several are minted within the same
//! millisecond or the system clock steps backwards.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct IdGenerator {
    last_ordered: Mutex<u128>,
    minted: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A random (version 4) identifier.
    pub fn random(&self) -> Uuid {
        self.minted.fetch_add(1, Ordering::Relaxed);
        Uuid::new_v4()
    }

    /// A time-ordered (version 7) identifier, strictly greater than any
    /// previously returned by this generator.
    pub fn time_ordered(&self) -> Uuid {
        let candidate = Uuid::now_v7().as_u128();
        let mut last = self.last_ordered.lock();
        let next = if candidate > *last {
            candidate
        } else {
            // Same millisecond or clock went back: bump the random tail
            *last + 1
        };
        *last = next;
        self.minted.fetch_add(1, Ordering::Relaxed);
        Uuid::from_u128(next)
    }

    /// Number of identifiers minted so far.
    pub fn minted(&self) -> u64 {
        self.minted.load(Ordering::Relaxed)
    }
}
