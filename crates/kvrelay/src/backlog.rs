//! In-process backlog of writes awaiting delivery
//!
//! The queue is shared between callers (which enqueue) and the background
//! worker (which drains). A drain pass takes the whole queue out under the lock
//! and processes it outside the lock. When the pass ends, entries that failed
//! are put back at the front, in their original relative order and ahead of
//! anything enqueued meanwhile.
//!
//! Shutdown and draining are coordinated through the same lock: once shutdown
//! has been requested no new pass can start, and the owner polls
//! [`BacklogQueue::is_draining`] until an in-flight pass has finished.

use chrono::{DateTime, Utc};
use kvrelay_core::{observe, Key};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// A write waiting in the backlog
#[derive(Debug, Clone, PartialEq)]
pub struct BacklogEntry<V> {
    pub id: Uuid,
    pub key: Key,
    pub value: V,
    /// TTL requested by the caller; 0 means no expiry
    pub ttl_secs: u32,
    /// When the caller asked for the write
    pub enqueued_at: DateTime<Utc>,
    /// Failed delivery attempts so far
    pub attempts: u32,
}

impl<V> BacklogEntry<V> {
    /// TTL still owed at `now`, or `None` once the original TTL has elapsed.
    ///
    /// Rounds down, so a replayed value never outlives
    /// `enqueued_at + ttl_secs`.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<u32> {
        if self.ttl_secs == 0 {
            return Some(0);
        }
        let elapsed_ms = (now - self.enqueued_at).num_milliseconds().max(0);
        let remaining_ms = i64::from(self.ttl_secs) * 1000 - elapsed_ms;
        let remaining_secs = remaining_ms / 1000;
        if remaining_secs <= 0 {
            None
        } else {
            u32::try_from(remaining_secs).ok()
        }
    }
}

/// Backlog counters
#[derive(Debug, Default)]
pub struct BacklogMetrics {
    /// Entries accepted
    pub enqueued: AtomicU64,

    /// Entries written by a drain pass
    pub delivered: AtomicU64,

    /// Failed retries put back at the front
    pub requeued: AtomicU64,

    /// Entries dropped because their TTL ran out while queued
    pub expired: AtomicU64,

    /// Entries dropped by shutdown
    pub discarded: AtomicU64,

    pub drain_passes: AtomicU64,

    /// Unix time (ms) of the last drain pass
    pub last_drain: AtomicI64,
}

impl BacklogMetrics {
    fn record_pass(&self, at: DateTime<Utc>) {
        self.drain_passes.fetch_add(1, Ordering::Relaxed);
        self.last_drain
            .store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BacklogMetricsSnapshot {
        BacklogMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            drain_passes: self.drain_passes.load(Ordering::Relaxed),
            last_drain: self.last_drain.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of backlog counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BacklogMetricsSnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub requeued: u64,
    pub expired: u64,
    pub discarded: u64,
    pub drain_passes: u64,
    pub last_drain: i64,
}

/// What `request_shutdown` observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownTicket {
    /// A drain pass was running when the flag was set
    pub was_draining: bool,
    /// Queued entries dropped
    pub discarded: usize,
}

struct QueueState<V> {
    entries: VecDeque<BacklogEntry<V>>,
    terminate: bool,
}

pub struct BacklogQueue<V> {
    state: Mutex<QueueState<V>>,
    wake: Condvar,
    draining: AtomicBool,
    terminated: AtomicBool,
    metrics: BacklogMetrics,
}

impl<V> Default for BacklogQueue<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> BacklogQueue<V> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                terminate: false,
            }),
            wake: Condvar::new(),
            draining: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            metrics: BacklogMetrics::default(),
        }
    }

    /// Append an entry. Returns false, dropping the entry, after shutdown.
    pub fn push(&self, entry: BacklogEntry<V>) -> bool {
        let mut state = self.state.lock();
        if state.terminate {
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.entries.push_back(entry);
        self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        observe::set_backlog_depth(state.entries.len());
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// True while a drain pass is running.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> &BacklogMetrics {
        &self.metrics
    }

    /// Take every queued entry for processing.
    ///
    /// Returns `None` when there is nothing to do, another pass is running, or
    /// shutdown has been requested.
    pub fn begin_drain(&self, now: DateTime<Utc>) -> Option<DrainPass<'_, V>> {
        let mut state = self.state.lock();
        if state.terminate || state.entries.is_empty() || self.is_draining() {
            return None;
        }
        self.draining.store(true, Ordering::Release);
        self.metrics.record_pass(now);
        let pending = std::mem::take(&mut state.entries);
        observe::set_backlog_depth(0);
        Some(DrainPass {
            queue: self,
            pending,
            current: None,
            failed: VecDeque::new(),
            delivered: 0,
            expired: 0,
        })
    }

    /// Stop accepting and draining entries.
    ///
    /// Records whether a pass is running, clears the queue and sets the
    /// terminate flag in one critical section.
    pub fn request_shutdown(&self) -> ShutdownTicket {
        let mut state = self.state.lock();
        let was_draining = self.is_draining();
        let discarded = state.entries.len();
        state.entries.clear();
        state.terminate = true;
        self.terminated.store(true, Ordering::Release);
        self.metrics
            .discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        self.wake.notify_all();
        observe::set_backlog_depth(0);
        ShutdownTicket {
            was_draining,
            discarded,
        }
    }

    /// Sleep up to `timeout`, waking early on shutdown. Returns true once
    /// shutdown has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if !state.terminate {
            let _ = self.wake.wait_for(&mut state, timeout);
        }
        state.terminate
    }
}

impl<V: Clone> BacklogQueue<V> {
    /// Copy of the queued entries, front first.
    pub fn snapshot(&self) -> Vec<BacklogEntry<V>> {
        self.state.lock().entries.iter().cloned().collect()
    }
}

/// Counts from one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: usize,
    pub requeued: usize,
    pub expired: usize,
}

/// Entries taken out of the queue for one pass
///
/// Entries are handed out one at a time and stay owned by the pass until they
/// are settled with [`delivered`](Self::delivered), [`requeue`](Self::requeue)
/// or [`expired`](Self::expired). Dropping the pass puts failed, in-flight and
/// unprocessed entries back at the front of the queue (or discards them after
/// shutdown) and clears the draining flag, also when the pass unwinds.
pub struct DrainPass<'a, V> {
    queue: &'a BacklogQueue<V>,
    pending: VecDeque<BacklogEntry<V>>,
    current: Option<BacklogEntry<V>>,
    failed: VecDeque<BacklogEntry<V>>,
    delivered: usize,
    expired: usize,
}

impl<V> DrainPass<'_, V> {
    /// Next entry to deliver. Stops early once shutdown is requested.
    ///
    /// An entry still unsettled from the previous call is kept as failed.
    pub fn next_entry(&mut self) -> Option<&BacklogEntry<V>> {
        self.settle_failed();
        if self.queue.is_terminated() {
            return None;
        }
        self.current = self.pending.pop_front();
        self.current.as_ref()
    }

    pub fn delivered(&mut self) {
        if self.current.take().is_some() {
            self.delivered += 1;
            self.queue.metrics.delivered.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Keep the current entry for reinsertion.
    pub fn requeue(&mut self) {
        self.settle_failed();
    }

    pub fn expired(&mut self) {
        if self.current.take().is_some() {
            self.expired += 1;
            self.queue.metrics.expired.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn settle_failed(&mut self) {
        if let Some(mut entry) = self.current.take() {
            entry.attempts = entry.attempts.saturating_add(1);
            self.failed.push_back(entry);
        }
    }

    pub fn report(&self) -> DrainReport {
        DrainReport {
            delivered: self.delivered,
            requeued: self.failed.len(),
            expired: self.expired,
        }
    }
}

impl<V> Drop for DrainPass<'_, V> {
    fn drop(&mut self) {
        // An entry still in flight here was interrupted, most likely by a panic
        self.settle_failed();
        let mut state = self.queue.state.lock();
        let mut returned = std::mem::take(&mut self.failed);
        let requeued = returned.len() as u64;
        returned.append(&mut self.pending);

        if state.terminate {
            self.queue
                .metrics
                .discarded
                .fetch_add(returned.len() as u64, Ordering::Relaxed);
        } else {
            self.queue
                .metrics
                .requeued
                .fetch_add(requeued, Ordering::Relaxed);
            returned.append(&mut state.entries);
            state.entries = returned;
            observe::set_backlog_depth(state.entries.len());
        }

        observe::record_drain(self.delivered as u64, requeued);
        self.queue.draining.store(false, Ordering::Release);
    }
}
