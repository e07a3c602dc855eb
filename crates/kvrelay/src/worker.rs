//! Background backlog worker
//!
//! One long-lived thread per store:
//! 1. Initialize: retry [`ConnectionManager::initialize`] with a fixed backoff
//!    until the connection is ready or shutdown is requested. Nothing is
//!    drained in this phase.
//! 2. Drain: every poll interval run one drain pass. Replays never go back
//!    through the backlog path; failures are put back by the pass itself.
//!
//! The thread is detached. Shutdown is coordinated through the backlog queue's
//! flags rather than a join.
//!
//! [`ConnectionManager::initialize`]: crate::lifecycle::ConnectionManager::initialize

use crate::backlog::DrainReport;
use crate::store::StoreInner;
use kvrelay_core::{RelayError, Result, StorableValue};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) const WORKER_THREAD_NAME: &str = "kvrelay-backlog";

pub(crate) fn spawn<V: StorableValue>(inner: Arc<StoreInner<V>>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run(inner))
        .map_err(RelayError::from)
}

fn run<V: StorableValue>(inner: Arc<StoreInner<V>>) {
    let timing = inner.timing;
    tracing::debug!(
        "Backlog worker started (poll interval: {:?})",
        timing.poll_interval
    );

    // Phase 1: get connected
    loop {
        if inner.backlog.is_terminated() {
            tracing::debug!("Backlog worker stopped before connecting");
            return;
        }
        match inner.connections.initialize() {
            Ok(()) => break,
            Err(RelayError::Closed) => return,
            Err(e) => {
                tracing::debug!(
                    "Initialize failed: {}; retrying in {:?}",
                    e,
                    timing.reconnect_backoff
                );
            }
        }
        if inner.backlog.wait_timeout(timing.reconnect_backoff) {
            return;
        }
    }

    // Phase 2: drain on a fixed cadence
    while !inner.backlog.wait_timeout(timing.poll_interval) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| drain_once(&inner)));
        if let Err(payload) = outcome {
            tracing::error!("Backlog drain panicked: {}", panic_message(&*payload));
        }
    }

    tracing::debug!("Backlog worker stopped");
}

/// Run one drain pass. Returns `None` when no pass was started.
pub(crate) fn drain_once<V: StorableValue>(inner: &StoreInner<V>) -> Option<DrainReport> {
    let mut pass = inner.backlog.begin_drain(inner.clock.now())?;

    while let Some(entry) = pass.next_entry() {
        let Some(ttl) = entry.remaining_ttl(inner.clock.now()) else {
            tracing::debug!(
                "Dropping backlog entry {} for key {}: TTL elapsed while queued",
                entry.id,
                entry.key
            );
            pass.expired();
            continue;
        };

        let (id, attempts) = (entry.id, entry.attempts);
        let written_at = entry.enqueued_at.timestamp_micros();
        match inner.write(&entry.key, &entry.value, ttl, written_at) {
            Ok(executed) => {
                tracing::debug!(
                    "Delivered backlog entry {} at {} after {} failed attempt(s)",
                    id,
                    executed.consistency,
                    attempts
                );
                pass.delivered();
            }
            Err(e) => {
                tracing::warn!(
                    "Backlog entry {} for key {} not delivered: {}",
                    id,
                    entry.key,
                    e
                );
                pass.requeue();
            }
        }
    }

    let report = pass.report();
    if report != DrainReport::default() {
        tracing::info!(
            "Backlog pass: {} delivered, {} requeued, {} expired",
            report.delivered,
            report.requeued,
            report.expired
        );
    }
    Some(report)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
