//! Optional metrics instrumentation for kvrelay.
//!
//! When the `observe` feature is enabled, store, retrieve and backlog activity
//! emits counters, histograms, and gauges via the [`metrics`] crate. A
//! downstream application must install a metrics recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

use crate::consistency::Consistency;
use crate::types::Outcome;

/// Record a `store` call.
///
/// - `kvrelay.store.total` – counter with an `outcome` label
#[inline]
pub fn record_store(outcome: Outcome) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("kvrelay.store.total", "outcome" => format!("{:?}", outcome))
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = outcome;
    }
}

/// Record a `retrieve` call (counter + latency histogram).
///
/// - `kvrelay.retrieve.total` – counter with an `outcome` label
/// - `kvrelay.retrieve.duration_seconds` – histogram
#[inline]
pub fn record_retrieve(outcome: Outcome, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("kvrelay.retrieve.total", "outcome" => format!("{:?}", outcome))
            .increment(1);
        metrics::histogram!("kvrelay.retrieve.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (outcome, duration);
    }
}

/// Record that an execution moved past a consistency level that failed.
///
/// - `kvrelay.consistency.fallbacks_total` – counter with a `level` label
#[inline]
pub fn record_consistency_fallback(level: Consistency) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("kvrelay.consistency.fallbacks_total", "level" => level.as_str())
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = level;
    }
}

/// Record a backlog drain pass.
///
/// - `kvrelay.backlog.drains_total` – counter
/// - `kvrelay.backlog.delivered_total` – counter
/// - `kvrelay.backlog.requeued_total` – counter
#[inline]
pub fn record_drain(delivered: u64, requeued: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("kvrelay.backlog.drains_total").increment(1);
        metrics::counter!("kvrelay.backlog.delivered_total").increment(delivered);
        metrics::counter!("kvrelay.backlog.requeued_total").increment(requeued);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (delivered, requeued);
    }
}

/// Set the backlog depth gauge.
///
/// - `kvrelay.backlog.depth` – gauge
#[inline]
pub fn set_backlog_depth(depth: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("kvrelay.backlog.depth").set(depth as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = depth;
    }
}
