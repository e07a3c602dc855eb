//! Connection lifecycle and the shutdown handshake

mod common;

use common::{fast_config, manual_config, open, open_with, wait_until};
use kvrelay::prelude::*;
use std::time::Duration;

#[test]
fn test_open_connects_and_prepares() {
    let h = open_with::<String>(
        manual_config("tenant, id"),
        vec![ValueType::Text, ValueType::BigInt],
        true,
    );
    assert_eq!(h.store.connection_state(), ConnectionState::Ready);
    assert_eq!(h.cluster.open_sessions(), 1);
}

#[test]
fn test_failed_open_then_manual_drain() {
    let h = open_with::<String>(manual_config("id"), vec![ValueType::BigInt], false);
    assert_ne!(h.store.connection_state(), ConnectionState::Ready);
    assert_eq!(h.cluster.open_sessions(), 0);

    let read = h.store.retrieve(1i64);
    assert_eq!(read.outcome(), Outcome::SessionFailed);
    assert_eq!(read.outcome().code(), -2);

    assert_eq!(
        h.store.store(1i64, "held".to_string(), 0).outcome(),
        Outcome::Backlogged
    );

    h.cluster.set_reachable(true);
    let report = h.store.drain_backlog().unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(h.store.connection_state(), ConnectionState::Ready);
    assert!(h.store.retrieve(1i64).is_success());
}

#[test]
fn test_worker_retries_initialize() {
    let h = open_with::<String>(fast_config("id"), vec![ValueType::BigInt], false);
    h.store.store(1i64, "held".to_string(), 0);

    assert!(wait_until(Duration::from_secs(1), || h
        .cluster
        .connect_attempts()
        >= 3));
    assert_ne!(h.store.connection_state(), ConnectionState::Ready);

    h.cluster.set_reachable(true);
    assert!(wait_until(Duration::from_secs(5), || {
        h.store.connection_state() == ConnectionState::Ready && h.store.backlog_len() == 0
    }));
    assert!(wait_until(Duration::from_secs(5), || h
        .store
        .retrieve(1i64)
        .is_success()));
}

#[test]
fn test_prepare_failure_is_reported() {
    common::init_tracing();
    let config = manual_config("id");
    let clock = Arc::new(ManualClock::starting_now());
    let cluster = common::cluster_for::<String>(&config, &[ValueType::BigInt], clock.clone());
    cluster.fail_prepare_matching("SELECT");

    let store: KvStore<String> = KvStore::builder(config)
        .with_driver(Arc::new(cluster.clone()))
        .with_key_types(vec![ValueType::BigInt])
        .with_clock(clock)
        .open()
        .unwrap();

    // One attempt from open, one from the worker
    assert!(wait_until(Duration::from_secs(5), || {
        cluster.connect_attempts() >= 2 && store.connection_state() == ConnectionState::Failed
    }));
    // The half-built connection is released
    assert_eq!(cluster.open_sessions(), 0);

    let read = store.retrieve(1i64);
    assert_eq!(read.outcome(), Outcome::PreparedSelectFailed);
    assert_eq!(read.outcome().code(), -4);
    assert_eq!(
        store
            .store_with_mode(1i64, "v".to_string(), 0, BacklogMode::Disallow)
            .outcome(),
        Outcome::PreparedSelectFailed
    );
}

#[test]
fn test_insert_prepare_failure_is_reported() {
    common::init_tracing();
    let config = manual_config("id");
    let clock = Arc::new(ManualClock::starting_now());
    let cluster = common::cluster_for::<String>(&config, &[ValueType::BigInt], clock.clone());
    cluster.fail_prepare_matching("INSERT");

    let store: KvStore<String> = KvStore::builder(config)
        .with_driver(Arc::new(cluster))
        .with_key_types(vec![ValueType::BigInt])
        .with_clock(clock)
        .open()
        .unwrap();

    assert_eq!(
        store.retrieve(1i64).outcome(),
        Outcome::PreparedInsertFailed
    );
}

#[test]
fn test_shutdown_releases_everything() {
    let h = open::<String>();
    h.store
        .store_with_mode(1i64, "a".to_string(), 0, BacklogMode::UseOnlyBacklog);
    h.store
        .store_with_mode(2i64, "b".to_string(), 0, BacklogMode::UseOnlyBacklog);

    let report = h.store.shutdown();
    assert_eq!(report.discarded, 2);
    assert!(!report.waited_for_drain);
    assert!(report.released_connection);

    assert_eq!(h.store.connection_state(), ConnectionState::Closed);
    assert_eq!(h.cluster.open_sessions(), 0);
    assert_eq!(h.store.backlog_len(), 0);
    assert_eq!(h.store.backlog_metrics().discarded, 2);

    // Idempotent
    assert_eq!(h.store.shutdown(), ShutdownReport::default());
}

#[test]
fn test_calls_after_shutdown_fail() {
    let h = open::<String>();
    h.store.shutdown();

    let stored = h.store.store(1i64, "late".to_string(), 0);
    assert_eq!(stored.outcome(), Outcome::SessionFailed);
    let queued = h
        .store
        .store_with_mode(1i64, "late".to_string(), 0, BacklogMode::UseOnlyBacklog);
    assert_eq!(queued.outcome(), Outcome::SessionFailed);
    assert_eq!(h.store.retrieve(1i64).outcome(), Outcome::SessionFailed);
    assert!(h.store.drain_backlog().is_none());
}

#[test]
fn test_shutdown_waits_for_drain() {
    let h = open::<String>();
    h.cluster.set_latency(Duration::from_millis(100));
    for key in 0..20i64 {
        h.store
            .store_with_mode(key, "slow".to_string(), 0, BacklogMode::UseOnlyBacklog);
    }

    let drained = std::thread::scope(|scope| {
        let drain = scope.spawn(|| h.store.drain_backlog());

        assert!(wait_until(Duration::from_secs(5), || h
            .store
            .is_processing_backlog()));
        let report = h.store.shutdown();
        assert!(report.waited_for_drain);
        assert_eq!(report.discarded, 0);

        // The pass was finished before the connection went away
        assert!(!h.store.is_processing_backlog());
        assert_eq!(h.cluster.open_sessions(), 0);
        drain.join().unwrap()
    });

    let drained = drained.unwrap();
    assert!(drained.delivered < 20);
    assert_eq!(h.store.backlog_len(), 0);

    let metrics = h.store.backlog_metrics();
    assert_eq!(metrics.delivered, drained.delivered as u64);
    assert_eq!(metrics.delivered + metrics.discarded, 20);
}

#[test]
fn test_drop_shuts_down() {
    let h = open::<String>();
    let cluster = h.cluster.clone();
    assert_eq!(cluster.open_sessions(), 1);

    drop(h);
    assert_eq!(cluster.open_sessions(), 0);
}

#[test]
fn test_tls_files_missing_fail_session() {
    let config = manual_config("id").with_option("server_trusted_cert", "/nonexistent/ca.pem");
    let h = open_with::<String>(config, vec![ValueType::BigInt], true);

    assert_ne!(h.store.connection_state(), ConnectionState::Ready);
    assert_eq!(h.cluster.connect_attempts(), 0);
    assert_eq!(h.store.retrieve(1i64).outcome(), Outcome::SessionFailed);
}
