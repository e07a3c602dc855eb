//! Shared fixtures for the integration tests

#![allow(dead_code)]

use kvrelay::prelude::*;
use kvrelay_memory::{MemoryCluster, TableSchema};
use std::time::{Duration, Instant};

pub const TABLE: &str = "test.kv";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config whose worker never wakes on its own; tests drive drains by hand.
pub fn manual_config(key_fields: &str) -> StoreConfig {
    StoreConfig::from_options([
        ("table", TABLE),
        ("key_field", key_fields),
        ("value_field", "payload"),
        ("connect_timeout_ms", "500"),
        ("request_timeout_ms", "500"),
        ("backlog_poll_interval_ms", "3600000"),
        ("reconnect_backoff_ms", "3600000"),
        ("shutdown_poll_interval_ms", "5"),
    ])
}

/// Config whose worker polls every few milliseconds.
pub fn fast_config(key_fields: &str) -> StoreConfig {
    manual_config(key_fields)
        .with_option("backlog_poll_interval_ms", "10")
        .with_option("reconnect_backoff_ms", "10")
}

pub struct Harness<V: StorableValue> {
    pub store: KvStore<V>,
    pub cluster: MemoryCluster,
    pub clock: Arc<ManualClock>,
}

pub fn cluster_for<V: StorableValue>(
    config: &StoreConfig,
    key_types: &[ValueType],
    clock: Arc<ManualClock>,
) -> MemoryCluster {
    let cluster = MemoryCluster::with_clock(clock);
    cluster.create_table(TableSchema::for_store(config, key_types, V::VALUE_TYPE).unwrap());
    cluster
}

/// Open a store over a fresh cluster, optionally unreachable at open.
pub fn open_with<V: StorableValue>(
    config: StoreConfig,
    key_types: Vec<ValueType>,
    reachable: bool,
) -> Harness<V> {
    init_tracing();
    let clock = Arc::new(ManualClock::starting_now());
    let cluster = cluster_for::<V>(&config, &key_types, Arc::clone(&clock));
    cluster.set_reachable(reachable);

    let store = KvStore::builder(config)
        .with_driver(Arc::new(cluster.clone()))
        .with_key_types(key_types)
        .with_clock(clock.clone())
        .open()
        .unwrap();

    Harness {
        store,
        cluster,
        clock,
    }
}

/// Store keyed by a single bigint column
pub fn open<V: StorableValue>() -> Harness<V> {
    open_with(manual_config("id"), vec![ValueType::BigInt], true)
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
