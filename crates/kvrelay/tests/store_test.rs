//! Store and retrieve against an in-memory cluster

mod common;

use common::{manual_config, open, open_with, TABLE};
use kvrelay::prelude::*;
use std::fmt::Debug;
use uuid::Uuid;

fn roundtrip<V: StorableValue + PartialEq + Debug>(value: V) {
    let h = open::<V>();

    let stored = h.store.store(7i64, value.clone(), 0);
    assert_eq!(stored.outcome(), Outcome::Success, "{}", stored.message());
    assert_eq!(stored.message(), "Value stored successfully");

    let read = h.store.retrieve(7i64);
    assert_eq!(read.outcome(), Outcome::Success, "{}", read.message());
    assert_eq!(read.message(), "Value read successfully");
    assert_eq!(read.value(), Some(&value));
    assert!(read.rows()[0].residual_key.is_empty());
}

#[test]
fn test_roundtrip_every_value_type() {
    roundtrip(-5i8);
    roundtrip(1_000i16);
    roundtrip(-70_000i32);
    roundtrip(i64::MAX);
    roundtrip(u32::MAX);
    roundtrip(1.5f32);
    roundtrip(-2.25f64);
    roundtrip(true);
    roundtrip("something".to_string());
    roundtrip(vec![0u8, 1, 2, 255]);
    roundtrip(Uuid::new_v4());
}

#[test]
fn test_missing_key_not_found() {
    let h = open::<String>();
    let read = h.store.retrieve(404i64);
    assert_eq!(read.outcome(), Outcome::NotFound);
    assert_eq!(read.message(), "Value not found");
    assert!(read.value().is_none());
    assert!(!bool::from(&read));
}

#[test]
fn test_overwrite_keeps_latest() {
    let h = open::<String>();
    h.store.store(1i64, "first".to_string(), 0);
    h.clock.advance_secs(1);
    h.store.store(1i64, "second".to_string(), 0);

    assert_eq!(
        h.store.retrieve(1i64).into_value().as_deref(),
        Some("second")
    );
    assert_eq!(h.cluster.row_count(TABLE), 1);
}

#[test]
fn test_ttl_expires_value() {
    let h = open::<String>();
    h.store.store(1i64, "short".to_string(), 60);
    h.store.store(2i64, "forever".to_string(), 0);

    h.clock.advance_secs(59);
    assert!(h.store.retrieve(1i64).is_success());

    h.clock.advance_secs(2);
    assert_eq!(h.store.retrieve(1i64).outcome(), Outcome::NotFound);
    assert!(h.store.retrieve(2i64).is_success());
}

#[test]
fn test_wrong_key_type_is_bind_error() {
    let h = open::<String>();

    let stored = h.store.store("not-a-number", "v".to_string(), 0);
    assert_eq!(stored.outcome(), Outcome::BindError);
    assert_eq!(stored.outcome().code(), -7);
    // Malformed keys never reach the backlog
    assert_eq!(h.store.backlog_len(), 0);

    assert_eq!(
        h.store.retrieve("not-a-number").outcome(),
        Outcome::BindError
    );
}

#[test]
fn test_out_of_range_ttl_is_never_backlogged() {
    let h = open::<String>();

    for mode in [
        BacklogMode::Allow,
        BacklogMode::UseOnlyBacklog,
        BacklogMode::Disallow,
    ] {
        let stored = h.store.store_with_mode(1i64, "v".to_string(), u32::MAX, mode);
        assert_eq!(stored.outcome(), Outcome::BindError, "{:?}", mode);
    }
    assert_eq!(h.store.backlog_len(), 0);
    assert!(h.cluster.executions().is_empty());

    // The largest TTL the column holds is still accepted
    let stored = h.store.store(1i64, "v".to_string(), i32::MAX as u32);
    assert!(stored.is_success(), "{}", stored.message());
}

#[test]
fn test_wrong_key_arity_is_bind_error() {
    let h = open_with::<String>(
        manual_config("tenant, id"),
        vec![ValueType::Text, ValueType::BigInt],
        true,
    );

    // Writes need the full key
    assert_eq!(
        h.store.store("acme", "v".to_string(), 0).outcome(),
        Outcome::BindError
    );
    assert_eq!(
        h.store
            .store(("acme", 1i64, 2i64), "v".to_string(), 0)
            .outcome(),
        Outcome::BindError
    );
    assert_eq!(
        h.store.retrieve(Key::new(Vec::new())).outcome(),
        Outcome::BindError
    );
    assert!(h.cluster.executions().is_empty());
}

#[test]
fn test_default_key_types_are_text() {
    common::init_tracing();
    let config = manual_config("name");
    let clock = Arc::new(ManualClock::starting_now());
    let cluster = common::cluster_for::<i64>(&config, &[ValueType::Text], clock.clone());

    let store: KvStore<i64> = KvStore::builder(config)
        .with_driver(Arc::new(cluster))
        .with_clock(clock)
        .open()
        .unwrap();

    assert!(store.store("answer", 42, 0).is_success());
    assert_eq!(store.retrieve("answer").into_value(), Some(42));
}

#[test]
fn test_open_without_driver_fails() {
    let result = KvStore::<String>::builder(manual_config("id")).open();
    assert!(matches!(result, Err(RelayError::Config(_))));
}

#[test]
fn test_open_file_uses_config() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kvrelay.conf");
    std::fs::write(
        &path,
        "# store settings\ntable = test.kv\nkey_field = id\nvalue_field = payload\n",
    )
    .unwrap();

    let clock = Arc::new(ManualClock::starting_now());
    let config = StoreConfig::from_file(&path);
    let cluster = common::cluster_for::<String>(&config, &[ValueType::BigInt], clock);

    let store: KvStore<String> =
        KvStore::open_file(&path, Arc::new(cluster), vec![ValueType::BigInt]).unwrap();
    assert_eq!(store.config().table(), TABLE);
    assert_eq!(store.connection_state(), ConnectionState::Ready);
    assert!(store.store(9i64, "x".to_string(), 0).is_success());
}
