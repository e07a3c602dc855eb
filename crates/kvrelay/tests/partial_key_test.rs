//! Composite keys and prefix reads

mod common;

use common::{manual_config, open_with, Harness};
use kvrelay::prelude::*;
use kvrelay_memory::StatementKind;

fn open_three_column() -> Harness<String> {
    open_with(
        manual_config("tenant, user_id, seq"),
        vec![ValueType::Text, ValueType::BigInt, ValueType::Int],
        true,
    )
}

fn seed(h: &Harness<String>) {
    for (tenant, user, seq, body) in [
        ("acme", 1i64, 1i32, "a-1-1"),
        ("acme", 1, 2, "a-1-2"),
        ("acme", 2, 1, "a-2-1"),
        ("globex", 1, 1, "g-1-1"),
    ] {
        let stored = h.store.store((tenant, user, seq), body.to_string(), 0);
        assert!(stored.is_success(), "{}", stored.message());
    }
}

#[test]
fn test_prefix_of_one_returns_residual_keys() {
    let h = open_three_column();
    seed(&h);

    let read = h.store.retrieve("acme");
    assert_eq!(read.outcome(), Outcome::Success);

    let rows: Vec<(String, Vec<Value>)> = read
        .into_rows()
        .into_iter()
        .map(|row| (row.value, row.residual_key))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("a-1-1".to_string(), vec![Value::BigInt(1), Value::Int(1)]),
            ("a-1-2".to_string(), vec![Value::BigInt(1), Value::Int(2)]),
            ("a-2-1".to_string(), vec![Value::BigInt(2), Value::Int(1)]),
        ]
    );
}

#[test]
fn test_prefix_of_two() {
    let h = open_three_column();
    seed(&h);

    let read = h.store.retrieve(("acme", 1i64));
    let rows = read.rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.residual_key.len() == 1));
    assert_eq!(rows[1].residual_key, vec![Value::Int(2)]);
    // The first row doubles as the single value
    assert_eq!(read.value().map(String::as_str), Some("a-1-1"));
}

#[test]
fn test_full_key_has_empty_residual() {
    let h = open_three_column();
    seed(&h);

    let read = h.store.retrieve(("globex", 1i64, 1i32));
    assert_eq!(read.rows().len(), 1);
    assert!(read.rows()[0].residual_key.is_empty());
    assert_eq!(read.into_value().as_deref(), Some("g-1-1"));
}

#[test]
fn test_empty_prefix_reports_partial_key() {
    let h = open_three_column();
    seed(&h);

    let read = h.store.retrieve("initech");
    assert_eq!(read.outcome(), Outcome::NotFoundPartialKey);
    assert_eq!(read.outcome().code(), 2);

    let read = h.store.retrieve(("initech", 1i64, 1i32));
    assert_eq!(read.outcome(), Outcome::NotFound);
}

#[test]
fn test_prefix_reads_use_their_own_statement() {
    let h = open_three_column();
    seed(&h);
    h.cluster.clear_executions();

    h.store.retrieve("acme");
    h.store.retrieve(("acme", 2i64));

    let selects: Vec<usize> = h
        .cluster
        .executions()
        .into_iter()
        .filter(|e| e.kind == StatementKind::Select)
        .map(|e| e.params.len())
        .collect();
    assert_eq!(selects, vec![1, 2]);
}

#[test]
fn test_prefix_type_checked_per_column() {
    let h = open_three_column();

    let read = h.store.retrieve(("acme", "one"));
    assert_eq!(read.outcome(), Outcome::BindError);
    assert!(h.cluster.executions().is_empty());
}
