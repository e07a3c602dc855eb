//! Demo command implementation
//!
//! Writes during a simulated outage, lets the backlog deliver once the cluster
//! is back, and shows the value expiring on the original schedule.

use anyhow::{bail, Context, Result};
use kvrelay::prelude::*;
use kvrelay_memory::{MemoryCluster, TableSchema};

const KEY: i64 = 1234;

fn show<V: std::fmt::Debug>(step: &str, response: &Response<V>) {
    println!(
        "  {:<28} {:>3}  {}",
        step,
        response.outcome().code(),
        response.message()
    );
    if let Some(value) = response.value() {
        println!("  {:<28}      value: {:?}", "", value);
    }
}

pub fn execute(config: StoreConfig, ttl: u32, outage: i64) -> Result<()> {
    if outage < 0 {
        bail!("outage must not be negative");
    }

    // Keep the consistency lists from the file; the table is the demo's own
    let config = config
        .with_option("table", "demo.values")
        .with_option("key_field", "id")
        .with_option("value_field", "payload")
        .with_option("backlog_poll_interval_ms", "3600000");

    let clock = Arc::new(ManualClock::starting_now());
    let cluster = MemoryCluster::with_clock(clock.clone());
    cluster.create_table(
        TableSchema::for_store(&config, &[ValueType::BigInt], ValueType::Text)
            .context("Failed to build demo table")?,
    );

    let store: KvStore<String> = KvStore::builder(config)
        .with_driver(Arc::new(cluster.clone()))
        .with_key_types(vec![ValueType::BigInt])
        .with_clock(clock.clone())
        .open()
        .context("Failed to open store")?;
    tracing::info!("Demo store is {:?}", store.connection_state());

    println!("\nBacklog Demo");
    println!("{}", "=".repeat(60));

    cluster.set_reachable(false);
    let stored = store.store(KEY, "something".to_string(), ttl);
    show("store during outage", &stored);
    println!("  backlog depth: {}", store.backlog_len());

    clock.advance_secs(outage);
    cluster.set_reachable(true);
    match store.drain_backlog() {
        Some(report) => println!(
            "\n  after {}s: {} delivered, {} requeued, {} expired",
            outage, report.delivered, report.requeued, report.expired
        ),
        None => println!("\n  after {}s: nothing to drain", outage),
    }

    show("retrieve", &store.retrieve(KEY));

    if ttl > 0 {
        let at = i64::from(ttl).max(outage) + 1;
        clock.advance_secs(at - outage);
        show(&format!("retrieve at +{}s", at), &store.retrieve(KEY));
    }

    let report = store.shutdown();
    println!("\nShutdown: {}", serde_json::to_string(&report)?);
    println!("Metrics: {}", serde_json::to_string(&store.backlog_metrics())?);

    Ok(())
}
