//! Config command implementation

use anyhow::{Context, Result};
use kvrelay::StoreConfig;
use std::path::Path;

const SECRETS: &[&str] = &["password", "client_key_password"];

fn masked(key: &str, value: &str) -> String {
    if SECRETS.contains(&key) && !value.is_empty() {
        "********".to_string()
    } else {
        value.to_string()
    }
}

pub fn execute(path: &Path, config: &StoreConfig, json: bool) -> Result<()> {
    tracing::info!("Showing configuration from {}", path.display());

    if json {
        let mut value = serde_json::to_value(config).context("Failed to serialize config")?;
        if let Some(options) = value.get_mut("options").and_then(|o| o.as_object_mut()) {
            for (key, option) in options.iter_mut() {
                if let Some(text) = option.as_str() {
                    *option = serde_json::Value::String(masked(key, text));
                }
            }
        }
        value["backlog"] = serde_json::to_value(config.backlog())?;
        value["tls_enabled"] = serde_json::Value::Bool(config.cluster().tls.is_some());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let cluster = config.cluster();
    let timing = config.backlog();

    println!("\nStore Configuration");
    println!("{}", "=".repeat(60));
    if path.exists() {
        println!("File: {}", path.display());
    } else {
        println!("File: {} (not found, using defaults)", path.display());
    }

    println!("\nTable:");
    println!("  Name: {}", config.table());
    println!("  Key Columns: {}", config.key_fields().join(", "));
    println!("  Value Column: {}", config.value_field());

    println!("\nCluster:");
    println!("  Hosts: {}", cluster.hosts.join(", "));
    println!("  TLS: {}", if cluster.tls.is_some() { "enabled" } else { "disabled" });
    println!("  Read Consistencies: {}", config.read_consistencies());
    println!("  Write Consistencies: {}", config.write_consistencies());

    println!("\nBacklog:");
    println!("  Default Mode: {:?}", config.default_backlog_mode());
    println!("  Poll Interval: {:?}", timing.poll_interval);
    println!("  Reconnect Backoff: {:?}", timing.reconnect_backoff);

    println!("\nAll Options:");
    for (key, value) in config.options() {
        println!("  {} = {}", key, masked(key, value));
    }

    Ok(())
}
