//! In-process storage driver
//!
//! A [`MemoryCluster`] implements the kvrelay storage driver seam without a
//! network. It is meant for tests and demos:
//! - Tables with composite keys and a partition key prefix
//! - Per-write TTLs measured against an injectable clock
//! - Last-write-wins by write timestamp
//! - Fault injection: unreachable cluster, rejected or unavailable
//!   consistency levels, failing writes, failing prepares, latency

pub mod cluster;
pub mod schema;
pub mod statement;

pub use cluster::{ExecutionRecord, MemoryCluster};
pub use schema::TableSchema;
pub use statement::{Plan, StatementKind};
