//! kvrelay: a resilient client-side access layer for eventually consistent
//! key/value clusters
//!
//! kvrelay sits in front of a storage driver and provides:
//! - **Consistency degradation**: every read and write walks an ordered list
//!   of consistency levels until one succeeds
//! - **Backlog**: writes that cannot be committed are queued in process and
//!   replayed by a background worker, oldest failures first
//! - **Composite keys**: keys of any arity, with prefix reads that return the
//!   remaining key columns of each row
//! - **Lifecycle**: one connection state machine and a shutdown handshake
//!   that never frees state the worker is still using
//!
//! # Quick Start
//!
//! ```no_run
//! use kvrelay::prelude::*;
//!
//! # fn example(driver: Arc<dyn StorageDriver>) -> Result<()> {
//! let config = StoreConfig::from_options([
//!     ("table", "cache.values"),
//!     ("key_field", "tenant, user_id"),
//!     ("write_consistencies", "QUORUM, ONE, ANY"),
//! ]);
//! let store: KvStore<Vec<u8>> = KvStore::builder(config)
//!     .with_driver(driver)
//!     .with_key_types(vec![ValueType::Text, ValueType::BigInt])
//!     .open()?;
//!
//! store.store(("acme", 42i64), b"payload".to_vec(), 3600);
//!
//! // Every user of tenant "acme", with the user_id of each row
//! for row in store.retrieve("acme").rows() {
//!     println!("{:?} -> {} bytes", row.residual_key, row.value.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod backlog;
pub mod codec;
pub mod executor;
pub mod lifecycle;
pub mod prelude;
pub mod store;
mod worker;

// Re-export core types
pub use kvrelay_core::{
    config::{BacklogTiming, ClusterConfig, StoreConfig, TlsConfig, TlsMaterial, VerifyMode},
    consistency::{Consistency, ConsistencyLevels},
    error::{RelayError, Result},
    traits::{
        BoundStatement, DriverError, DriverResult, PreparedStatement, ResultSet, Row, Session,
        StorageDriver,
    },
    types::{
        BacklogMode, Key, KeyColumn, KeySchema, Outcome, Response, RowMatch, StorableValue, Value,
        ValueType,
    },
    Clock, IdGenerator, ManualClock, SystemClock,
};

// Re-export main types from this crate
pub use backlog::{
    BacklogEntry, BacklogMetrics, BacklogMetricsSnapshot, BacklogQueue, DrainReport,
};
pub use codec::TableLayout;
pub use executor::{DegradationExecutor, Executed};
pub use lifecycle::{Connection, ConnectionManager, ConnectionState};
pub use store::{KvStore, KvStoreBuilder, ShutdownReport};
