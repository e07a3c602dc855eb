//! kvrelay Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use kvrelay::prelude::*;
//! ```

// Core types
pub use crate::{
    BacklogMode, Consistency, ConsistencyLevels, Key, Outcome, RelayError, Response, Result,
    RowMatch, StorableValue, Value, ValueType,
};

// Configs
pub use crate::{BacklogTiming, ClusterConfig, StoreConfig, TlsConfig};

// Store
pub use crate::{ConnectionState, KvStore, KvStoreBuilder, ShutdownReport};

// Backlog
pub use crate::{BacklogEntry, BacklogMetricsSnapshot, DrainReport};

// Driver seam
pub use crate::{Session, StorageDriver};

// Time and identifiers
pub use crate::{Clock, IdGenerator, ManualClock, SystemClock};

// Re-export common external deps
pub use std::sync::Arc;
pub use tracing;
