//! kvrelay core: types, configuration and driver traits
//!
//! This crate defines the building blocks shared by the resilient access layer
//! and by storage driver implementations:
//! - Config resolution: user options overlaid on built-in defaults
//! - Consistency levels and the ordered degradation list
//! - Typed values, composite keys and the `Response` result type
//! - The storage driver seam (connect, prepare, bind, execute, extract)
//! - A shared, explicitly constructed identifier generator
//! - An injectable clock for TTL arithmetic

pub mod clock;
pub mod config;
pub mod consistency;
pub mod error;
pub mod ids;
pub mod observe;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BacklogTiming, ClusterConfig, StoreConfig, TlsConfig, TlsMaterial, VerifyMode};
pub use consistency::{Consistency, ConsistencyLevels};
pub use error::{RelayError, Result};
pub use ids::IdGenerator;
pub use traits::{
    BoundStatement, DriverError, DriverResult, PreparedStatement, ResultSet, Row, Session,
    StorageDriver,
};
pub use types::{
    BacklogMode, Key, KeyColumn, KeySchema, Outcome, Response, RowMatch, StorableValue, Value,
    ValueType,
};
