mod cluster;
mod store;

pub use cluster::{ClusterConfig, TlsConfig, TlsMaterial, VerifyMode};
pub use store::{BacklogTiming, StoreConfig, DEFAULTS};
