//! Resilient key/value store
//!
//! Reads and writes degrade across the configured consistency levels. Writes
//! that cannot be committed are kept in an in-process backlog and replayed by a
//! background worker, so under [`BacklogMode::Allow`] no write is lost while the
//! process lives.
//!
//! # Example
//!
//! ```no_run
//! use kvrelay::prelude::*;
//!
//! # fn example(driver: Arc<dyn StorageDriver>) -> Result<()> {
//! let config = StoreConfig::from_file("/etc/kvrelay/kvrelay.conf");
//! let store: KvStore<String> = KvStore::builder(config)
//!     .with_driver(driver)
//!     .with_key_types(vec![ValueType::BigInt])
//!     .open()?;
//!
//! let stored = store.store(1234i64, "something".to_string(), 60);
//! assert!(stored.outcome().is_accepted());
//!
//! if let Some(value) = store.retrieve(1234i64).into_value() {
//!     println!("{}", value);
//! }
//! # Ok(())
//! # }
//! ```

use crate::backlog::{BacklogEntry, BacklogMetricsSnapshot, BacklogQueue, DrainReport};
use crate::codec::TableLayout;
use crate::executor::{DegradationExecutor, Executed};
use crate::lifecycle::{ConnectionManager, ConnectionState};
use crate::worker;
use kvrelay_core::{
    observe, BacklogMode, BacklogTiming, Clock, IdGenerator, Key, KeySchema, Outcome,
    RelayError, Response, Result, StorableValue, StorageDriver, StoreConfig, SystemClock,
    ValueType,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// State shared between the store handle and its worker
pub(crate) struct StoreInner<V> {
    pub(crate) config: StoreConfig,
    pub(crate) layout: Arc<TableLayout>,
    pub(crate) connections: ConnectionManager,
    pub(crate) executor: DegradationExecutor,
    pub(crate) backlog: BacklogQueue<V>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<IdGenerator>,
    pub(crate) timing: BacklogTiming,
}

impl<V: StorableValue> StoreInner<V> {
    /// Write one full key. Never touches the backlog.
    pub(crate) fn write(
        &self,
        key: &Key,
        value: &V,
        ttl_secs: u32,
        timestamp_micros: i64,
    ) -> Result<Executed> {
        let connection = self.connections.connection()?;
        let mut statement = self.layout.bind_insert(
            connection.session(),
            connection.insert(),
            key,
            value.to_value(),
            ttl_secs,
            timestamp_micros,
        )?;
        self.executor.execute(
            connection.session(),
            &mut statement,
            self.config.write_consistencies(),
        )
    }

    fn read(&self, prefix: &Key) -> Result<Response<V>> {
        let prefix_len = self.layout.schema().check_prefix(prefix)?;
        let connection = self.connections.connection()?;
        let select = connection.select(prefix_len).ok_or_else(|| {
            RelayError::PreparedSelectFailed(format!(
                "no statement for a prefix of {} key column(s)",
                prefix_len
            ))
        })?;

        let mut statement = self
            .layout
            .bind_select(connection.session(), select, prefix)?;
        let executed = self.executor.execute(
            connection.session(),
            &mut statement,
            self.config.read_consistencies(),
        )?;
        let rows = self.layout.decode_rows::<V>(prefix_len, executed.result)?;

        if !rows.is_empty() {
            return Ok(Response::found("Value read successfully", rows));
        }
        if prefix_len < self.layout.arity() {
            Ok(Response::new(
                Outcome::NotFoundPartialKey,
                format!(
                    "No rows for partial key {} ({} of {} key columns)",
                    prefix,
                    prefix_len,
                    self.layout.arity()
                ),
            ))
        } else {
            Ok(Response::new(Outcome::NotFound, "Value not found"))
        }
    }

    fn enqueue(&self, key: Key, value: V, ttl_secs: u32, message: String) -> Response<V> {
        let entry = BacklogEntry {
            id: self.ids.time_ordered(),
            key,
            value,
            ttl_secs,
            enqueued_at: self.clock.now(),
            attempts: 0,
        };
        let id = entry.id;
        if self.backlog.push(entry) {
            tracing::debug!("Backlog entry {} queued", id);
            Response::new(Outcome::Backlogged, message)
        } else {
            Response::from_error(&RelayError::Closed)
        }
    }
}

/// What `shutdown` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Queued writes dropped
    pub discarded: usize,
    /// Shutdown waited for an in-flight drain pass
    pub waited_for_drain: bool,
    /// An open connection was released
    pub released_connection: bool,
}

/// Builder for [`KvStore`]
pub struct KvStoreBuilder<V> {
    config: StoreConfig,
    driver: Option<Arc<dyn StorageDriver>>,
    key_types: Option<Vec<ValueType>>,
    clock: Arc<dyn Clock>,
    ids: Arc<IdGenerator>,
    _value: PhantomData<fn() -> V>,
}

impl<V: StorableValue> KvStoreBuilder<V> {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            driver: None,
            key_types: None,
            clock: Arc::new(SystemClock),
            ids: Arc::new(IdGenerator::new()),
            _value: PhantomData,
        }
    }

    /// Storage driver to connect through (required)
    pub fn with_driver(mut self, driver: Arc<dyn StorageDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Types of the key columns named by `key_field`, in order.
    ///
    /// Defaults to `text` for every key column.
    pub fn with_key_types(mut self, key_types: Vec<ValueType>) -> Self {
        self.key_types = Some(key_types);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an identifier generator with other components
    pub fn with_id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Open the store.
    ///
    /// Makes one synchronous connection attempt, then starts the backlog
    /// worker, which keeps retrying if that attempt failed.
    pub fn open(self) -> Result<KvStore<V>> {
        let driver = self
            .driver
            .ok_or_else(|| RelayError::Config("a storage driver is required".into()))?;

        let key_names = self.config.key_fields();
        let key_types = self
            .key_types
            .unwrap_or_else(|| vec![ValueType::Text; key_names.len()]);
        let schema = KeySchema::new(key_names, key_types)?;
        let layout = Arc::new(TableLayout::new(
            self.config.table(),
            schema,
            self.config.value_field(),
            V::VALUE_TYPE,
        ));

        let connections = ConnectionManager::new(
            driver,
            self.config.cluster(),
            Arc::clone(&layout),
            self.config.connect_timeout(),
            self.config.request_timeout(),
        );

        let inner = Arc::new(StoreInner {
            executor: DegradationExecutor::new(self.config.request_timeout()),
            timing: self.config.backlog(),
            config: self.config,
            layout,
            connections,
            backlog: BacklogQueue::new(),
            clock: self.clock,
            ids: self.ids,
        });

        if let Err(e) = inner.connections.initialize() {
            tracing::warn!(
                "Store opened without a connection ({}); retrying in the background",
                e
            );
        }

        let worker = worker::spawn(Arc::clone(&inner))?;

        Ok(KvStore {
            inner,
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Resilient key/value store over a storage cluster
///
/// `V` is the value column's Rust type. Keys are runtime-typed and checked
/// against the configured key columns.
pub struct KvStore<V: StorableValue> {
    inner: Arc<StoreInner<V>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl<V: StorableValue> KvStore<V> {
    pub fn builder(config: StoreConfig) -> KvStoreBuilder<V> {
        KvStoreBuilder::new(config)
    }

    /// Open from a config file (defaults when unreadable).
    pub fn open_file(
        path: impl AsRef<Path>,
        driver: Arc<dyn StorageDriver>,
        key_types: Vec<ValueType>,
    ) -> Result<Self> {
        Self::builder(StoreConfig::from_file(path))
            .with_driver(driver)
            .with_key_types(key_types)
            .open()
    }

    /// Store with the configured default backlog mode.
    pub fn store(&self, key: impl Into<Key>, value: V, ttl_secs: u32) -> Response<V> {
        self.store_with_mode(key, value, ttl_secs, self.inner.config.default_backlog_mode())
    }

    /// Store a value under a full key. A `ttl_secs` of 0 never expires.
    ///
    /// A write accepted into the backlog reports [`Outcome::Backlogged`],
    /// which is not [`Outcome::Success`]: `bool::from(&response)` is false for
    /// it. Check [`Outcome::is_accepted`] to know whether the write was taken.
    pub fn store_with_mode(
        &self,
        key: impl Into<Key>,
        value: V,
        ttl_secs: u32,
        mode: BacklogMode,
    ) -> Response<V> {
        let key = key.into();
        let response = self.store_inner(key, value, ttl_secs, mode);
        observe::record_store(response.outcome());
        response
    }

    fn store_inner(&self, key: Key, value: V, ttl_secs: u32, mode: BacklogMode) -> Response<V> {
        let inner = &self.inner;
        // Neither can ever succeed on replay, so neither is backlogged
        let valid = inner
            .layout
            .schema()
            .check_full(&key)
            .and_then(|()| inner.layout.ttl_param(ttl_secs));
        if let Err(e) = valid {
            return Response::from_error(&e);
        }

        if mode == BacklogMode::UseOnlyBacklog {
            return inner.enqueue(key, value, ttl_secs, "Queued for background delivery".into());
        }

        let now = inner.clock.now_micros();
        match inner.write(&key, &value, ttl_secs, now) {
            Ok(executed) => {
                tracing::debug!("Stored {} at {}", key, executed.consistency);
                Response::success("Value stored successfully")
            }
            Err(e) if mode == BacklogMode::Allow => {
                tracing::warn!("Write for {} deferred to backlog: {}", key, e);
                inner.enqueue(key, value, ttl_secs, format!("Deferred to backlog: {}", e))
            }
            Err(e) => Response::from_error(&e),
        }
    }

    /// Read a full key, or every row under a key prefix.
    pub fn retrieve(&self, prefix: impl Into<Key>) -> Response<V> {
        let started = Instant::now();
        let prefix = prefix.into();
        let response = self
            .inner
            .read(&prefix)
            .unwrap_or_else(|e| Response::from_error(&e));
        observe::record_retrieve(response.outcome(), started.elapsed());
        response
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connections.state()
    }

    pub fn backlog_len(&self) -> usize {
        self.inner.backlog.len()
    }

    /// Copy of the queued writes, next-to-deliver first
    pub fn backlog_snapshot(&self) -> Vec<BacklogEntry<V>> {
        self.inner.backlog.snapshot()
    }

    pub fn backlog_metrics(&self) -> BacklogMetricsSnapshot {
        self.inner.backlog.metrics().snapshot()
    }

    pub fn is_processing_backlog(&self) -> bool {
        self.inner.backlog.is_draining()
    }

    /// Run one drain pass on the calling thread, connecting first if needed.
    ///
    /// Returns `None` when the backlog is empty, the worker is mid-drain, or
    /// the store is shut down.
    pub fn drain_backlog(&self) -> Option<DrainReport> {
        if self.inner.backlog.is_terminated() {
            return None;
        }
        if let Err(e) = self.inner.connections.initialize() {
            tracing::debug!("Drain without a connection: {}", e);
        }
        worker::drain_once(&self.inner)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.inner.ids
    }

    /// Stop the worker, drop queued writes and release the connection.
    ///
    /// Blocks while a drain pass is in flight. Later calls do nothing.
    pub fn shutdown(&self) -> ShutdownReport {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }

        let ticket = self.inner.backlog.request_shutdown();
        if ticket.discarded > 0 {
            tracing::warn!(
                "Shutdown discarded {} undelivered backlog entries",
                ticket.discarded
            );
        }
        if ticket.was_draining {
            tracing::debug!("Waiting for the in-flight drain pass");
            while self.inner.backlog.is_draining() {
                thread::sleep(self.inner.timing.shutdown_poll_interval);
            }
        }

        let released_connection = self.inner.connections.close();

        // Detach; the worker exits on its own once it sees the flag
        drop(self.worker.lock().take());

        ShutdownReport {
            discarded: ticket.discarded,
            waited_for_drain: ticket.was_draining,
            released_connection,
        }
    }
}

impl<V: StorableValue> Drop for KvStore<V> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
