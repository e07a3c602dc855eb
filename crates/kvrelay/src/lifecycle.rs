//! Connection lifecycle
//!
//! ```text
//! Uninitialized -> Connecting -> Ready
//!                      |  ^
//!                      v  |
//!                     Failed
//! (any state) -> Closed
//! ```
//!
//! `Ready` requires an open session, the INSERT statement and one SELECT per
//! key prefix length. A failed attempt releases whatever it acquired. Once
//! `Ready`, the connection is only read until `close`.

use crate::codec::TableLayout;
use kvrelay_core::{
    ClusterConfig, Outcome, PreparedStatement, RelayError, Result, Session, StorageDriver,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Ready,
    Failed,
    Closed,
}

/// An open session with every statement the store needs
pub struct Connection {
    session: Box<dyn Session>,
    insert: PreparedStatement,
    /// Indexed by prefix length - 1
    selects: Vec<PreparedStatement>,
}

impl Connection {
    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub fn insert(&self) -> &PreparedStatement {
        &self.insert
    }

    /// SELECT for a prefix of `prefix_len` key columns.
    pub fn select(&self, prefix_len: usize) -> Option<&PreparedStatement> {
        prefix_len.checked_sub(1).and_then(|i| self.selects.get(i))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("insert", &self.insert.query())
            .field("selects", &self.selects.len())
            .finish()
    }
}

struct ManagerState {
    state: ConnectionState,
    connection: Option<Arc<Connection>>,
    last_failure: Option<(Outcome, String)>,
}

/// Owns the cluster connection and its state machine
pub struct ConnectionManager {
    driver: Arc<dyn StorageDriver>,
    cluster: ClusterConfig,
    layout: Arc<TableLayout>,
    connect_timeout: Duration,
    request_timeout: Duration,
    inner: Mutex<ManagerState>,
    /// Serializes initialize attempts
    attempt: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        cluster: ClusterConfig,
        layout: Arc<TableLayout>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            cluster,
            layout,
            connect_timeout,
            request_timeout,
            inner: Mutex::new(ManagerState {
                state: ConnectionState::Uninitialized,
                connection: None,
                last_failure: None,
            }),
            attempt: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Last initialize failure, if the manager is not ready.
    pub fn last_failure(&self) -> Option<(Outcome, String)> {
        self.inner.lock().last_failure.clone()
    }

    /// Bring the connection to `Ready`. A no-op when already ready.
    pub fn initialize(&self) -> Result<()> {
        let _attempt = self.attempt.lock();
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Closed => return Err(RelayError::Closed),
                _ => inner.state = ConnectionState::Connecting,
            }
        }

        tracing::debug!("Connecting to {}", self.cluster.hosts.join(", "));
        let established = self.establish();

        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Closed {
            // Closed while connecting; the new connection is dropped here
            return Err(RelayError::Closed);
        }
        match established {
            Ok(connection) => {
                inner.connection = Some(Arc::new(connection));
                inner.state = ConnectionState::Ready;
                inner.last_failure = None;
                tracing::info!(
                    "Connected to {} ({} prefix statements prepared)",
                    self.layout.table(),
                    self.layout.arity()
                );
                Ok(())
            }
            Err(e) => {
                inner.state = ConnectionState::Failed;
                inner.last_failure = Some((e.outcome(), e.to_string()));
                tracing::warn!("Connection attempt failed: {}", e);
                Err(e)
            }
        }
    }

    fn establish(&self) -> Result<Connection> {
        let tls = self.cluster.tls.as_ref().map(|t| t.load()).transpose()?;
        let session = self
            .driver
            .connect(&self.cluster, tls.as_ref(), self.connect_timeout)
            .map_err(|e| RelayError::SessionFailed(e.to_string()))?;

        let insert = session
            .prepare(&self.layout.insert_query(), self.request_timeout)
            .map_err(|e| RelayError::PreparedInsertFailed(e.to_string()))?;

        let selects = (1..=self.layout.arity())
            .map(|prefix_len| {
                session
                    .prepare(&self.layout.select_query(prefix_len), self.request_timeout)
                    .map_err(|e| {
                        RelayError::PreparedSelectFailed(format!(
                            "prefix of {} key column(s): {}",
                            prefix_len, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Connection {
            session,
            insert,
            selects,
        })
    }

    /// The ready connection, or the reason there is none.
    pub fn connection(&self) -> Result<Arc<Connection>> {
        let inner = self.inner.lock();
        match (&inner.connection, inner.state) {
            (Some(connection), ConnectionState::Ready) => Ok(Arc::clone(connection)),
            (_, ConnectionState::Closed) => Err(RelayError::Closed),
            _ => Err(match &inner.last_failure {
                Some((Outcome::PreparedInsertFailed, message)) => {
                    RelayError::PreparedInsertFailed(message.clone())
                }
                Some((Outcome::PreparedSelectFailed, message)) => {
                    RelayError::PreparedSelectFailed(message.clone())
                }
                Some((_, message)) => RelayError::SessionFailed(message.clone()),
                None => RelayError::SessionFailed("not connected".into()),
            }),
        }
    }

    /// Move to `Closed` and release the connection. Returns true if a
    /// connection was released.
    pub fn close(&self) -> bool {
        let released = {
            let mut inner = self.inner.lock();
            inner.state = ConnectionState::Closed;
            inner.connection.take()
        };
        match released {
            Some(connection) => {
                drop(connection);
                tracing::info!("Connection to {} closed", self.layout.table());
                true
            }
            None => false,
        }
    }
}
