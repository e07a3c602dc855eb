use crate::config::{ClusterConfig, TlsMaterial};
use crate::consistency::Consistency;
use crate::types::{Value, ValueType};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a storage driver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("No hosts available: {0}")]
    NoHostsAvailable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not enough replicas for {consistency}: {required} required, {alive} alive")]
    Unavailable {
        consistency: Consistency,
        required: u32,
        alive: u32,
    },

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Type mismatch at position {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: ValueType,
        found: ValueType,
    },

    #[error("Position {index} out of bounds ({len} available)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Column {0} is null")]
    Null(usize),

    #[error("Server error: {0}")]
    Server(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Entry point of a storage driver
pub trait StorageDriver: Send + Sync {
    /// Open a session to the cluster, waiting at most `timeout`.
    fn connect(
        &self,
        cluster: &ClusterConfig,
        tls: Option<&TlsMaterial>,
        timeout: Duration,
    ) -> DriverResult<Box<dyn Session>>;
}

/// An open cluster session
///
/// Dropping the session releases it.
pub trait Session: Send + Sync {
    /// Compile a statement, waiting at most `timeout`.
    fn prepare(&self, query: &str, timeout: Duration) -> DriverResult<PreparedStatement>;

    /// Attach a value to a positional parameter.
    fn bind(&self, statement: &mut BoundStatement, index: usize, value: Value) -> DriverResult<()> {
        statement.set_param(index, value)
    }

    /// Request a consistency level for the next execution.
    ///
    /// Drivers reject levels they cannot honor for the statement.
    fn set_consistency(
        &self,
        statement: &mut BoundStatement,
        level: Consistency,
    ) -> DriverResult<()> {
        statement.set_consistency_level(level);
        Ok(())
    }

    /// Run a fully bound statement, waiting at most `timeout`.
    fn execute(&self, statement: &BoundStatement, timeout: Duration) -> DriverResult<ResultSet>;
}

/// Metadata of a compiled statement
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    id: u64,
    query: Arc<str>,
    param_types: Arc<[ValueType]>,
    column_types: Arc<[ValueType]>,
}

impl PreparedStatement {
    pub fn new(
        id: u64,
        query: &str,
        param_types: Vec<ValueType>,
        column_types: Vec<ValueType>,
    ) -> Self {
        Self {
            id,
            query: Arc::from(query),
            param_types: param_types.into(),
            column_types: column_types.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn param_types(&self) -> &[ValueType] {
        &self.param_types
    }

    /// Types of the result columns, in select order
    pub fn column_types(&self) -> &[ValueType] {
        &self.column_types
    }

    /// A fresh statement with no parameters bound.
    pub fn bind(&self) -> BoundStatement {
        BoundStatement {
            prepared: self.clone(),
            params: vec![None; self.param_types.len()],
            consistency: None,
        }
    }
}

/// A prepared statement with its parameter values
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    prepared: PreparedStatement,
    params: Vec<Option<Value>>,
    consistency: Option<Consistency>,
}

impl BoundStatement {
    pub fn prepared(&self) -> &PreparedStatement {
        &self.prepared
    }

    pub fn params(&self) -> &[Option<Value>] {
        &self.params
    }

    pub fn consistency(&self) -> Option<Consistency> {
        self.consistency
    }

    pub fn is_fully_bound(&self) -> bool {
        self.params.iter().all(Option::is_some)
    }

    /// Bind a value, checking position and declared type.
    pub fn set_param(&mut self, index: usize, value: Value) -> DriverResult<()> {
        let len = self.params.len();
        let expected = *self
            .prepared
            .param_types
            .get(index)
            .ok_or(DriverError::IndexOutOfBounds { index, len })?;
        if value.value_type() != expected {
            return Err(DriverError::TypeMismatch {
                index,
                expected,
                found: value.value_type(),
            });
        }
        self.params[index] = Some(value);
        Ok(())
    }

    pub fn set_consistency_level(&mut self, level: Consistency) {
        self.consistency = Some(level);
    }
}

/// A row returned by a select
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<Option<Value>>,
}

impl Row {
    pub fn new(columns: Vec<Option<Value>>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Decode one column as `ty`.
    pub fn extract(&self, column: usize, ty: ValueType) -> DriverResult<Value> {
        let cell = self.columns.get(column).ok_or(DriverError::IndexOutOfBounds {
            index: column,
            len: self.columns.len(),
        })?;
        let value = cell.as_ref().ok_or(DriverError::Null(column))?;
        if value.value_type() != ty {
            return Err(DriverError::TypeMismatch {
                index: column,
                expected: ty,
                found: value.value_type(),
            });
        }
        Ok(value.clone())
    }
}

/// Rows returned by an execution; empty for writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
