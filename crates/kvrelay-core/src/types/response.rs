use super::value::Value;
use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result kind of a `store` or `retrieve` call
///
/// Integer codes are stable and may be exposed to non-Rust callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    ValueError,
    UnknownError,
    BindError,
    QueryError,
    ConsistencyError,
    PreparedSelectFailed,
    PreparedInsertFailed,
    SessionFailed,
    Success,
    NotFound,
    /// No rows for a partial key; the key may be incomplete
    NotFoundPartialKey,
    /// Write accepted into the backlog for later delivery
    Backlogged,
}

impl Outcome {
    pub fn code(&self) -> i32 {
        match self {
            Outcome::ValueError => -9,
            Outcome::UnknownError => -8,
            Outcome::BindError => -7,
            Outcome::QueryError => -6,
            Outcome::ConsistencyError => -5,
            Outcome::PreparedSelectFailed => -4,
            Outcome::PreparedInsertFailed => -3,
            Outcome::SessionFailed => -2,
            Outcome::Success => 0,
            Outcome::NotFound => 1,
            Outcome::NotFoundPartialKey => 2,
            Outcome::Backlogged => 3,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Outcome::Success
    }

    /// True when a write was either committed or deferred to the backlog.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::Backlogged)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// One row of a prefix read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMatch<V> {
    pub value: V,
    /// Key columns after the queried prefix, in declared order
    pub residual_key: Vec<Value>,
}

/// Immutable result of a `store` or `retrieve` call
#[derive(Debug, Clone, PartialEq)]
pub struct Response<V> {
    outcome: Outcome,
    message: String,
    value: Option<V>,
    rows: Vec<RowMatch<V>>,
}

impl<V: Clone> Response<V> {
    /// A read that matched rows. The first row's value is the primary value.
    pub fn found(message: impl Into<String>, rows: Vec<RowMatch<V>>) -> Self {
        let value = rows.first().map(|row| row.value.clone());
        Self {
            outcome: Outcome::Success,
            message: message.into(),
            value,
            rows,
        }
    }
}

impl<V> Response<V> {
    pub fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            value: None,
            rows: Vec::new(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Outcome::Success, message)
    }

    pub fn from_error(err: &RelayError) -> Self {
        Self::new(err.outcome(), err.to_string())
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<V> {
        self.value
    }

    pub fn rows(&self) -> &[RowMatch<V>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<RowMatch<V>> {
        self.rows
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

impl<V> From<&Response<V>> for bool {
    fn from(response: &Response<V>) -> bool {
        response.is_success()
    }
}

impl<V> fmt::Display for Response<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.outcome, self.message)
    }
}
