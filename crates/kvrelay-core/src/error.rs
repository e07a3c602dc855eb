use crate::consistency::Consistency;
use crate::types::Outcome;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session failed: {0}")]
    SessionFailed(String),

    #[error("Prepared insert failed: {0}")]
    PreparedInsertFailed(String),

    #[error("Prepared select failed: {0}")]
    PreparedSelectFailed(String),

    #[error("Unable to bind parameter {index}: {reason}")]
    Bind { index: usize, reason: String },

    #[error("Unable to set statement consistency {level}: {reason}")]
    Consistency { level: Consistency, reason: String },

    #[error("Unable to run query at {level}: {reason}")]
    Query { level: Consistency, reason: String },

    #[error("Unable to get the value of column {column}: {reason}")]
    Value { column: usize, reason: String },

    #[error("Store is closed")]
    Closed,
}

impl RelayError {
    /// The response outcome this error is reported as.
    pub fn outcome(&self) -> Outcome {
        match self {
            RelayError::SessionFailed(_) | RelayError::Closed => Outcome::SessionFailed,
            RelayError::PreparedInsertFailed(_) => Outcome::PreparedInsertFailed,
            RelayError::PreparedSelectFailed(_) => Outcome::PreparedSelectFailed,
            RelayError::Bind { .. } => Outcome::BindError,
            RelayError::Consistency { .. } => Outcome::ConsistencyError,
            RelayError::Query { .. } => Outcome::QueryError,
            RelayError::Value { .. } => Outcome::ValueError,
            RelayError::Io(_) | RelayError::Config(_) => Outcome::UnknownError,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
