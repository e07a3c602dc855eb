//! Consistency degradation
//!
//! A bound statement is executed once per configured consistency level, in
//! order, until one level is both accepted by the driver and executes
//! successfully. A level the driver rejects counts as a consistency failure for
//! that attempt only. When every level fails, the last failure is returned.

use kvrelay_core::{
    observe, BoundStatement, Consistency, ConsistencyLevels, RelayError, ResultSet, Result,
    Session,
};
use std::time::Duration;

/// A successful execution
#[derive(Debug, Clone)]
pub struct Executed {
    pub result: ResultSet,
    /// Level the statement succeeded at
    pub consistency: Consistency,
    /// Levels tried, including the successful one
    pub attempts: usize,
}

/// Runs statements across an ordered list of consistency levels
#[derive(Debug, Clone, Copy)]
pub struct DegradationExecutor {
    timeout: Duration,
}

impl DegradationExecutor {
    /// `timeout` bounds each individual execution.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn execute(
        &self,
        session: &dyn Session,
        statement: &mut BoundStatement,
        levels: &ConsistencyLevels,
    ) -> Result<Executed> {
        let mut last_error = None;

        for (attempt, level) in levels.iter().enumerate() {
            if let Err(e) = session.set_consistency(statement, level) {
                tracing::debug!("Consistency {} rejected: {}", level, e);
                observe::record_consistency_fallback(level);
                last_error = Some(RelayError::Consistency {
                    level,
                    reason: e.to_string(),
                });
                continue;
            }

            match session.execute(statement, self.timeout) {
                Ok(result) => {
                    if attempt > 0 {
                        tracing::debug!(
                            "Statement succeeded at {} after {} failed level(s)",
                            level,
                            attempt
                        );
                    }
                    return Ok(Executed {
                        result,
                        consistency: level,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    tracing::debug!("Execution at {} failed: {}", level, e);
                    observe::record_consistency_fallback(level);
                    last_error = Some(RelayError::Query {
                        level,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RelayError::Query {
            level: Consistency::WEAKEST,
            reason: "no consistency level to try".into(),
        }))
    }
}
