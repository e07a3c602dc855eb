use serde::{Deserialize, Serialize};

/// How a write interacts with the backlog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogMode {
    /// Write synchronously and never enqueue, whatever the outcome
    Disallow,
    /// Write synchronously; enqueue on failure
    #[default]
    Allow,
    /// Enqueue without contacting the cluster
    UseOnlyBacklog,
}

impl BacklogMode {
    /// Parse the numeric `default_backlog_mode` selector.
    ///
    /// `0` is `Disallow`, `2` is `UseOnlyBacklog`; anything else, including
    /// unparsable text, is `Allow`.
    pub fn from_selector(selector: &str) -> Self {
        match selector.trim().parse::<i64>() {
            Ok(0) => BacklogMode::Disallow,
            Ok(2) => BacklogMode::UseOnlyBacklog,
            _ => BacklogMode::Allow,
        }
    }

    pub fn selector(&self) -> i64 {
        match self {
            BacklogMode::Disallow => 0,
            BacklogMode::Allow => 1,
            BacklogMode::UseOnlyBacklog => 2,
        }
    }
}
