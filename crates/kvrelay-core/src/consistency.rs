//! Consistency levels and the ordered degradation list
//!
//! A [`ConsistencyLevels`] list is tried front to back: the first level that the
//! driver accepts and that executes successfully wins. The list is never empty;
//! a configuration that yields no recognizable level falls back to
//! [`Consistency::WEAKEST`].

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Replica acknowledgement policy for a single statement execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl Consistency {
    /// The level used when a configured list is empty.
    pub const WEAKEST: Consistency = Consistency::Any;

    pub fn as_str(&self) -> &'static str {
        match self {
            Consistency::Any => "ANY",
            Consistency::One => "ONE",
            Consistency::Two => "TWO",
            Consistency::Three => "THREE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::EachQuorum => "EACH_QUORUM",
            Consistency::Serial => "SERIAL",
            Consistency::LocalSerial => "LOCAL_SERIAL",
            Consistency::LocalOne => "LOCAL_ONE",
        }
    }

    /// Serial levels only apply to lightweight transactions.
    pub fn is_serial(&self) -> bool {
        matches!(self, Consistency::Serial | Consistency::LocalSerial)
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Consistency {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let level = match s.trim().to_ascii_uppercase().as_str() {
            "ANY" => Consistency::Any,
            "ONE" => Consistency::One,
            "TWO" => Consistency::Two,
            "THREE" => Consistency::Three,
            "QUORUM" => Consistency::Quorum,
            "ALL" => Consistency::All,
            "LOCAL_QUORUM" => Consistency::LocalQuorum,
            "EACH_QUORUM" => Consistency::EachQuorum,
            "SERIAL" => Consistency::Serial,
            "LOCAL_SERIAL" => Consistency::LocalSerial,
            "LOCAL_ONE" => Consistency::LocalOne,
            other => {
                return Err(RelayError::Config(format!(
                    "unknown consistency level '{}'",
                    other
                )))
            }
        };
        Ok(level)
    }
}

/// Ordered, non-empty list of consistency levels to try in turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyLevels(Vec<Consistency>);

impl ConsistencyLevels {
    /// Build from an explicit list; an empty list is a configuration error.
    pub fn new(levels: Vec<Consistency>) -> Result<Self> {
        if levels.is_empty() {
            return Err(RelayError::Config(
                "consistency level list must not be empty".into(),
            ));
        }
        Ok(Self(levels))
    }

    /// A list holding a single level (strict consistency, no degradation).
    pub fn single(level: Consistency) -> Self {
        Self(vec![level])
    }

    /// Parse a comma-separated list of level names.
    ///
    /// Unknown names are dropped. If nothing survives, the list is
    /// `[Consistency::WEAKEST]` so reads and writes are never disabled.
    pub fn parse(list: &str) -> Self {
        let mut levels = Vec::new();
        for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.parse::<Consistency>() {
                Ok(level) => levels.push(level),
                Err(_) => {
                    tracing::warn!("Dropping unknown consistency level '{}'", token);
                }
            }
        }

        if levels.is_empty() {
            tracing::warn!(
                "No usable consistency level in '{}', falling back to {}",
                list,
                Consistency::WEAKEST
            );
            levels.push(Consistency::WEAKEST);
        }

        Self(levels)
    }

    pub fn as_slice(&self) -> &[Consistency] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Consistency> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The strongest (first) level in the list.
    pub fn first(&self) -> Consistency {
        self.0[0]
    }
}

impl fmt::Display for ConsistencyLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Consistency::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_in_order() {
        let levels = ConsistencyLevels::parse("LOCAL_QUORUM, LOCAL_ONE, ONE");
        assert_eq!(
            levels.as_slice(),
            &[
                Consistency::LocalQuorum,
                Consistency::LocalOne,
                Consistency::One
            ]
        );
        assert_eq!(levels.first(), Consistency::LocalQuorum);
    }

    #[test]
    fn test_parse_drops_unknown_tokens() {
        let levels = ConsistencyLevels::parse("QUORUM, MOSTLY, , two");
        assert_eq!(levels.as_slice(), &[Consistency::Quorum, Consistency::Two]);
    }

    #[test]
    fn test_empty_list_falls_back_to_weakest() {
        assert_eq!(
            ConsistencyLevels::parse("").as_slice(),
            &[Consistency::WEAKEST]
        );
        assert_eq!(
            ConsistencyLevels::parse("strong, stronger").as_slice(),
            &[Consistency::Any]
        );
    }

    #[test]
    fn test_explicit_empty_rejected() {
        assert!(ConsistencyLevels::new(vec![]).is_err());
        assert_eq!(ConsistencyLevels::single(Consistency::All).len(), 1);
    }

    #[test]
    fn test_display_roundtrip() {
        let levels = ConsistencyLevels::parse("each_quorum,LOCAL_SERIAL");
        assert_eq!(levels.to_string(), "EACH_QUORUM, LOCAL_SERIAL");
        assert_eq!(ConsistencyLevels::parse(&levels.to_string()), levels);
        assert!(Consistency::LocalSerial.is_serial());
        assert!(!Consistency::LocalOne.is_serial());
    }
}
