//! Typed column values
//!
//! Supports the column types a key or value may be declared as:
//! - Integers: `tinyint` (i8), `smallint` (i16), `int` (i32), `bigint` (i64), `date` (u32)
//! - Floating point: `float` (f32), `double` (f64)
//! - `boolean`, `text`, `blob` (raw bytes) and `uuid`
//!
//! Every value can be coerced to and from text with [`Value::to_text`] and
//! [`Value::parse`], so a caller can treat any supported type generically as a
//! string (for example when the same configuration is reused across tables).

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declared type of a key or value column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Date,
    Float,
    Double,
    Boolean,
    Text,
    Blob,
    Uuid,
}

impl ValueType {
    /// The CQL type name
    pub fn cql_name(&self) -> &'static str {
        match self {
            ValueType::TinyInt => "tinyint",
            ValueType::SmallInt => "smallint",
            ValueType::Int => "int",
            ValueType::BigInt => "bigint",
            ValueType::Date => "date",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Boolean => "boolean",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Uuid => "uuid",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql_name())
    }
}

impl FromStr for ValueType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "tinyint" => ValueType::TinyInt,
            "smallint" => ValueType::SmallInt,
            "int" => ValueType::Int,
            "bigint" => ValueType::BigInt,
            "date" => ValueType::Date,
            "float" => ValueType::Float,
            "double" => ValueType::Double,
            "boolean" => ValueType::Boolean,
            "text" | "varchar" | "ascii" => ValueType::Text,
            "blob" => ValueType::Blob,
            "uuid" | "timeuuid" => ValueType::Uuid,
            other => {
                return Err(RelayError::Config(format!(
                    "unsupported column type '{}'",
                    other
                )))
            }
        };
        Ok(ty)
    }
}

/// A single typed column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Date(u32),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Text(String),
    Blob(Vec<u8>),
    Uuid(Uuid),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::TinyInt(_) => ValueType::TinyInt,
            Value::SmallInt(_) => ValueType::SmallInt,
            Value::Int(_) => ValueType::Int,
            Value::BigInt(_) => ValueType::BigInt,
            Value::Date(_) => ValueType::Date,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Uuid(_) => ValueType::Uuid,
        }
    }

    /// Render the value as text (blobs as `0x`-prefixed lowercase hex).
    pub fn to_text(&self) -> String {
        match self {
            Value::TinyInt(v) => v.to_string(),
            Value::SmallInt(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::BigInt(v) => v.to_string(),
            Value::Date(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Boolean(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Blob(bytes) => {
                let mut out = String::with_capacity(2 + bytes.len() * 2);
                out.push_str("0x");
                for b in bytes {
                    out.push_str(&format!("{:02x}", b));
                }
                out
            }
            Value::Uuid(v) => v.hyphenated().to_string(),
        }
    }

    /// Parse text into a value of the given type.
    pub fn parse(ty: ValueType, text: &str) -> Result<Value> {
        let invalid = |e: &dyn fmt::Display| {
            RelayError::Config(format!("cannot parse '{}' as {}: {}", text, ty, e))
        };
        let trimmed = text.trim();
        let value = match ty {
            ValueType::TinyInt => Value::TinyInt(trimmed.parse().map_err(|e| invalid(&e))?),
            ValueType::SmallInt => Value::SmallInt(trimmed.parse().map_err(|e| invalid(&e))?),
            ValueType::Int => Value::Int(trimmed.parse().map_err(|e| invalid(&e))?),
            ValueType::BigInt => Value::BigInt(trimmed.parse().map_err(|e| invalid(&e))?),
            ValueType::Date => Value::Date(trimmed.parse().map_err(|e| invalid(&e))?),
            ValueType::Float => Value::Float(trimmed.parse().map_err(|e| invalid(&e))?),
            ValueType::Double => Value::Double(trimmed.parse().map_err(|e| invalid(&e))?),
            ValueType::Boolean => Value::Boolean(trimmed.parse().map_err(|e| invalid(&e))?),
            // Text is taken verbatim, surrounding whitespace included
            ValueType::Text => Value::Text(text.to_string()),
            ValueType::Blob => Value::Blob(parse_hex(trimmed).map_err(|e| invalid(&e))?),
            ValueType::Uuid => Value::Uuid(Uuid::parse_str(trimmed).map_err(|e| invalid(&e))?),
        };
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn parse_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex digit at offset {}", i))
        })
        .collect()
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_value_from!(
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u32 => Date,
    f32 => Float,
    f64 => Double,
    bool => Boolean,
    String => Text,
    Vec<u8> => Blob,
    Uuid => Uuid,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

/// A Rust type that can be stored in, and read back from, a value column
pub trait StorableValue: Clone + Send + Sync + 'static {
    /// Column type this Rust type binds as
    const VALUE_TYPE: ValueType;

    fn to_value(&self) -> Value;

    /// Decode from a column value. `column` is only used for error context.
    fn from_value(value: Value, column: usize) -> Result<Self>;
}

macro_rules! impl_storable {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl StorableValue for $ty {
                const VALUE_TYPE: ValueType = ValueType::$variant;

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: Value, column: usize) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(RelayError::Value {
                            column,
                            reason: format!(
                                "expected {}, found {}",
                                ValueType::$variant,
                                other.value_type()
                            ),
                        }),
                    }
                }
            }
        )*
    };
}

impl_storable!(
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u32 => Date,
    f32 => Float,
    f64 => Double,
    bool => Boolean,
    String => Text,
    Vec<u8> => Blob,
    Uuid => Uuid,
);
