use super::value::{Value, ValueType};
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ordered key tuple, or a prefix of one
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Key(Vec<Value>);

impl Key {
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_parts(self) -> Vec<Value> {
        self.0
    }

    /// Extend a prefix with trailing key columns recovered from a row.
    pub fn join(&self, residual: &[Value]) -> Key {
        let mut parts = self.0.clone();
        parts.extend_from_slice(residual);
        Key(parts)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Value::to_text).collect();
        write!(f, "({})", parts.join(", "))
    }
}

impl From<Vec<Value>> for Key {
    fn from(parts: Vec<Value>) -> Self {
        Key(parts)
    }
}

macro_rules! impl_key_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Key {
                fn from(v: $ty) -> Self {
                    Key(vec![Value::from(v)])
                }
            }
        )*
    };
}

impl_key_from_scalar!(i8, i16, i32, i64, u32, f32, f64, bool, String, &str, Vec<u8>, Uuid, Value);

impl<A, B> From<(A, B)> for Key
where
    A: Into<Value>,
    B: Into<Value>,
{
    fn from((a, b): (A, B)) -> Self {
        Key(vec![a.into(), b.into()])
    }
}

impl<A, B, C> From<(A, B, C)> for Key
where
    A: Into<Value>,
    B: Into<Value>,
    C: Into<Value>,
{
    fn from((a, b, c): (A, B, C)) -> Self {
        Key(vec![a.into(), b.into(), c.into()])
    }
}

impl<A, B, C, D> From<(A, B, C, D)> for Key
where
    A: Into<Value>,
    B: Into<Value>,
    C: Into<Value>,
    D: Into<Value>,
{
    fn from((a, b, c, d): (A, B, C, D)) -> Self {
        Key(vec![a.into(), b.into(), c.into(), d.into()])
    }
}

/// A declared primary-key column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    pub name: String,
    pub ty: ValueType,
}

/// Declared key columns of a table, in primary-key order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    columns: Vec<KeyColumn>,
}

impl KeySchema {
    /// Pair column names with their types. Both lists must be non-empty and
    /// the same length.
    pub fn new(names: Vec<String>, types: Vec<ValueType>) -> Result<Self> {
        if names.is_empty() {
            return Err(RelayError::Config("at least one key column is required".into()));
        }
        if names.len() != types.len() {
            return Err(RelayError::Config(format!(
                "{} key columns configured but {} key types supplied",
                names.len(),
                types.len()
            )));
        }
        let columns = names
            .into_iter()
            .zip(types)
            .map(|(name, ty)| KeyColumn { name, ty })
            .collect();
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[KeyColumn] {
        &self.columns
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Validate a key prefix and return its length.
    ///
    /// The prefix must hold 1..=arity parts, each of its column's type.
    pub fn check_prefix(&self, key: &Key) -> Result<usize> {
        let len = key.len();
        if len == 0 || len > self.arity() {
            return Err(RelayError::Bind {
                index: len,
                reason: format!(
                    "key has {} parts, expected between 1 and {}",
                    len,
                    self.arity()
                ),
            });
        }
        for (index, (part, column)) in key.parts().iter().zip(&self.columns).enumerate() {
            if part.value_type() != column.ty {
                return Err(RelayError::Bind {
                    index,
                    reason: format!(
                        "key column {} is {}, found {}",
                        column.name,
                        column.ty,
                        part.value_type()
                    ),
                });
            }
        }
        Ok(len)
    }

    /// Validate a complete key.
    pub fn check_full(&self, key: &Key) -> Result<()> {
        let len = self.check_prefix(key)?;
        if len != self.arity() {
            return Err(RelayError::Bind {
                index: len,
                reason: format!("writes need the full key of {} parts, got {}", self.arity(), len),
            });
        }
        Ok(())
    }

    /// Key columns not covered by a prefix of `prefix_len` parts.
    pub fn residual(&self, prefix_len: usize) -> &[KeyColumn] {
        &self.columns[prefix_len.min(self.columns.len())..]
    }
}
