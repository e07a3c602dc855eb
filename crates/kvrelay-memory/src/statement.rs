//! Statement parsing
//!
//! Understands the two statement shapes a kvrelay store issues:
//!
//! ```text
//! INSERT INTO <table> (<k1>, ..., <kN>, <value>) VALUES (?, ...) USING TTL ? AND TIMESTAMP ?
//! SELECT <col>, ... FROM <table> WHERE <k1>=? AND ... AND <kp>=?
//! ```

use crate::schema::TableSchema;
use kvrelay_core::{DriverError, DriverResult, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Insert,
    Select,
}

/// A statement as written, before it is checked against a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Insert {
        table: String,
        columns: Vec<String>,
    },
    Select {
        table: String,
        projection: Vec<String>,
        restricted: Vec<String>,
    },
}

impl Parsed {
    pub fn parse(query: &str) -> DriverResult<Self> {
        let query = query.trim();
        if let Some(rest) = query.strip_prefix("INSERT INTO ") {
            parse_insert(rest)
        } else if let Some(rest) = query.strip_prefix("SELECT ") {
            parse_select(rest)
        } else {
            Err(invalid(format!("unsupported statement: {}", query)))
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Parsed::Insert { table, .. } | Parsed::Select { table, .. } => table,
        }
    }

    /// Resolve column names against `schema`.
    pub fn plan(&self, schema: &TableSchema) -> DriverResult<Plan> {
        match self {
            Parsed::Insert { table, columns } => {
                let expected: Vec<&str> = schema
                    .key_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .chain(std::iter::once(schema.value_column.name.as_str()))
                    .collect();
                if *columns != expected {
                    return Err(invalid(format!(
                        "INSERT into {} must list ({})",
                        table,
                        expected.join(", ")
                    )));
                }
                let mut params: Vec<ValueType> = schema.key_columns.iter().map(|c| c.ty).collect();
                params.push(schema.value_column.ty);
                params.push(ValueType::Int);
                params.push(ValueType::BigInt);
                Ok(Plan {
                    kind: StatementKind::Insert,
                    table: table.clone(),
                    prefix_len: schema.arity(),
                    projection: Vec::new(),
                    param_types: params,
                    column_types: Vec::new(),
                })
            }
            Parsed::Select {
                table,
                projection,
                restricted,
            } => {
                let prefix_len = restricted.len();
                let in_key_order = restricted
                    .iter()
                    .zip(&schema.key_columns)
                    .all(|(name, column)| *name == column.name);
                if prefix_len > schema.arity() || !in_key_order {
                    return Err(invalid(format!(
                        "WHERE clause on {} must restrict a prefix of the primary key",
                        table
                    )));
                }
                if prefix_len < schema.partition_key_len.max(1) {
                    return Err(invalid(format!(
                        "partition key of {} is not fully restricted",
                        table
                    )));
                }

                let projection = projection
                    .iter()
                    .map(|name| {
                        schema
                            .column_index(name)
                            .ok_or_else(|| invalid(format!("unknown column {} in {}", name, table)))
                    })
                    .collect::<DriverResult<Vec<_>>>()?;
                let column_types = projection
                    .iter()
                    .filter_map(|&i| schema.column_type(i))
                    .collect();
                let param_types = schema.key_columns[..prefix_len]
                    .iter()
                    .map(|c| c.ty)
                    .collect();

                Ok(Plan {
                    kind: StatementKind::Select,
                    table: table.clone(),
                    prefix_len,
                    projection,
                    param_types,
                    column_types,
                })
            }
        }
    }
}

/// A statement checked against its table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: StatementKind,
    pub table: String,
    /// Key columns bound by the statement
    pub prefix_len: usize,
    /// Selected column positions (key columns, then the value column)
    pub projection: Vec<usize>,
    pub param_types: Vec<ValueType>,
    pub column_types: Vec<ValueType>,
}

fn parse_insert(rest: &str) -> DriverResult<Parsed> {
    let (table, rest) = rest
        .split_once('(')
        .ok_or_else(|| invalid("INSERT without a column list"))?;
    let (columns, rest) = rest
        .split_once(')')
        .ok_or_else(|| invalid("unterminated INSERT column list"))?;
    let columns = split_names(columns);

    let rest = rest.trim();
    let placeholders = rest
        .strip_prefix("VALUES (")
        .and_then(|r| r.split_once(')'))
        .ok_or_else(|| invalid("INSERT without VALUES"))?;
    let (values, tail) = placeholders;
    if split_names(values).iter().any(|v| v != "?") || split_names(values).len() != columns.len()
    {
        return Err(invalid("INSERT VALUES must be one ? per column"));
    }
    if tail.trim() != "USING TTL ? AND TIMESTAMP ?" {
        return Err(invalid("INSERT must bind USING TTL ? AND TIMESTAMP ?"));
    }

    Ok(Parsed::Insert {
        table: table.trim().to_string(),
        columns,
    })
}

fn parse_select(rest: &str) -> DriverResult<Parsed> {
    let (projection, rest) = rest
        .split_once(" FROM ")
        .ok_or_else(|| invalid("SELECT without FROM"))?;
    let (table, predicate) = rest
        .split_once(" WHERE ")
        .ok_or_else(|| invalid("SELECT without WHERE"))?;

    let restricted = predicate
        .split(" AND ")
        .map(|term| {
            let (column, marker) = term
                .split_once('=')
                .ok_or_else(|| invalid(format!("unsupported predicate '{}'", term.trim())))?;
            if marker.trim() != "?" {
                return Err(invalid(format!("predicate '{}' must bind ?", term.trim())));
            }
            Ok(column.trim().to_string())
        })
        .collect::<DriverResult<Vec<_>>>()?;

    Ok(Parsed::Select {
        table: table.trim().to_string(),
        projection: split_names(projection),
        restricted,
    })
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(message: impl Into<String>) -> DriverError {
    DriverError::Invalid(message.into())
}
