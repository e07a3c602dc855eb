//! Key/value codec
//!
//! Builds the statements for a table layout and moves keys, values and TTLs in
//! and out of positional statement parameters and result columns.
//!
//! For a key of arity N:
//! - one INSERT binding `k1..kN, value, ttl, timestamp`
//! - one SELECT per prefix length p in 1..=N, projecting the value followed by
//!   the key columns after the prefix, so a partial-key read can recover the
//!   full key of each returned row

use kvrelay_core::{
    BoundStatement, DriverError, Key, KeyColumn, KeySchema, PreparedStatement, RelayError,
    ResultSet, Result, RowMatch, Session, StorableValue, Value, ValueType,
};

/// Table, key columns and value column of a store
#[derive(Debug, Clone)]
pub struct TableLayout {
    table: String,
    schema: KeySchema,
    value_column: String,
    value_type: ValueType,
}

impl TableLayout {
    pub fn new(
        table: impl Into<String>,
        schema: KeySchema,
        value_column: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        Self {
            table: table.into(),
            schema,
            value_column: value_column.into(),
            value_type,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn arity(&self) -> usize {
        self.schema.arity()
    }

    pub fn insert_query(&self) -> String {
        let mut columns: Vec<&str> = self.key_names().collect();
        columns.push(&self.value_column);
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) USING TTL ? AND TIMESTAMP ?",
            self.table,
            columns.join(", "),
            placeholders
        )
    }

    /// SELECT for a key prefix of `prefix_len` columns.
    pub fn select_query(&self, prefix_len: usize) -> String {
        let mut projection = vec![self.value_column.as_str()];
        projection.extend(self.schema.residual(prefix_len).iter().map(|c| c.name.as_str()));
        let predicate = self
            .key_names()
            .take(prefix_len)
            .map(|name| format!("{}=?", name))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "SELECT {} FROM {} WHERE {}",
            projection.join(", "),
            self.table,
            predicate
        )
    }

    /// TTL as bound into the INSERT; the column is a signed 32-bit int.
    pub fn ttl_param(&self, ttl_secs: u32) -> Result<i32> {
        i32::try_from(ttl_secs).map_err(|_| RelayError::Bind {
            index: self.arity() + 1,
            reason: format!("ttl of {} seconds is out of range", ttl_secs),
        })
    }

    /// Bind a full key, value, TTL and write timestamp into the INSERT.
    pub fn bind_insert(
        &self,
        session: &dyn Session,
        insert: &PreparedStatement,
        key: &Key,
        value: Value,
        ttl_secs: u32,
        timestamp_micros: i64,
    ) -> Result<BoundStatement> {
        let mut statement = insert.bind();
        let arity = key.len();
        for (index, part) in key.parts().iter().enumerate() {
            bind_at(session, &mut statement, index, part.clone())?;
        }
        bind_at(session, &mut statement, arity, value)?;

        let ttl = self.ttl_param(ttl_secs)?;
        bind_at(session, &mut statement, arity + 1, Value::Int(ttl))?;
        bind_at(session, &mut statement, arity + 2, Value::BigInt(timestamp_micros))?;
        Ok(statement)
    }

    /// Bind a key prefix into the matching SELECT.
    pub fn bind_select(
        &self,
        session: &dyn Session,
        select: &PreparedStatement,
        prefix: &Key,
    ) -> Result<BoundStatement> {
        let mut statement = select.bind();
        for (index, part) in prefix.parts().iter().enumerate() {
            bind_at(session, &mut statement, index, part.clone())?;
        }
        Ok(statement)
    }

    /// Decode the rows of a prefix read.
    pub fn decode_rows<V: StorableValue>(
        &self,
        prefix_len: usize,
        result: ResultSet,
    ) -> Result<Vec<RowMatch<V>>> {
        let residual: &[KeyColumn] = self.schema.residual(prefix_len);
        result
            .into_rows()
            .into_iter()
            .map(|row| {
                let value = row
                    .extract(0, V::VALUE_TYPE)
                    .map_err(|e| value_error(0, e))
                    .and_then(|v| V::from_value(v, 0))?;
                let residual_key = residual
                    .iter()
                    .enumerate()
                    .map(|(i, column)| {
                        row.extract(i + 1, column.ty)
                            .map_err(|e| value_error(i + 1, e))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(RowMatch {
                    value,
                    residual_key,
                })
            })
            .collect()
    }

    fn key_names(&self) -> impl Iterator<Item = &str> {
        self.schema.columns().iter().map(|c| c.name.as_str())
    }
}

fn bind_at(
    session: &dyn Session,
    statement: &mut BoundStatement,
    index: usize,
    value: Value,
) -> Result<()> {
    session
        .bind(statement, index, value)
        .map_err(|e| RelayError::Bind {
            index,
            reason: e.to_string(),
        })
}

fn value_error(column: usize, err: DriverError) -> RelayError {
    RelayError::Value {
        column,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvrelay_core::{DriverResult, Row};
    use std::time::Duration;

    struct BindOnly;

    impl Session for BindOnly {
        fn prepare(&self, _query: &str, _timeout: Duration) -> DriverResult<PreparedStatement> {
            Err(DriverError::Invalid("not supported".into()))
        }

        fn execute(&self, _stmt: &BoundStatement, _timeout: Duration) -> DriverResult<ResultSet> {
            Ok(ResultSet::empty())
        }
    }

    fn layout() -> TableLayout {
        let schema = KeySchema::new(
            vec!["tenant".into(), "user_id".into(), "seq".into()],
            vec![ValueType::Text, ValueType::BigInt, ValueType::Int],
        )
        .unwrap();
        TableLayout::new("app.sessions", schema, "payload", ValueType::Blob)
    }

    #[test]
    fn test_insert_query_shape() {
        assert_eq!(
            layout().insert_query(),
            "INSERT INTO app.sessions (tenant, user_id, seq, payload) \
             VALUES (?, ?, ?, ?) USING TTL ? AND TIMESTAMP ?"
        );
    }

    #[test]
    fn test_select_query_per_prefix() {
        let layout = layout();
        assert_eq!(
            layout.select_query(1),
            "SELECT payload, user_id, seq FROM app.sessions WHERE tenant=?"
        );
        assert_eq!(
            layout.select_query(3),
            "SELECT payload FROM app.sessions WHERE tenant=? AND user_id=? AND seq=?"
        );
    }

    #[test]
    fn test_bind_insert_positions() {
        let layout = layout();
        let insert = PreparedStatement::new(
            1,
            &layout.insert_query(),
            vec![
                ValueType::Text,
                ValueType::BigInt,
                ValueType::Int,
                ValueType::Blob,
                ValueType::Int,
                ValueType::BigInt,
            ],
            vec![],
        );
        let key = Key::from(("acme", 7i64, 1i32));
        let bound = layout
            .bind_insert(&BindOnly, &insert, &key, Value::Blob(vec![1]), 60, 1_000)
            .unwrap();
        assert!(bound.is_fully_bound());
        assert_eq!(bound.params()[4], Some(Value::Int(60)));
        assert_eq!(bound.params()[5], Some(Value::BigInt(1_000)));

        let err = layout
            .bind_insert(&BindOnly, &insert, &key, Value::Text("x".into()), 60, 0)
            .unwrap_err();
        assert!(matches!(err, RelayError::Bind { index: 3, .. }));

        let err = layout
            .bind_insert(&BindOnly, &insert, &key, Value::Blob(vec![]), u32::MAX, 0)
            .unwrap_err();
        assert!(matches!(err, RelayError::Bind { index: 4, .. }));
    }

    #[test]
    fn test_decode_rows_with_residual_key() {
        let layout = layout();
        let result = ResultSet::new(vec![
            Row::new(vec![
                Some(Value::Blob(vec![1])),
                Some(Value::BigInt(7)),
                Some(Value::Int(1)),
            ]),
            Row::new(vec![
                Some(Value::Blob(vec![2])),
                Some(Value::BigInt(7)),
                Some(Value::Int(2)),
            ]),
        ]);
        let rows: Vec<RowMatch<Vec<u8>>> = layout.decode_rows(1, result).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value, vec![2]);
        assert_eq!(rows[1].residual_key, vec![Value::BigInt(7), Value::Int(2)]);
    }

    #[test]
    fn test_decode_rejects_wrong_column_type() {
        let layout = layout();
        let result = ResultSet::new(vec![Row::new(vec![Some(Value::Text("x".into()))])]);
        let err = layout.decode_rows::<Vec<u8>>(3, result).unwrap_err();
        assert!(matches!(err, RelayError::Value { column: 0, .. }));

        let result = ResultSet::new(vec![Row::new(vec![Some(Value::Blob(vec![])), None, None])]);
        let err = layout.decode_rows::<Vec<u8>>(1, result).unwrap_err();
        assert!(matches!(err, RelayError::Value { column: 1, .. }));
    }
}
