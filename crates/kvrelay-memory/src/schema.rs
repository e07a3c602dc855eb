use kvrelay_core::{KeyColumn, RelayError, Result, StoreConfig, ValueType};

/// Shape of an in-memory table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Primary key columns in order
    pub key_columns: Vec<KeyColumn>,
    pub value_column: KeyColumn,
    /// Leading key columns every read must restrict (default: 1)
    pub partition_key_len: usize,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        key_columns: Vec<(&str, ValueType)>,
        value_column: (&str, ValueType),
    ) -> Self {
        Self {
            name: name.into(),
            key_columns: key_columns
                .into_iter()
                .map(|(name, ty)| KeyColumn {
                    name: name.to_string(),
                    ty,
                })
                .collect(),
            value_column: KeyColumn {
                name: value_column.0.to_string(),
                ty: value_column.1,
            },
            partition_key_len: 1,
        }
    }

    /// The table a store with this configuration expects.
    pub fn for_store(
        config: &StoreConfig,
        key_types: &[ValueType],
        value_type: ValueType,
    ) -> Result<Self> {
        let names = config.key_fields();
        if names.len() != key_types.len() {
            return Err(RelayError::Config(format!(
                "{} key columns configured but {} key types supplied",
                names.len(),
                key_types.len()
            )));
        }
        let key_columns = names
            .iter()
            .map(String::as_str)
            .zip(key_types.iter().copied())
            .collect();
        Ok(Self::new(
            config.table(),
            key_columns,
            (config.value_field(), value_type),
        ))
    }

    pub fn with_partition_key_len(mut self, len: usize) -> Self {
        self.partition_key_len = len;
        self
    }

    pub fn arity(&self) -> usize {
        self.key_columns.len()
    }

    /// Position of a column: key columns first, then the value column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.key_columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| (self.value_column.name == name).then_some(self.arity()))
    }

    pub fn column_type(&self, index: usize) -> Option<ValueType> {
        if index == self.arity() {
            Some(self.value_column.ty)
        } else {
            self.key_columns.get(index).map(|c| c.ty)
        }
    }
}
