use relix_sats::Value;
use relix_schema::Schema;
use std::collections::HashMap;

/// A row during execution: keys are always qualified `table.column` (or
/// `alias.column`), unlike the unqualified rows stored on disk.
pub type QualifiedRow = HashMap<String, Value>;

/// An in-flight result set: a sequence of qualified rows plus the list
/// of schemas currently participating (more than one once a join has
/// run).
#[derive(Clone, Debug, Default)]
pub struct Rows {
    pub schemas: Vec<Schema>,
    pub rows: Vec<QualifiedRow>,
}

impl Rows {
    pub fn new(schemas: Vec<Schema>, rows: Vec<QualifiedRow>) -> Self {
        Self { schemas, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows_count(&self) -> usize {
        self.rows.len()
    }

    /// Qualifies every row in an unqualified storage-layer row set under
    /// `table_or_alias`.
    pub fn qualify(table_or_alias: &str, schema: Schema, unqualified: Vec<relix_sats::Row>) -> Self {
        let rows = unqualified
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(col, value)| (format!("{table_or_alias}.{col}"), value))
                    .collect()
            })
            .collect();
        Self::new(vec![schema], rows)
    }
}
