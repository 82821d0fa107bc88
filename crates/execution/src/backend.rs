use crate::error::ExecutionError;
use crate::rows::Rows;
use relix_expr::ConditionNode;
use relix_primitives::IndexKind;
use relix_sats::Value;
use relix_schema::Schema;
use std::collections::HashMap;

/// A read request against one table: the columns to project (empty
/// means all), an optional filter, and an optional limit/offset applied
/// at the storage layer when an index can satisfy them directly.
#[derive(Clone, Debug)]
pub struct DataRetrieval {
    pub table: String,
    pub columns: Vec<String>,
    pub condition: Option<ConditionNode>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl DataRetrieval {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            condition: None,
            limit: None,
            offset: None,
        }
    }
}

/// An INSERT (`is_update = false`) or UPDATE (`is_update = true`)
/// request. For an UPDATE, `condition` selects the rows to touch and
/// `values` carries only the columns being assigned.
#[derive(Clone, Debug)]
pub struct DataWrite {
    pub table: String,
    pub values: HashMap<String, Value>,
    pub is_update: bool,
    pub condition: Option<ConditionNode>,
}

/// A DELETE request.
#[derive(Clone, Debug)]
pub struct DataDeletion {
    pub table: String,
    pub condition: Option<ConditionNode>,
}

/// Everything the physical operators need from the storage layer,
/// expressed as a trait so the execution crate never depends on a
/// concrete storage implementation.
pub trait StorageBackend {
    fn table_schema(&self, table: &str) -> Result<Schema, ExecutionError>;
    fn table_exists(&self, table: &str) -> bool;

    fn read_rows(&mut self, request: &DataRetrieval) -> Result<Rows, ExecutionError>;
    fn write_rows(&mut self, request: &DataWrite) -> Result<u64, ExecutionError>;
    fn delete_rows(&mut self, request: &DataDeletion) -> Result<u64, ExecutionError>;

    fn set_index(&mut self, table: &str, column: &str, kind: IndexKind) -> Result<(), ExecutionError>;
    fn drop_index(&mut self, table: &str, column: &str) -> Result<(), ExecutionError>;
    fn has_index(&self, table: &str, column: &str) -> bool;

    fn create_table(&mut self, schema: Schema) -> Result<(), ExecutionError>;
    fn drop_table(&mut self, table: &str) -> Result<(), ExecutionError>;
    fn list_tables(&self) -> Vec<String>;

    /// Tables (and their foreign keys) that reference `table`, for
    /// RESTRICT/CASCADE/SET NULL enforcement on DELETE/DROP TABLE.
    fn dependents(&self, table: &str) -> Vec<(String, relix_schema::ForeignKey)>;
}
