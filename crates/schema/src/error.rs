use relix_primitives::ColumnType;
use thiserror::Error;

/// Errors raised while building or validating a [`crate::Schema`]:
/// missing/duplicate tables, missing/duplicate columns, bad FK or PK
/// references.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table name must not be empty")]
    EmptyName,
    #[error("table `{0}` must declare at least one column")]
    NoColumns,
    #[error("duplicate column name `{0}`")]
    DuplicateColumn(String),
    #[error("table `{0}` does not declare a primary key")]
    PrimaryKeyNotFound(String),
    #[error("table `{0}` declares more than one primary key")]
    MultiplePrimaryKeys(String),
    #[error("foreign key on column `{column}` references unknown table `{table}`")]
    ForeignKeyTableNotFound { column: String, table: String },
    #[error("foreign key on column `{column}` references unknown column `{table}.{ref_column}`")]
    ForeignKeyColumnNotFound {
        column: String,
        table: String,
        ref_column: String,
    },
    #[error("foreign key on column `{column}` ({column_type:?}) does not match the type of `{table}.{ref_column}` ({ref_type:?})")]
    ForeignKeyTypeMismatch {
        column: String,
        table: String,
        ref_column: String,
        column_type: ColumnType,
        ref_type: ColumnType,
    },
}
