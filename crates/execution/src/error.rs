use thiserror::Error;

/// Errors raised while executing a physical operator tree.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("table `{0}` does not exist")]
    TableNotFound(String),
    #[error("column reference `{0}` is ambiguous across the joined schemas")]
    AmbiguousColumn(String),
    #[error("column `{0}` was not found in any input schema")]
    ColumnNotFound(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("integrity error: {0}")]
    IntegrityError(String),
    #[error("transaction {tx_id} denied {action} on `{table}`: {message}")]
    AbortError {
        tx_id: u64,
        table: String,
        action: String,
        message: String,
    },
    #[error("storage error: {0}")]
    Storage(#[from] relix_table::StorageError),
    #[error("schema error: {0}")]
    Schema(#[from] relix_schema::SchemaError),
    #[error("durability error: {0}")]
    Durability(#[from] relix_durability::DurabilityError),
    #[error("predicate/projection parse error: {0}")]
    Expr(#[from] relix_expr::ExprError),
    #[error("not implemented: {0}")]
    NotImplemented(String),
}
