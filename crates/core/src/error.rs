use thiserror::Error;

/// The outermost error type the processor surfaces. Every lower-level
/// error composes upward via `#[from]`; `anyhow::Error` is deliberately
/// not a variant here — it is used only at the DML retry boundary in
/// [`crate::processor::Processor`], never as part of this taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax { message: String, line: u32, column: u32 },
    #[error(transparent)]
    Schema(#[from] relix_schema::SchemaError),
    #[error(transparent)]
    Execution(#[from] relix_execution::ExecutionError),
    #[error(transparent)]
    Durability(#[from] relix_durability::DurabilityError),
    #[error(transparent)]
    Expr(#[from] relix_expr::ExprError),
    #[error(transparent)]
    Cost(#[from] relix_physical_plan::CostError),
    #[error("malformed statement payload: {0}")]
    MalformedStatement(String),
    #[error("table `{0}` not found")]
    TableNotFound(String),
    #[error("index on `{0}`.`{1}` not found")]
    IndexNotFound(String, String),
    #[error("index on `{0}`.`{1}` already exists")]
    IndexExists(String, String),
    #[error("no active transaction to {0}")]
    NoActiveTransaction(String),
    #[error("a transaction is already active (tx {0}); only one active transaction per processor instance")]
    TransactionAlreadyActive(u64),
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    pub fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self::Syntax {
            message: message.into(),
            line,
            column,
        }
    }
}
