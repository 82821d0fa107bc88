use thiserror::Error;

/// Parse-time errors raised by the predicate, projection, and order-by
/// mini-parsers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected end of input while parsing `{0}`")]
    UnexpectedEof(String),
    #[error("unexpected token `{found}` at position {pos} while parsing `{source}`")]
    UnexpectedToken {
        source: String,
        found: String,
        pos: usize,
    },
    #[error("column reference `{0}` is ambiguous across the joined schemas")]
    AmbiguousColumn(String),
    #[error("column `{0}` was not found in any input schema")]
    ColumnNotFound(String),
    #[error("projection expressions with arithmetic or function calls are not implemented: `{0}`")]
    UnsupportedExpression(String),
    #[error("malformed integer literal `{0}`")]
    MalformedInteger(String),
}
