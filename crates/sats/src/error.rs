use thiserror::Error;

/// Errors raised while encoding a row. Decoding never errors: a
/// truncated buffer simply yields fewer rows than advertised.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    #[error("column `{0}` is NULL but is declared NOT NULL")]
    NullOnNotNullable(String),
    #[error("value for column `{column}` has the wrong type: expected {expected}")]
    WrongType { column: String, expected: &'static str },
}
