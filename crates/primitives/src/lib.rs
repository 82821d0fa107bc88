//! Small shared types used across the relix crates: stable identifiers and
//! the handful of enums that show up at every layer (foreign-key actions,
//! comparison/logical operators, column types).

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A stable row identifier: the row's index within a table's current
/// physical layout.
pub struct Rid(pub u64);

impl Rid {
    pub fn new(idx: u64) -> Self {
        Self(idx)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Column data types supported by the schema layer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Float,
    Char(u16),
    Varchar(u16),
}

impl ColumnType {
    /// Maximum number of bytes this column's payload (excluding the null
    /// bitmap bit) can occupy once serialized.
    pub fn max_encoded_len(self) -> usize {
        match self {
            ColumnType::Integer => 4,
            ColumnType::Float => 8,
            ColumnType::Char(n) => n as usize,
            ColumnType::Varchar(n) => 2 + n as usize,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Char(_) => "CHAR",
            ColumnType::Varchar(_) => "VARCHAR",
        }
    }
}

/// Referential-integrity action attached to a foreign key, for either
/// `ON DELETE` or `ON UPDATE`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ForeignKeyAction {
    Restrict,
    Cascade,
    SetNull,
    #[default]
    NoAction,
}

/// Comparison operators recognized by the condition parser and cardinality
/// estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn from_token(tok: &str) -> Option<Self> {
        Some(match tok {
            "=" => CompareOp::Eq,
            "!=" | "<>" => CompareOp::NotEq,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::LtEq,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::GtEq,
            _ => return None,
        })
    }
}

/// Index implementation requested at `CREATE INDEX` time. The source (and
/// this core) only ever builds a B+-tree; `Hash` is accepted syntactically
/// and mapped onto the same engine (see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IndexKind {
    #[default]
    BTree,
    Hash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_type_max_encoded_len() {
        assert_eq!(ColumnType::Integer.max_encoded_len(), 4);
        assert_eq!(ColumnType::Float.max_encoded_len(), 8);
        assert_eq!(ColumnType::Char(10).max_encoded_len(), 10);
        assert_eq!(ColumnType::Varchar(10).max_encoded_len(), 12);
    }

    #[test]
    fn compare_op_tokens() {
        assert_eq!(CompareOp::from_token("<>"), Some(CompareOp::NotEq));
        assert_eq!(CompareOp::from_token("!="), Some(CompareOp::NotEq));
        assert_eq!(CompareOp::from_token("nope"), None);
    }
}
