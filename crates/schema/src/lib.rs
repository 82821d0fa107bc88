//! Table schemas, columns, and foreign keys, plus the validation rules
//! applied when a schema is created or altered.

pub mod error;

use relix_primitives::{ColumnType, ForeignKeyAction};
use serde::{Deserialize, Serialize};

pub use error::SchemaError;

/// A foreign key attached to a column: the referenced `(table, column)` and
/// the actions to take on delete/update of the referenced row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub ref_table: String,
    pub ref_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

/// A single column definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub col_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
            primary_key: false,
            nullable: true,
            foreign_key: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn references(mut self, fk: ForeignKey) -> Self {
        self.foreign_key = Some(fk);
        self
    }
}

/// A table schema: name, ordered columns, and (derived) primary-key column
/// name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub table_name: String,
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(table_name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Every foreign key declared on this schema, alongside the owning
    /// column's name.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &ForeignKey)> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref().map(|fk| (c.name.as_str(), fk)))
    }
}

/// Validates a schema in isolation: non-empty name, at least one column, no
/// duplicate names, and exactly one primary key column. Foreign-key target
/// validation requires looking up other tables and is done by
/// [`validate_foreign_keys`].
pub fn validate_schema(schema: &Schema) -> Result<(), SchemaError> {
    if schema.table_name.trim().is_empty() {
        return Err(SchemaError::EmptyName);
    }
    if schema.columns.is_empty() {
        return Err(SchemaError::NoColumns);
    }
    let mut seen = std::collections::HashSet::new();
    for col in &schema.columns {
        if !seen.insert(col.name.as_str()) {
            return Err(SchemaError::DuplicateColumn(col.name.clone()));
        }
    }
    match schema.columns.iter().filter(|c| c.primary_key).count() {
        0 => return Err(SchemaError::PrimaryKeyNotFound(schema.table_name.clone())),
        1 => {}
        _ => return Err(SchemaError::MultiplePrimaryKeys(schema.table_name.clone())),
    }
    Ok(())
}

/// Validates that every foreign key's `(table, column)` target exists, given
/// a lookup function over already-known schemas (as the File Manager would
/// provide from its `schemas/` directory).
pub fn validate_foreign_keys<'a>(
    schema: &Schema,
    lookup: impl Fn(&str) -> Option<&'a Schema>,
) -> Result<(), SchemaError> {
    for (col_name, fk) in schema.foreign_keys() {
        let Some(target) = lookup(&fk.ref_table) else {
            return Err(SchemaError::ForeignKeyTableNotFound {
                column: col_name.to_string(),
                table: fk.ref_table.clone(),
            });
        };
        let Some(ref_col) = target.column(&fk.ref_column) else {
            return Err(SchemaError::ForeignKeyColumnNotFound {
                column: col_name.to_string(),
                table: fk.ref_table.clone(),
                ref_column: fk.ref_column.clone(),
            });
        };
        let col = schema.column(col_name).expect("col_name came from schema.foreign_keys()");
        if col.col_type != ref_col.col_type {
            return Err(SchemaError::ForeignKeyTypeMismatch {
                column: col_name.to_string(),
                table: fk.ref_table.clone(),
                ref_column: fk.ref_column.clone(),
                column_type: col.col_type,
                ref_type: ref_col.col_type,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Schema {
        Schema::new(
            "users",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("name", ColumnType::Varchar(50)),
            ],
        )
    }

    #[test]
    fn validates_a_well_formed_schema() {
        assert!(validate_schema(&users()).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let mut s = users();
        s.table_name = "  ".into();
        assert_eq!(validate_schema(&s), Err(SchemaError::EmptyName));
    }

    #[test]
    fn rejects_no_columns() {
        let s = Schema::new("t", vec![]);
        assert_eq!(validate_schema(&s), Err(SchemaError::NoColumns));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let mut s = users();
        s.columns.push(Column::new("name", ColumnType::Integer));
        assert_eq!(
            validate_schema(&s),
            Err(SchemaError::DuplicateColumn("name".into()))
        );
    }

    #[test]
    fn rejects_a_table_with_no_primary_key() {
        let s = Schema::new("t", vec![Column::new("id", ColumnType::Integer)]);
        assert_eq!(validate_schema(&s), Err(SchemaError::PrimaryKeyNotFound("t".into())));
    }

    #[test]
    fn rejects_a_table_with_more_than_one_primary_key() {
        let s = Schema::new(
            "t",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("code", ColumnType::Integer).primary_key(),
            ],
        );
        assert_eq!(validate_schema(&s), Err(SchemaError::MultiplePrimaryKeys("t".into())));
    }

    #[test]
    fn foreign_key_target_must_exist() {
        let orders = Schema::new(
            "orders",
            vec![
                Column::new("oid", ColumnType::Integer).primary_key(),
                Column::new("uid", ColumnType::Integer).references(ForeignKey {
                    ref_table: "users".into(),
                    ref_column: "id".into(),
                    on_delete: ForeignKeyAction::Cascade,
                    on_update: ForeignKeyAction::NoAction,
                }),
            ],
        );
        let users = users();
        assert!(validate_foreign_keys(&orders, |name| (name == "users").then_some(&users)).is_ok());
        assert!(validate_foreign_keys(&orders, |_| None).is_err());
    }
}
