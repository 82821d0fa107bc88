//! Structured data behind the `\dt` / `\d <table>` meta-commands. The
//! commands themselves are handled pre-validation and never fail
//! fatally (`\d` on an unknown table just reports "not found"); the
//! REPL that renders them is out of scope here; this module only
//! builds the data it would print.

use relix_primitives::{ColumnType, ForeignKeyAction};
use relix_schema::Schema;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub col_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub references: Option<ForeignKeyDescription>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForeignKeyDescription {
    pub table: String,
    pub column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDescription {
    pub table_name: String,
    pub columns: Vec<ColumnDescription>,
}

impl From<&Schema> for TableDescription {
    fn from(schema: &Schema) -> Self {
        let columns = schema
            .columns
            .iter()
            .map(|c| ColumnDescription {
                name: c.name.clone(),
                col_type: c.col_type,
                nullable: c.nullable,
                primary_key: c.primary_key,
                references: c.foreign_key.as_ref().map(|fk| ForeignKeyDescription {
                    table: fk.ref_table.clone(),
                    column: fk.ref_column.clone(),
                    on_delete: fk.on_delete,
                    on_update: fk.on_update,
                }),
            })
            .collect();
        Self {
            table_name: schema.table_name.clone(),
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relix_schema::{Column, ForeignKey};

    #[test]
    fn describes_columns_and_foreign_keys() {
        let schema = Schema::new(
            "orders",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("uid", ColumnType::Integer).references(ForeignKey {
                    ref_table: "users".into(),
                    ref_column: "id".into(),
                    on_delete: ForeignKeyAction::Cascade,
                    on_update: ForeignKeyAction::NoAction,
                }),
            ],
        );
        let description = TableDescription::from(&schema);
        assert_eq!(description.table_name, "orders");
        assert!(description.columns[0].primary_key);
        let fk = description.columns[1].references.as_ref().unwrap();
        assert_eq!(fk.table, "users");
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
    }
}
