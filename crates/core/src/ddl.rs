//! DDL statement payloads and the CASCADE drop-table walk. `CreateTable`
//! carries its schema as JSON (the same encoding the file manager
//! persists); the other three statements carry a small JSON object,
//! following the convention in [`crate::dml`].

use crate::dml::{json_object, require_str};
use crate::error::Error;
use relix_execution::StorageBackend;
use relix_primitives::IndexKind;
use relix_schema::Schema;
use std::collections::{HashSet, VecDeque};

#[derive(Clone, Debug, PartialEq)]
pub struct DropTableStatement {
    pub table: String,
    pub cascade: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateIndexStatement {
    pub table: String,
    pub column: String,
    pub kind: IndexKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DropIndexStatement {
    pub table: String,
    pub column: String,
}

pub fn parse_create_table(value: &str) -> Result<Schema, Error> {
    serde_json::from_str(value).map_err(|e| Error::MalformedStatement(format!("CREATE TABLE payload: {e}")))
}

pub fn parse_drop_table(value: &str) -> Result<DropTableStatement, Error> {
    let obj = json_object(value)?;
    Ok(DropTableStatement {
        table: require_str(&obj, "table")?,
        cascade: obj.get("cascade").and_then(|v| v.as_bool()).unwrap_or(false),
    })
}

fn parse_index_kind(obj: &serde_json::Map<String, serde_json::Value>) -> IndexKind {
    match obj.get("kind").and_then(|v| v.as_str()) {
        Some(k) if k.eq_ignore_ascii_case("hash") => IndexKind::Hash,
        _ => IndexKind::BTree,
    }
}

pub fn parse_create_index(value: &str) -> Result<CreateIndexStatement, Error> {
    let obj = json_object(value)?;
    Ok(CreateIndexStatement {
        table: require_str(&obj, "table")?,
        column: require_str(&obj, "column")?,
        kind: parse_index_kind(&obj),
    })
}

pub fn parse_drop_index(value: &str) -> Result<DropIndexStatement, Error> {
    let obj = json_object(value)?;
    Ok(DropIndexStatement {
        table: require_str(&obj, "table")?,
        column: require_str(&obj, "column")?,
    })
}

/// Drops `table`. Without `cascade`, fails with an integrity error if
/// any other table's foreign key still references it (RESTRICT, the
/// default per the external interface). With `cascade`, walks the
/// dependency graph breadth-first from `table`, collects every
/// transitive dependent exactly once (a visited set makes the walk safe
/// against tables that reference each other in a cycle), and drops them
/// in reverse discovery order — leaves before the tables they depend
/// on — so a table is never dropped while something still points at it.
pub fn drop_table(backend: &mut dyn StorageBackend, table: &str, cascade: bool) -> Result<(), Error> {
    if !backend.table_exists(table) {
        return Err(Error::TableNotFound(table.to_string()));
    }

    let direct_dependents = backend.dependents(table);
    if !cascade {
        if let Some((dependent, _)) = direct_dependents.first() {
            return Err(relix_execution::ExecutionError::IntegrityError(format!(
                "cannot drop `{table}`: referenced by `{dependent}`; use CASCADE to drop dependents too"
            ))
            .into());
        }
        backend.drop_table(table)?;
        return Ok(());
    }

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([table.to_string()]);
    visited.insert(table.to_string());
    while let Some(current) = queue.pop_front() {
        order.push(current.clone());
        for (dependent, _) in backend.dependents(&current) {
            if visited.insert(dependent.clone()) {
                queue.push_back(dependent);
            }
        }
    }

    for victim in order.into_iter().rev() {
        backend.drop_table(&victim)?;
    }
    Ok(())
}

pub fn create_index(backend: &mut dyn StorageBackend, stmt: &CreateIndexStatement) -> Result<(), Error> {
    if backend.has_index(&stmt.table, &stmt.column) {
        return Err(Error::IndexExists(stmt.table.clone(), stmt.column.clone()));
    }
    backend.set_index(&stmt.table, &stmt.column, stmt.kind)?;
    Ok(())
}

pub fn drop_index(backend: &mut dyn StorageBackend, stmt: &DropIndexStatement) -> Result<(), Error> {
    if !backend.has_index(&stmt.table, &stmt.column) {
        return Err(Error::IndexNotFound(stmt.table.clone(), stmt.column.clone()));
    }
    backend.drop_index(&stmt.table, &stmt.column)?;
    Ok(())
}
