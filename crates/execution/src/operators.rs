//! The physical operator tree: interprets a (post-optimization) query
//! tree over a [`StorageBackend`] and a [`Ccm`], and the direct
//! INSERT/UPDATE/DELETE entry points that bypass the optimizer entirely
//! since they touch a single table.

use crate::backend::{DataDeletion, DataRetrieval, DataWrite, StorageBackend};
use crate::ccm::{Access, Ccm};
use crate::error::ExecutionError;
use crate::eval::{eval, resolve_column};
use crate::rows::{QualifiedRow, Rows};
use relix_expr::{parse_condition, parse_order_by, parse_projection, ConditionNode, NodeType, ProjectionItem, QueryNode};
use relix_primitives::ForeignKeyAction;
use relix_sats::Value;
use std::collections::HashSet;

fn abort(tx_id: u64, table: &str, action: &str, message: impl Into<String>) -> ExecutionError {
    ExecutionError::AbortError {
        tx_id,
        table: table.to_string(),
        action: action.to_string(),
        message: message.into(),
    }
}

fn authorize(
    backend: &dyn StorageBackend,
    ccm: &mut dyn Ccm,
    tx_id: u64,
    table: &str,
    access: Access,
) -> Result<(), ExecutionError> {
    if !backend.table_exists(table) {
        return Err(ExecutionError::TableNotFound(table.to_string()));
    }
    if !ccm.validate_object(table, tx_id, access) {
        return Err(abort(tx_id, table, &access.to_string(), "concurrency control denied access"));
    }
    Ok(())
}

/// Splits a `Table` node's value into `(table_name, alias)`, supporting
/// `table`, `table alias` and `table AS alias` spellings.
fn table_and_alias(value: &str) -> (&str, &str) {
    let mut parts = value.split_whitespace();
    let table = parts.next().unwrap_or(value);
    let next = parts.next();
    let alias = match next {
        Some(a) if a.eq_ignore_ascii_case("as") => parts.next().unwrap_or(table),
        Some(a) => a,
        None => table,
    };
    (table, alias)
}

/// Interprets a SELECT-shaped query tree, producing the final qualified
/// row set. `Insert`/`Update`/`Delete`/DDL node types are not handled
/// here — those go through [`execute_insert`], [`execute_update`], and
/// [`execute_delete`] directly.
pub fn execute_select(
    node: &QueryNode,
    backend: &mut dyn StorageBackend,
    ccm: &mut dyn Ccm,
    tx_id: u64,
) -> Result<Rows, ExecutionError> {
    match node.node_type {
        NodeType::Table => {
            let (table, alias) = table_and_alias(&node.value);
            authorize(backend, ccm, tx_id, table, Access::Read)?;
            let schema = backend.table_schema(table)?;
            let request = DataRetrieval::new(table);
            let raw = backend.read_rows(&request)?;
            Ok(Rows::qualify(alias, schema, raw.rows))
        }
        NodeType::Selection => {
            let input = execute_select(&node.children[0], backend, ccm, tx_id)?;
            let condition = parse_condition(&node.value)?;
            filter_rows(input, &condition)
        }
        NodeType::Projection => {
            let input = execute_select(&node.children[0], backend, ccm, tx_id)?;
            project_rows(input, &node.value)
        }
        NodeType::Join | NodeType::ThetaJoin => {
            let left = execute_select(&node.children[0], backend, ccm, tx_id)?;
            let right = execute_select(&node.children[1], backend, ccm, tx_id)?;
            let condition = parse_condition(&node.value)?;
            theta_join(left, right, &condition)
        }
        NodeType::NaturalJoin => {
            let left = execute_select(&node.children[0], backend, ccm, tx_id)?;
            let right = execute_select(&node.children[1], backend, ccm, tx_id)?;
            natural_join(left, right)
        }
        NodeType::CartesianProduct => {
            let left = execute_select(&node.children[0], backend, ccm, tx_id)?;
            let right = execute_select(&node.children[1], backend, ccm, tx_id)?;
            cartesian(left, right)
        }
        NodeType::OrderBy => {
            let input = execute_select(&node.children[0], backend, ccm, tx_id)?;
            sort_rows(input, &node.value)
        }
        NodeType::Limit => {
            let input = execute_select(&node.children[0], backend, ccm, tx_id)?;
            limit_rows(input, &node.value)
        }
        other => Err(ExecutionError::NotImplemented(format!(
            "{other:?} is not a query-tree node"
        ))),
    }
}

fn filter_rows(input: Rows, condition: &ConditionNode) -> Result<Rows, ExecutionError> {
    let mut kept = Vec::with_capacity(input.rows.len());
    for row in input.rows {
        if eval(condition, &row)? {
            kept.push(row);
        }
    }
    Ok(Rows::new(input.schemas, kept))
}

fn project_rows(input: Rows, projection_text: &str) -> Result<Rows, ExecutionError> {
    let items = parse_projection(projection_text)?;
    let mut out = Vec::with_capacity(input.rows.len());
    for row in &input.rows {
        let mut projected = QualifiedRow::new();
        for item in &items {
            match item {
                ProjectionItem::Star => {
                    for (k, v) in row {
                        projected.insert(k.clone(), v.clone());
                    }
                }
                ProjectionItem::TableStar(table) => {
                    let prefix = format!("{table}.");
                    for (k, v) in row {
                        if k.starts_with(&prefix) {
                            projected.insert(k.clone(), v.clone());
                        }
                    }
                }
                ProjectionItem::Column(name) => {
                    let key = resolve_column(name, row)?;
                    projected.insert(key.to_string(), row[key].clone());
                }
                ProjectionItem::Aliased { column, alias } => {
                    let key = resolve_column(column, row)?;
                    projected.insert(alias.clone(), row[key].clone());
                }
            }
        }
        out.push(projected);
    }
    Ok(Rows::new(input.schemas, out))
}

fn theta_join(left: Rows, right: Rows, condition: &ConditionNode) -> Result<Rows, ExecutionError> {
    let mut schemas = left.schemas.clone();
    schemas.extend(right.schemas.clone());
    let mut out = Vec::new();
    for l in &left.rows {
        for r in &right.rows {
            let mut combined = l.clone();
            combined.extend(r.clone());
            if eval(condition, &combined)? {
                out.push(combined);
            }
        }
    }
    Ok(Rows::new(schemas, out))
}

fn cartesian(left: Rows, right: Rows) -> Result<Rows, ExecutionError> {
    let mut schemas = left.schemas.clone();
    schemas.extend(right.schemas.clone());
    let mut out = Vec::with_capacity(left.rows.len() * right.rows.len());
    for l in &left.rows {
        for r in &right.rows {
            let mut combined = l.clone();
            combined.extend(r.clone());
            out.push(combined);
        }
    }
    Ok(Rows::new(schemas, out))
}

/// Joins on equality across every base column name shared by both sides
/// (ignoring table qualifiers), dropping the right-hand copy of each
/// shared column from the result.
fn natural_join(left: Rows, right: Rows) -> Result<Rows, ExecutionError> {
    let base = |k: &str| k.rsplit('.').next().unwrap_or(k).to_string();
    let left_bases: HashSet<String> = left.rows.first().map(|r| r.keys().map(|k| base(k)).collect()).unwrap_or_default();
    let right_bases: HashSet<String> = right.rows.first().map(|r| r.keys().map(|k| base(k)).collect()).unwrap_or_default();
    let shared: Vec<String> = left_bases.intersection(&right_bases).cloned().collect();

    let mut schemas = left.schemas.clone();
    schemas.extend(right.schemas.clone());
    let mut out = Vec::new();
    for l in &left.rows {
        for r in &right.rows {
            let matches = shared.iter().all(|col| {
                let lv = l.iter().find(|(k, _)| base(k) == *col).map(|(_, v)| v);
                let rv = r.iter().find(|(k, _)| base(k) == *col).map(|(_, v)| v);
                matches!((lv, rv), (Some(a), Some(b)) if !a.is_null() && values_equal(a, b))
            });
            if !matches {
                continue;
            }
            let mut combined = l.clone();
            for (k, v) in r {
                if !shared.contains(&base(k)) {
                    combined.insert(k.clone(), v.clone());
                }
            }
            out.push(combined);
        }
    }
    Ok(Rows::new(schemas, out))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => *x as f64 == *y,
        (Value::Text(x), Value::Text(y)) => x == y,
        _ => false,
    }
}

/// Compares two non-null values for sorting: numerics compare
/// numerically regardless of INTEGER/FLOAT, text compares lexically,
/// and a numeric-vs-text mismatch falls back to ordering by type so the
/// sort never panics.
fn compare_non_null(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.numeric(), b.numeric()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => match (a.as_text(), b.as_text()) {
            (Some(x), Some(y)) => x.cmp(y),
            _ => value_type_rank(a).cmp(&value_type_rank(b)),
        },
    }
}

fn value_type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Integer(_) | Value::Float(_) => 1,
        Value::Text(_) => 2,
    }
}

fn sort_rows(input: Rows, order_text: &str) -> Result<Rows, ExecutionError> {
    let keys = parse_order_by(order_text)?;
    let mut rows = input.rows;
    let mut resolved: Vec<Vec<String>> = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut row_keys = Vec::with_capacity(keys.len());
        for key in &keys {
            row_keys.push(resolve_column(&key.column, row)?.to_string());
        }
        resolved.push(row_keys);
    }
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    indices.sort_by(|&a, &b| {
        for (i, key) in keys.iter().enumerate() {
            let va = &rows[a][&resolved[a][i]];
            let vb = &rows[b][&resolved[b][i]];
            let (na, nb) = (va.is_null(), vb.is_null());
            let ordering = match (na, nb) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => std::cmp::Ordering::Greater,
                (false, true) => std::cmp::Ordering::Less,
                (false, false) => compare_non_null(va, vb),
            };
            let ordering = if key.descending { ordering.reverse() } else { ordering };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    let sorted = indices.into_iter().map(|i| std::mem::take(&mut rows[i])).collect();
    Ok(Rows::new(input.schemas, sorted))
}

/// Parses `"n"` or `"n,offset"` as produced by the plan generator for a
/// `Limit` node.
fn limit_rows(input: Rows, value: &str) -> Result<Rows, ExecutionError> {
    let mut parts = value.split(',');
    let limit: usize = parts
        .next()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ExecutionError::TypeError(format!("invalid LIMIT clause `{value}`")))?;
    let offset: usize = match parts.next() {
        Some(s) => s.trim().parse().map_err(|_| ExecutionError::TypeError(format!("invalid OFFSET in `{value}`")))?,
        None => 0,
    };
    let rows = input.rows.into_iter().skip(offset).take(limit).collect();
    Ok(Rows::new(input.schemas, rows))
}

/// Runs an INSERT directly against the storage backend: validates every
/// declared foreign key targets an existing row before the write lands.
pub fn execute_insert(
    backend: &mut dyn StorageBackend,
    ccm: &mut dyn Ccm,
    tx_id: u64,
    table: &str,
    values: std::collections::HashMap<String, Value>,
) -> Result<u64, ExecutionError> {
    authorize(backend, ccm, tx_id, table, Access::Write)?;
    let schema = backend.table_schema(table)?;
    for (column, fk) in schema.foreign_keys() {
        let Some(value) = values.get(column) else { continue };
        if value.is_null() {
            continue;
        }
        if !parent_row_exists(backend, &fk.ref_table, &fk.ref_column, value)? {
            return Err(ExecutionError::IntegrityError(format!(
                "insert into `{table}` violates foreign key `{column}` -> `{}`.`{}`",
                fk.ref_table, fk.ref_column
            )));
        }
    }
    let request = DataWrite {
        table: table.to_string(),
        values,
        is_update: false,
        condition: None,
    };
    Ok(backend.write_rows(&request)?)
}

fn parent_row_exists(
    backend: &mut dyn StorageBackend,
    table: &str,
    column: &str,
    value: &Value,
) -> Result<bool, ExecutionError> {
    let condition = equality_condition(column, value.clone());
    let request = DataRetrieval {
        condition: Some(condition),
        limit: Some(1),
        ..DataRetrieval::new(table)
    };
    Ok(backend.read_rows(&request)?.rows_count() > 0)
}

fn equality_condition(column: &str, value: Value) -> ConditionNode {
    ConditionNode::Simple(relix_expr::Predicate::Compare {
        lhs: relix_expr::Operand::Column(column.to_string()),
        op: relix_primitives::CompareOp::Eq,
        rhs: relix_expr::Operand::Literal(value),
    })
}

/// Runs an UPDATE directly against the storage backend.
pub fn execute_update(
    backend: &mut dyn StorageBackend,
    ccm: &mut dyn Ccm,
    tx_id: u64,
    table: &str,
    values: std::collections::HashMap<String, Value>,
    condition: Option<ConditionNode>,
) -> Result<u64, ExecutionError> {
    authorize(backend, ccm, tx_id, table, Access::Write)?;
    let schema = backend.table_schema(table)?;
    for (column, fk) in schema.foreign_keys() {
        let Some(value) = values.get(column) else { continue };
        if value.is_null() {
            continue;
        }
        if !parent_row_exists(backend, &fk.ref_table, &fk.ref_column, value)? {
            return Err(ExecutionError::IntegrityError(format!(
                "update of `{table}` violates foreign key `{column}` -> `{}`.`{}`",
                fk.ref_table, fk.ref_column
            )));
        }
    }
    let request = DataWrite {
        table: table.to_string(),
        values,
        is_update: true,
        condition,
    };
    Ok(backend.write_rows(&request)?)
}

/// Runs a DELETE, recursively resolving every foreign key that
/// references `table` per its declared `ON DELETE` action. Tables
/// already being unwound in the current call chain are skipped on a
/// repeat visit, which breaks delete cycles between mutually
/// referencing tables without double-counting affected rows.
pub fn execute_delete(
    backend: &mut dyn StorageBackend,
    ccm: &mut dyn Ccm,
    tx_id: u64,
    table: &str,
    condition: Option<ConditionNode>,
) -> Result<u64, ExecutionError> {
    let mut visiting = HashSet::new();
    execute_delete_internal(backend, ccm, tx_id, table, condition, &mut visiting)
}

fn execute_delete_internal(
    backend: &mut dyn StorageBackend,
    ccm: &mut dyn Ccm,
    tx_id: u64,
    table: &str,
    condition: Option<ConditionNode>,
    visiting: &mut HashSet<String>,
) -> Result<u64, ExecutionError> {
    if !visiting.insert(table.to_string()) {
        return Ok(0);
    }
    authorize(backend, ccm, tx_id, table, Access::Write)?;

    let victims = backend.read_rows(&DataRetrieval {
        condition: condition.clone(),
        ..DataRetrieval::new(table)
    })?;

    let mut affected = 0u64;
    for (child_table, fk) in backend.dependents(table) {
        let child_schema = backend.table_schema(&child_table)?;
        let Some((owning_column, _)) = child_schema.foreign_keys().find(|(_, f)| **f == fk) else {
            continue;
        };
        for row in &victims.rows {
            let Some(parent_value) = row.get(&fk.ref_column).cloned() else {
                continue;
            };
            if parent_value.is_null() {
                continue;
            }
            let child_condition = equality_condition(owning_column, parent_value.clone());
            let referencing = backend.read_rows(&DataRetrieval {
                condition: Some(child_condition.clone()),
                limit: Some(1),
                ..DataRetrieval::new(child_table.as_str())
            })?;
            if referencing.rows_count() == 0 {
                continue;
            }
            match fk.on_delete {
                ForeignKeyAction::Restrict | ForeignKeyAction::NoAction => {
                    return Err(ExecutionError::IntegrityError(format!(
                        "cannot delete from `{table}`: referenced by `{child_table}`.`{owning_column}`"
                    )));
                }
                ForeignKeyAction::Cascade => {
                    affected += execute_delete_internal(
                        backend,
                        ccm,
                        tx_id,
                        &child_table,
                        Some(child_condition),
                        visiting,
                    )?;
                }
                ForeignKeyAction::SetNull => {
                    let mut null_update = std::collections::HashMap::new();
                    null_update.insert(owning_column.to_string(), Value::Null);
                    affected += backend.write_rows(&DataWrite {
                        table: child_table.clone(),
                        values: null_update,
                        is_update: true,
                        condition: Some(child_condition),
                    })?;
                }
            }
        }
    }
    affected += backend.delete_rows(&DataDeletion {
        table: table.to_string(),
        condition,
    })?;
    visiting.remove(table);
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccm::AllowAllCcm;
    use relix_primitives::ColumnType;
    use relix_schema::{Column, ForeignKey, Schema};
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeBackend {
        schemas: HashMap<String, Schema>,
        data: RefCell<HashMap<String, Vec<relix_sats::Row>>>,
        dependents: HashMap<String, Vec<(String, ForeignKey)>>,
    }

    impl StorageBackend for FakeBackend {
        fn table_schema(&self, table: &str) -> Result<Schema, ExecutionError> {
            self.schemas.get(table).cloned().ok_or_else(|| ExecutionError::TableNotFound(table.to_string()))
        }
        fn table_exists(&self, table: &str) -> bool {
            self.schemas.contains_key(table)
        }
        fn read_rows(&mut self, request: &DataRetrieval) -> Result<Rows, ExecutionError> {
            let rows = self.data.borrow().get(&request.table).cloned().unwrap_or_default();
            let matching: Vec<relix_sats::Row> = rows
                .into_iter()
                .filter(|r| match &request.condition {
                    None => true,
                    Some(cond) => eval(cond, r).unwrap_or(false),
                })
                .collect();
            Ok(Rows::new(vec![], matching))
        }
        fn write_rows(&mut self, request: &DataWrite) -> Result<u64, ExecutionError> {
            let mut data = self.data.borrow_mut();
            let rows = data.entry(request.table.clone()).or_default();
            if request.is_update {
                let mut count = 0;
                for row in rows.iter_mut() {
                    let matches = match &request.condition {
                        None => true,
                        Some(cond) => eval(cond, row).unwrap_or(false),
                    };
                    if matches {
                        for (k, v) in &request.values {
                            row.insert(k.clone(), v.clone());
                        }
                        count += 1;
                    }
                }
                Ok(count)
            } else {
                rows.push(request.values.clone());
                Ok(1)
            }
        }
        fn delete_rows(&mut self, request: &DataDeletion) -> Result<u64, ExecutionError> {
            let mut data = self.data.borrow_mut();
            let rows = data.entry(request.table.clone()).or_default();
            let before = rows.len();
            rows.retain(|r| match &request.condition {
                None => false,
                Some(cond) => !eval(cond, r).unwrap_or(false),
            });
            Ok((before - rows.len()) as u64)
        }
        fn set_index(&mut self, _: &str, _: &str, _: relix_primitives::IndexKind) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn drop_index(&mut self, _: &str, _: &str) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn has_index(&self, _: &str, _: &str) -> bool {
            false
        }
        fn create_table(&mut self, _: Schema) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn drop_table(&mut self, _: &str) -> Result<(), ExecutionError> {
            Ok(())
        }
        fn list_tables(&self) -> Vec<String> {
            self.schemas.keys().cloned().collect()
        }
        fn dependents(&self, table: &str) -> Vec<(String, ForeignKey)> {
            self.dependents.get(table).cloned().unwrap_or_default()
        }
    }

    fn dept_employee_backend(on_delete: ForeignKeyAction) -> FakeBackend {
        let dept_schema = Schema::new("dept", vec![Column::new("id", ColumnType::Integer).primary_key()]);
        let fk = ForeignKey {
            ref_table: "dept".into(),
            ref_column: "id".into(),
            on_delete,
            on_update: ForeignKeyAction::NoAction,
        };
        let employee_schema = Schema::new(
            "employee",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("dept_id", ColumnType::Integer).references(fk.clone()),
            ],
        );
        let mut data = HashMap::new();
        data.insert(
            "dept".to_string(),
            vec![[("id".to_string(), Value::Integer(1))].into_iter().collect()],
        );
        data.insert(
            "employee".to_string(),
            vec![[
                ("id".to_string(), Value::Integer(10)),
                ("dept_id".to_string(), Value::Integer(1)),
            ]
            .into_iter()
            .collect()],
        );
        let mut dependents = HashMap::new();
        dependents.insert("dept".to_string(), vec![("employee".to_string(), fk)]);
        FakeBackend {
            schemas: [("dept".to_string(), dept_schema), ("employee".to_string(), employee_schema)].into_iter().collect(),
            data: RefCell::new(data),
            dependents,
        }
    }

    #[test]
    fn restrict_blocks_delete_when_child_rows_exist() {
        let mut backend = dept_employee_backend(ForeignKeyAction::Restrict);
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        let result = execute_delete(&mut backend, &mut ccm, tx, "dept", Some(equality_condition("id", Value::Integer(1))));
        assert!(matches!(result, Err(ExecutionError::IntegrityError(_))));
    }

    #[test]
    fn cascade_deletes_dependent_rows() {
        let mut backend = dept_employee_backend(ForeignKeyAction::Cascade);
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        let affected = execute_delete(&mut backend, &mut ccm, tx, "dept", Some(equality_condition("id", Value::Integer(1)))).unwrap();
        assert_eq!(affected, 2);
        assert!(backend.data.borrow()["employee"].is_empty());
    }

    #[test]
    fn set_null_clears_the_referencing_column() {
        let mut backend = dept_employee_backend(ForeignKeyAction::SetNull);
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        execute_delete(&mut backend, &mut ccm, tx, "dept", Some(equality_condition("id", Value::Integer(1)))).unwrap();
        let employees = backend.data.borrow()["employee"].clone();
        assert_eq!(employees[0]["dept_id"], Value::Null);
    }

    #[test]
    fn table_node_qualifies_rows_under_its_alias() {
        let mut backend = dept_employee_backend(ForeignKeyAction::NoAction);
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        let node = QueryNode::leaf(NodeType::Table, "dept d");
        let rows = execute_select(&node, &mut backend, &mut ccm, tx).unwrap();
        assert!(rows.rows[0].contains_key("d.id"));
    }

    #[test]
    fn natural_join_keeps_a_single_copy_of_the_shared_column() {
        let left = Rows::new(
            vec![],
            vec![HashMap::from([("dept.id".to_string(), Value::Integer(1)), ("dept.name".to_string(), Value::Text("eng".into()))])],
        );
        let right = Rows::new(
            vec![],
            vec![HashMap::from([("employee.id".to_string(), Value::Integer(1)), ("employee.name".to_string(), Value::Text("ada".into()))])],
        );
        let joined = natural_join(left, right).unwrap();
        assert_eq!(joined.rows.len(), 1);
        let row = &joined.rows[0];
        // the join column ("id") comes from exactly one side, not both
        assert!(row.contains_key("dept.id") ^ row.contains_key("employee.id"));
        assert!(!(row.contains_key("dept.id") && row.contains_key("employee.id")));
        assert_eq!(row["dept.name"], Value::Text("eng".into()));
        assert_eq!(row["employee.name"], Value::Text("ada".into()));
    }
}
