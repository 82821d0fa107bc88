//! The storage manager: composes the file manager, buffer pool, and
//! per-column B+-tree indexes into the single [`StorageBackend`]
//! implementation the execution layer runs against.

use crate::stats::compute_statistic;
use relix_execution::{DataDeletion, DataRetrieval, DataWrite, ExecutionError, Rows, StorageBackend};
use relix_expr::{ConditionNode, Operand, Predicate};
use relix_primitives::{CompareOp, IndexKind, Rid};
use relix_sats::{decode_rows_block, encode_rows_block, Row, Value};
use relix_schema::{ForeignKey, Schema};
use relix_table::{BTreeIndex, BufferPool, FileManager, IndexKey};
use std::collections::HashMap;
use std::fs;

/// Buffer pool capacity, in whole-table pages. The buffer pool is keyed
/// by table name rather than a fixed-size physical page id; see
/// DESIGN.md for why this core pages at table granularity.
const BUFFER_POOL_CAPACITY: usize = 64;
const PAGE_SIZE: usize = relix_expr::stats::PAGE_SIZE as usize;

pub struct StorageManager {
    files: FileManager,
    pool: BufferPool<String>,
    indexes: HashMap<(String, String), (IndexKind, BTreeIndex)>,
    stats_cache: HashMap<String, relix_expr::Statistic>,
}

impl StorageManager {
    pub fn open(data_root: impl Into<std::path::PathBuf>) -> Result<Self, ExecutionError> {
        Self::open_with_capacity(data_root, BUFFER_POOL_CAPACITY, PAGE_SIZE)
    }

    /// Like [`StorageManager::open`], but with an explicit buffer pool
    /// capacity and page size, for callers (the engine facade) that wire
    /// these in from configuration instead of the crate defaults.
    pub fn open_with_capacity(
        data_root: impl Into<std::path::PathBuf>,
        buffer_pool_pages: usize,
        page_size: usize,
    ) -> Result<Self, ExecutionError> {
        let files = FileManager::open(data_root.into())?;
        let mut manager = Self {
            files,
            pool: BufferPool::new(buffer_pool_pages, page_size),
            indexes: HashMap::new(),
            stats_cache: HashMap::new(),
        };
        manager.load_persisted_indexes()?;
        Ok(manager)
    }

    fn load_persisted_indexes(&mut self) -> Result<(), ExecutionError> {
        for table in self.files.list_schema_files()? {
            let schema = self.files.load_schema(&table)?;
            for col in schema.column_names() {
                let path = self.files.index_path(&table, col);
                if path.is_file() {
                    let index = BTreeIndex::load(&path)?;
                    self.indexes.insert((table.clone(), col.to_string()), (IndexKind::BTree, index));
                }
            }
        }
        Ok(())
    }

    fn read_table_rows(&mut self, table: &str, schema: &Schema) -> Result<Vec<Row>, ExecutionError> {
        let path = self.files.table_path(table);
        let bytes = self.pool.get_page(table.to_string(), || {
            if path.exists() {
                fs::read(&path).map_err(|e| relix_table::StorageError::Io { path: path.display().to_string(), source: e })
            } else {
                Ok(Vec::new())
            }
        })?;
        self.pool.unpin_page(&table.to_string());
        Ok(decode_rows_block(schema, &bytes))
    }

    fn write_table_rows(&mut self, table: &str, schema: &Schema, rows: &[Row]) -> Result<(), ExecutionError> {
        let bytes = encode_rows_block(schema, rows).map_err(|e| relix_table::StorageError::Corrupt(e.to_string()))?;
        self.pool.put_page(table.to_string(), bytes, true)?;
        let path = self.files.table_path(table);
        self.pool
            .flush_page(&table.to_string(), |data| fs::write(&path, data).map_err(|e| relix_table::StorageError::Io { path: path.display().to_string(), source: e }))?;
        self.stats_cache.remove(table);
        self.rebuild_indexes_for_table(table, schema, rows)
    }

    fn rebuild_indexes_for_table(&mut self, table: &str, schema: &Schema, rows: &[Row]) -> Result<(), ExecutionError> {
        let indexed_columns: Vec<(String, IndexKind)> = self
            .indexes
            .iter()
            .filter(|((t, _), _)| t == table)
            .map(|((_, c), (kind, _))| (c.clone(), *kind))
            .collect();
        for (column, kind) in indexed_columns {
            let mut index = BTreeIndex::new();
            for (i, row) in rows.iter().enumerate() {
                if let Some(value) = row.get(&column) {
                    if let Some(key) = IndexKey::from_value(value) {
                        index.insert(key, Rid::new(i as u64));
                    }
                }
            }
            let path = self.files.index_path(table, &column);
            index.persist(&path)?;
            self.indexes.insert((table.to_string(), column), (kind, index));
        }
        Ok(())
    }

    /// Computes (or returns the cached) [`relix_expr::Statistic`] for a
    /// table, used to build the optimizer's stats catalog.
    pub fn table_statistic(&mut self, table: &str) -> Result<&relix_expr::Statistic, ExecutionError> {
        if !self.stats_cache.contains_key(table) {
            let schema = self.table_schema(table)?;
            let rows = self.read_table_rows(table, &schema)?;
            self.stats_cache.insert(table.to_string(), compute_statistic(&schema, &rows));
        }
        Ok(&self.stats_cache[table])
    }

    /// Builds a borrow-based stats catalog covering every currently
    /// cached table statistic. Callers should have already called
    /// [`StorageManager::table_statistic`] for every table of interest.
    pub fn stats_catalog(&self) -> HashMap<&str, &relix_expr::Statistic> {
        self.stats_cache.iter().map(|(k, v)| (k.as_str(), v)).collect()
    }

    /// Looks for an equality or range predicate on an indexed column
    /// anywhere in `condition` (a top-level `Simple` predicate, or one
    /// conjunct of a top-level `And`) and, if found, probes that
    /// column's index for candidate rids instead of scanning every row.
    /// The returned rids are a superset of the true match set — whatever
    /// predicate narrowed the candidates, and the rest of `condition`,
    /// are still checked by the caller's row-by-row filter afterward.
    fn index_candidate_rids(&self, table: &str, condition: &ConditionNode) -> Option<Vec<Rid>> {
        match condition {
            ConditionNode::Simple(predicate) => self.rids_from_predicate(table, predicate),
            ConditionNode::And(parts) => parts.iter().find_map(|part| self.index_candidate_rids(table, part)),
            ConditionNode::Or(_) | ConditionNode::Not(_) => None,
        }
    }

    fn rids_from_predicate(&self, table: &str, predicate: &Predicate) -> Option<Vec<Rid>> {
        let Predicate::Compare { lhs, op, rhs } = predicate else { return None };
        let (column, op, literal) = match (lhs, rhs) {
            (Operand::Column(c), Operand::Literal(v)) => (c, *op, v),
            (Operand::Literal(v), Operand::Column(c)) => (c, flip_compare_op(*op), v),
            _ => return None,
        };
        let (_, index) = self.indexes.get(&(table.to_string(), column.clone()))?;
        let key = IndexKey::from_value(literal)?;
        Some(match op {
            CompareOp::Eq => index.search(&key),
            CompareOp::Lt | CompareOp::LtEq => index.range(None, Some(key)),
            CompareOp::Gt | CompareOp::GtEq => index.range(Some(key), None),
            CompareOp::NotEq => return None,
        })
    }
}

/// Flips a comparison operator so `literal OP column` can be evaluated
/// as `column OP' literal`.
fn flip_compare_op(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::LtEq => CompareOp::GtEq,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::GtEq => CompareOp::LtEq,
        CompareOp::Eq => CompareOp::Eq,
        CompareOp::NotEq => CompareOp::NotEq,
    }
}

impl StorageBackend for StorageManager {
    fn table_schema(&self, table: &str) -> Result<Schema, ExecutionError> {
        Ok(self.files.load_schema(table)?)
    }

    fn table_exists(&self, table: &str) -> bool {
        self.files.schema_exists(table)
    }

    fn read_rows(&mut self, request: &DataRetrieval) -> Result<Rows, ExecutionError> {
        let schema = self.table_schema(&request.table)?;
        let all_rows = self.read_table_rows(&request.table, &schema)?;

        let candidates = match request.condition.as_ref().and_then(|c| self.index_candidate_rids(&request.table, c)) {
            Some(rids) => rids.into_iter().filter_map(|rid| all_rows.get(rid.as_u64() as usize).cloned()).collect(),
            None => all_rows,
        };

        let mut rows = Vec::with_capacity(candidates.len());
        for row in candidates {
            let keep = match &request.condition {
                Some(condition) => relix_execution::eval::eval(condition, &row)?,
                None => true,
            };
            if keep {
                rows.push(row);
            }
        }

        let offset = request.offset.unwrap_or(0);
        rows = rows.into_iter().skip(offset).collect();
        if let Some(limit) = request.limit {
            rows.truncate(limit);
        }

        if !request.columns.is_empty() {
            rows = rows
                .into_iter()
                .map(|row| row.into_iter().filter(|(k, _)| request.columns.contains(k)).collect())
                .collect();
        }

        Ok(Rows::new(vec![schema], rows))
    }

    fn write_rows(&mut self, request: &DataWrite) -> Result<u64, ExecutionError> {
        let schema = self.table_schema(&request.table)?;
        let mut rows = self.read_table_rows(&request.table, &schema)?;

        if request.is_update {
            let mut affected = 0u64;
            for row in rows.iter_mut() {
                let matches = match &request.condition {
                    None => true,
                    Some(cond) => relix_execution::eval::eval(cond, row)?,
                };
                if matches {
                    for (k, v) in &request.values {
                        row.insert(k.clone(), v.clone());
                    }
                    affected += 1;
                }
            }
            self.write_table_rows(&request.table, &schema, &rows)?;
            Ok(affected)
        } else {
            if let Some(pk) = schema.primary_key() {
                if let Some(new_pk) = request.values.get(&pk.name) {
                    if rows.iter().any(|r| r.get(&pk.name) == Some(new_pk)) {
                        return Err(ExecutionError::IntegrityError(format!(
                            "duplicate primary key value for `{}`.`{}`",
                            request.table, pk.name
                        )));
                    }
                }
            }
            let mut row: Row = Row::new();
            for col in &schema.columns {
                let value = request.values.get(&col.name).cloned().unwrap_or(Value::Null);
                row.insert(col.name.clone(), value);
            }
            rows.push(row);
            self.write_table_rows(&request.table, &schema, &rows)?;
            Ok(1)
        }
    }

    fn delete_rows(&mut self, request: &DataDeletion) -> Result<u64, ExecutionError> {
        let schema = self.table_schema(&request.table)?;
        let rows = self.read_table_rows(&request.table, &schema)?;
        let before = rows.len();
        let kept: Vec<Row> = rows
            .into_iter()
            .filter(|row| match &request.condition {
                None => false,
                Some(cond) => !relix_execution::eval::eval(cond, row).unwrap_or(false),
            })
            .collect();
        let affected = (before - kept.len()) as u64;
        self.write_table_rows(&request.table, &schema, &kept)?;
        Ok(affected)
    }

    fn set_index(&mut self, table: &str, column: &str, kind: IndexKind) -> Result<(), ExecutionError> {
        let schema = self.table_schema(table)?;
        if schema.column(column).is_none() {
            return Err(ExecutionError::ColumnNotFound(column.to_string()));
        }
        let rows = self.read_table_rows(table, &schema)?;
        self.indexes.insert((table.to_string(), column.to_string()), (kind, BTreeIndex::new()));
        self.rebuild_indexes_for_table(table, &schema, &rows)
    }

    fn drop_index(&mut self, table: &str, column: &str) -> Result<(), ExecutionError> {
        self.indexes.remove(&(table.to_string(), column.to_string()));
        let path = self.files.index_path(table, column);
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| relix_table::StorageError::Io { path: path.display().to_string(), source: e })?;
        }
        Ok(())
    }

    fn has_index(&self, table: &str, column: &str) -> bool {
        self.indexes.contains_key(&(table.to_string(), column.to_string()))
    }

    fn create_table(&mut self, schema: Schema) -> Result<(), ExecutionError> {
        if self.files.schema_exists(&schema.table_name) {
            return Err(relix_table::StorageError::TableExists(schema.table_name.clone()).into());
        }
        self.files.validate_schema(&schema)?;
        self.files.save_schema(&schema)?;
        self.files.create_table_file(&schema.table_name)?;
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<(), ExecutionError> {
        if !self.files.schema_exists(table) {
            return Err(ExecutionError::TableNotFound(table.to_string()));
        }
        let columns: Vec<String> = self
            .indexes
            .keys()
            .filter(|(t, _)| t == table)
            .map(|(_, c)| c.clone())
            .collect();
        for column in columns {
            self.drop_index(table, &column)?;
        }
        self.files.delete_table_file(table)?;
        self.files.delete_schema(table)?;
        self.stats_cache.remove(table);
        Ok(())
    }

    fn list_tables(&self) -> Vec<String> {
        self.files.list_schema_files().unwrap_or_default()
    }

    fn dependents(&self, table: &str) -> Vec<(String, ForeignKey)> {
        let mut out = Vec::new();
        for other in self.files.list_schema_files().unwrap_or_default() {
            if other == table {
                continue;
            }
            let Ok(schema) = self.files.load_schema(&other) else { continue };
            for (_, fk) in schema.foreign_keys() {
                if fk.ref_table == table {
                    out.push((other.clone(), fk.clone()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relix_execution::ccm::AllowAllCcm;
    use relix_execution::{execute_delete, execute_insert, execute_select};
    use relix_expr::{NodeType, QueryNode};
    use relix_primitives::ColumnType;
    use relix_schema::Column;

    fn manager() -> (tempfile::TempDir, StorageManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::open(dir.path()).unwrap();
        (dir, manager)
    }

    #[test]
    fn create_table_then_insert_and_select_round_trips() {
        let (_dir, mut manager) = manager();
        manager
            .create_table(Schema::new(
                "t",
                vec![Column::new("id", ColumnType::Integer).primary_key(), Column::new("name", ColumnType::Varchar(10))],
            ))
            .unwrap();

        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        let mut values = HashMap::new();
        values.insert("id".to_string(), Value::Integer(1));
        values.insert("name".to_string(), Value::Text("alice".into()));
        execute_insert(&mut manager, &mut ccm, tx, "t", values).unwrap();

        let node = QueryNode::leaf(NodeType::Table, "t t");
        let rows = execute_select(&node, &mut manager, &mut ccm, tx).unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0]["t.name"], Value::Text("alice".into()));
    }

    #[test]
    fn duplicate_primary_key_is_rejected() {
        let (_dir, mut manager) = manager();
        manager
            .create_table(Schema::new("t", vec![Column::new("id", ColumnType::Integer).primary_key()]))
            .unwrap();
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        let mut values = HashMap::new();
        values.insert("id".to_string(), Value::Integer(1));
        execute_insert(&mut manager, &mut ccm, tx, "t", values.clone()).unwrap();
        let err = execute_insert(&mut manager, &mut ccm, tx, "t", values).unwrap_err();
        assert!(matches!(err, ExecutionError::IntegrityError(_)));
    }

    #[test]
    fn set_index_persists_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut manager = StorageManager::open(dir.path()).unwrap();
            manager
                .create_table(Schema::new("t", vec![Column::new("id", ColumnType::Integer).primary_key()]))
                .unwrap();
            manager.set_index("t", "id", IndexKind::BTree).unwrap();
            let mut ccm = AllowAllCcm::default();
            let tx = ccm.begin_transaction();
            let mut values = HashMap::new();
            values.insert("id".to_string(), Value::Integer(7));
            execute_insert(&mut manager, &mut ccm, tx, "t", values).unwrap();
        }
        let manager = StorageManager::open(dir.path()).unwrap();
        assert!(manager.has_index("t", "id"));
    }

    #[test]
    fn delete_removes_matching_rows() {
        let (_dir, mut manager) = manager();
        manager
            .create_table(Schema::new("t", vec![Column::new("id", ColumnType::Integer).primary_key()]))
            .unwrap();
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        for id in [1, 2, 3] {
            let mut values = HashMap::new();
            values.insert("id".to_string(), Value::Integer(id));
            execute_insert(&mut manager, &mut ccm, tx, "t", values).unwrap();
        }
        let condition = relix_expr::parse_condition("id = 2").unwrap();
        let affected = execute_delete(&mut manager, &mut ccm, tx, "t", Some(condition)).unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn an_equality_read_on_an_indexed_column_uses_the_index() {
        let (_dir, mut manager) = manager();
        manager
            .create_table(Schema::new("t", vec![Column::new("id", ColumnType::Integer).primary_key()]))
            .unwrap();
        manager.set_index("t", "id", IndexKind::BTree).unwrap();
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        for id in [1, 2, 3] {
            let mut values = HashMap::new();
            values.insert("id".to_string(), Value::Integer(id));
            execute_insert(&mut manager, &mut ccm, tx, "t", values).unwrap();
        }

        let condition = relix_expr::parse_condition("id = 2").unwrap();
        assert_eq!(manager.index_candidate_rids("t", &condition), Some(vec![Rid::new(1)]));

        let request = DataRetrieval {
            condition: Some(condition),
            ..DataRetrieval::new("t")
        };
        let rows = manager.read_rows(&request).unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0]["id"], Value::Integer(2));
    }

    #[test]
    fn a_range_read_on_an_indexed_column_probes_the_index() {
        let (_dir, mut manager) = manager();
        manager
            .create_table(Schema::new("t", vec![Column::new("id", ColumnType::Integer).primary_key()]))
            .unwrap();
        manager.set_index("t", "id", IndexKind::BTree).unwrap();
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        for id in [1, 2, 3, 4] {
            let mut values = HashMap::new();
            values.insert("id".to_string(), Value::Integer(id));
            execute_insert(&mut manager, &mut ccm, tx, "t", values).unwrap();
        }

        let condition = relix_expr::parse_condition("id > 2").unwrap();
        let request = DataRetrieval {
            condition: Some(condition),
            ..DataRetrieval::new("t")
        };
        let mut rows = manager.read_rows(&request).unwrap();
        rows.rows.sort_by_key(|r| match r["id"] {
            Value::Integer(i) => i,
            _ => unreachable!(),
        });
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[0]["id"], Value::Integer(3));
        assert_eq!(rows.rows[1]["id"], Value::Integer(4));
    }

    #[test]
    fn a_read_with_no_usable_index_falls_back_to_a_full_scan() {
        let (_dir, mut manager) = manager();
        manager
            .create_table(Schema::new(
                "t",
                vec![Column::new("id", ColumnType::Integer).primary_key(), Column::new("name", ColumnType::Varchar(10))],
            ))
            .unwrap();
        let mut ccm = AllowAllCcm::default();
        let tx = ccm.begin_transaction();
        let mut values = HashMap::new();
        values.insert("id".to_string(), Value::Integer(1));
        values.insert("name".to_string(), Value::Text("alice".into()));
        execute_insert(&mut manager, &mut ccm, tx, "t", values).unwrap();

        let condition = relix_expr::parse_condition("name = 'alice'").unwrap();
        assert_eq!(manager.index_candidate_rids("t", &condition), None);
        let request = DataRetrieval {
            condition: Some(condition),
            ..DataRetrieval::new("t")
        };
        let rows = manager.read_rows(&request).unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0]["id"], Value::Integer(1));
    }
}
