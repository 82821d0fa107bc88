//! The processor/dispatcher: normalizes an already-parsed query tree to
//! a top-level node type and routes it to the TCL, DML, or DDL handler,
//! or (for a plain read-shaped tree) through the optimizer and into the
//! execution layer. Owns the storage manager, the WAL, and the single
//! active transaction this instance may hold at a time.

use crate::config::Config;
use crate::ddl;
use crate::dml::{self, json_object, require_str};
use crate::error::Error;
use crate::meta::TableDescription;
use relix_datastore::StorageManager;
use relix_durability::{recover, ActionKind, Criterion, LogRecord, Wal};
use relix_execution::{AllowAllCcm, Ccm, DataRetrieval, DataWrite, Rows, StorageBackend};
use relix_expr::{NodeType, QueryNode};
use relix_schema::Schema;

/// What running a statement through [`Processor::execute`] produced.
#[derive(Debug)]
pub enum Outcome {
    /// A TCL statement completed (BEGIN returns the new transaction id).
    Transaction(Option<u64>),
    /// A DDL statement completed.
    Ack,
    /// DML row count affected.
    RowsAffected(u64),
    /// A read-shaped query tree's result set.
    Rows(Rows),
}

pub struct Processor {
    storage: StorageManager,
    ccm: Box<dyn Ccm>,
    wal: Wal,
    config: Config,
    active_tx: Option<u64>,
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn extract_table(value: &str) -> Result<String, Error> {
    let obj = json_object(value)?;
    require_str(&obj, "table")
}

fn collect_table_names(tree: &QueryNode) -> Vec<String> {
    let mut names = Vec::new();
    tree.visit(&mut |n| {
        if n.node_type == NodeType::Table {
            let name = n.value.split_whitespace().next().unwrap_or(&n.value).to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    });
    names
}

/// Builds the closure `relix_physical_plan::optimize` uses to route a
/// predicate to the join side owning every column it references. Each
/// distinct qualifier (the part of `qualifier.column` before the dot)
/// seen across a single optimization call is assigned a stable id the
/// first time it's observed.
fn make_schema_owner() -> impl Fn(&str) -> Option<usize> {
    let seen = std::cell::RefCell::new(std::collections::HashMap::new());
    move |col: &str| {
        let qualifier = col.split('.').next().unwrap_or(col).to_string();
        let mut map = seen.borrow_mut();
        let next_id = map.len();
        Some(*map.entry(qualifier).or_insert(next_id))
    }
}

impl Processor {
    pub fn open(config: Config) -> Result<Self, Error> {
        Self::with_ccm(config, Box::new(AllowAllCcm::default()))
    }

    pub fn with_ccm(config: Config, ccm: Box<dyn Ccm>) -> Result<Self, Error> {
        let storage = StorageManager::open_with_capacity(&config.data_root, config.buffer_pool_pages, config.page_size)?;
        let wal = Wal::open(&config.data_root, config.wal_buffer_max)?;
        Ok(Self {
            storage,
            ccm,
            wal,
            config,
            active_tx: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// `\dt`: every table currently known to the storage manager.
    pub fn list_tables(&self) -> Vec<String> {
        self.storage.list_tables()
    }

    /// `\d <table>`: the table's columns, nullability, primary key, and
    /// foreign key reference/actions.
    pub fn describe_table(&self, table: &str) -> Result<TableDescription, Error> {
        let schema = self.storage.table_schema(table)?;
        Ok(TableDescription::from(&schema))
    }

    /// Dispatches `tree` by its top-level node type.
    pub fn execute(&mut self, tree: &QueryNode) -> Result<Outcome, Error> {
        match tree.node_type {
            NodeType::BeginTransaction => self.begin(),
            NodeType::Commit => self.commit(),
            NodeType::Abort => self.abort_transaction(),
            NodeType::Insert | NodeType::Update | NodeType::Delete => self.execute_dml(tree),
            NodeType::CreateTable => self.execute_create_table(tree),
            NodeType::DropTable => self.execute_drop_table(tree),
            NodeType::CreateIndex => self.execute_create_index(tree),
            NodeType::DropIndex => self.execute_drop_index(tree),
            _ => self.execute_query(tree).map(Outcome::Rows),
        }
    }

    // ---- TCL ----

    fn begin(&mut self) -> Result<Outcome, Error> {
        if let Some(tx) = self.active_tx {
            return Err(Error::TransactionAlreadyActive(tx));
        }
        let tx = self.ccm.begin_transaction();
        self.wal.write_log(LogRecord::Start { tx_id: tx, ts: now_millis() })?;
        self.active_tx = Some(tx);
        tracing::info!(tx_id = tx, "transaction begun");
        Ok(Outcome::Transaction(Some(tx)))
    }

    fn commit(&mut self) -> Result<Outcome, Error> {
        let tx = self.active_tx.take().ok_or_else(|| Error::NoActiveTransaction("COMMIT".to_string()))?;
        self.wal.write_log(LogRecord::Commit { tx_id: tx, ts: now_millis() })?;
        self.ccm.end_transaction(tx);
        tracing::info!(tx_id = tx, "transaction committed");
        Ok(Outcome::Transaction(None))
    }

    fn abort_transaction(&mut self) -> Result<Outcome, Error> {
        let tx = self.active_tx.take().ok_or_else(|| Error::NoActiveTransaction("ABORT".to_string()))?;
        self.wal.write_log(LogRecord::Abort { tx_id: tx, ts: now_millis() })?;
        self.ccm.end_transaction(tx);
        tracing::info!(tx_id = tx, "transaction aborted");
        Ok(Outcome::Transaction(None))
    }

    // ---- DML ----

    /// If no transaction is active, starts one implicitly, writes START,
    /// runs the statement, writes COMMIT, and ends it. On `AbortError`
    /// raised by the CCM, writes ABORT, recovers the transaction's
    /// changes, and retries (implicit transactions only, up to
    /// `config.dml_retry_limit` attempts). Any other error writes ABORT
    /// and re-raises. A statement run under an explicitly-BEGUN
    /// transaction does not auto-commit or auto-retry: the caller owns
    /// that transaction's boundary via COMMIT/ABORT.
    fn execute_dml(&mut self, tree: &QueryNode) -> Result<Outcome, Error> {
        let implicit = self.active_tx.is_none();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let tx = match self.active_tx {
                Some(tx) => tx,
                None => {
                    let tx = self.ccm.begin_transaction();
                    self.wal.write_log(LogRecord::Start { tx_id: tx, ts: now_millis() })?;
                    if implicit {
                        self.active_tx = Some(tx);
                    }
                    tx
                }
            };

            match self.run_dml_once(tree, tx) {
                Ok(affected) => {
                    if implicit {
                        self.wal.write_log(LogRecord::Commit { tx_id: tx, ts: now_millis() })?;
                        self.ccm.end_transaction(tx);
                        self.active_tx = None;
                    }
                    tracing::info!(tx_id = tx, affected, "dml statement committed");
                    return Ok(Outcome::RowsAffected(affected));
                }
                Err(Error::Execution(relix_execution::ExecutionError::AbortError { tx_id, .. }))
                    if implicit && attempt < self.config.dml_retry_limit =>
                {
                    tracing::warn!(tx_id, attempt, "dml statement aborted by concurrency control; recovering and retrying");
                    self.wal.write_log(LogRecord::Abort { tx_id, ts: now_millis() })?;
                    let actions = recover(&self.wal, Criterion::ByTransaction(tx_id))?;
                    self.apply_recovery_actions(&actions)?;
                    self.ccm.end_transaction(tx_id);
                    self.active_tx = None;
                    continue;
                }
                Err(other) => {
                    tracing::error!(error = %other, tx_id = tx, "dml statement failed");
                    let _ = self.wal.write_log(LogRecord::Abort { tx_id, ts: now_millis() });
                    if implicit {
                        self.ccm.end_transaction(tx);
                        self.active_tx = None;
                    }
                    return Err(other);
                }
            }
        }
    }

    fn run_dml_once(&mut self, tree: &QueryNode, tx: u64) -> Result<u64, Error> {
        match tree.node_type {
            NodeType::Insert => self.run_insert(tree, tx),
            NodeType::Update => self.run_update(tree, tx),
            NodeType::Delete => self.run_delete(tree, tx),
            other => Err(Error::NotImplemented(format!("{other:?} is not a DML node"))),
        }
    }

    fn run_insert(&mut self, tree: &QueryNode, tx: u64) -> Result<u64, Error> {
        let table = extract_table(&tree.value)?;
        let schema = self.storage.table_schema(&table)?;
        let stmt = dml::parse_insert(&tree.value, &schema)?;
        let affected = relix_execution::execute_insert(&mut self.storage, self.ccm.as_mut(), tx, &stmt.table, stmt.values.clone())?;
        let new_row: relix_sats::Row = schema
            .columns
            .iter()
            .map(|c| (c.name.clone(), stmt.values.get(&c.name).cloned().unwrap_or(relix_sats::Value::Null)))
            .collect();
        self.wal.write_log(LogRecord::Change {
            tx_id: tx,
            ts: now_millis(),
            item_name: stmt.table,
            old_value: None,
            new_value: Some(dml::row_to_json(&new_row)),
        })?;
        Ok(affected)
    }

    fn run_update(&mut self, tree: &QueryNode, tx: u64) -> Result<u64, Error> {
        let table = extract_table(&tree.value)?;
        let schema = self.storage.table_schema(&table)?;
        let stmt = dml::parse_update(&tree.value, &schema)?;
        let before = self.storage.read_rows(&DataRetrieval {
            condition: stmt.condition.clone(),
            ..DataRetrieval::new(stmt.table.as_str())
        })?;
        let affected =
            relix_execution::execute_update(&mut self.storage, self.ccm.as_mut(), tx, &stmt.table, stmt.set.clone(), stmt.condition.clone())?;
        for old_row in &before.rows {
            let mut new_row = old_row.clone();
            for (k, v) in &stmt.set {
                new_row.insert(k.clone(), v.clone());
            }
            self.wal.write_log(LogRecord::Change {
                tx_id: tx,
                ts: now_millis(),
                item_name: stmt.table.clone(),
                old_value: Some(dml::row_to_json(old_row)),
                new_value: Some(dml::row_to_json(&new_row)),
            })?;
        }
        Ok(affected)
    }

    fn run_delete(&mut self, tree: &QueryNode, tx: u64) -> Result<u64, Error> {
        let stmt = dml::parse_delete(&tree.value)?;
        let before = self.storage.read_rows(&DataRetrieval {
            condition: stmt.condition.clone(),
            ..DataRetrieval::new(stmt.table.as_str())
        })?;
        let affected = relix_execution::execute_delete(&mut self.storage, self.ccm.as_mut(), tx, &stmt.table, stmt.condition.clone())?;
        for old_row in &before.rows {
            self.wal.write_log(LogRecord::Change {
                tx_id: tx,
                ts: now_millis(),
                item_name: stmt.table.clone(),
                old_value: Some(dml::row_to_json(old_row)),
                new_value: None,
            })?;
        }
        // Cascaded deletes/SET NULLs against dependent tables are not
        // individually logged here (`execute_delete` doesn't surface
        // them); a checkpoint replay or recovery only ever restores the
        // rows this statement directly targeted. See DESIGN.md.
        Ok(affected)
    }

    /// Applies the undo actions `recover` produced. A row restore is
    /// resolved against the table's current primary key: if a row with
    /// that key still exists it is overwritten back to `old_value`,
    /// otherwise it is re-inserted. `Restore(None)` (undoing an INSERT)
    /// can't identify which row to delete from the action alone — the
    /// recovery manager's contract only carries the restored value, not
    /// the compensating delete key — so it is logged and skipped; see
    /// DESIGN.md.
    fn apply_recovery_actions(&mut self, actions: &[relix_durability::RecoveryAction]) -> Result<(), Error> {
        for action in actions {
            match &action.kind {
                ActionKind::Restore(Some(json)) => {
                    let schema = self.storage.table_schema(&action.item_name)?;
                    let row = dml::json_to_row(json, &schema)?;
                    let Some(pk) = schema.primary_key() else {
                        tracing::warn!(table = %action.item_name, "cannot recover a row in a table with no primary key");
                        continue;
                    };
                    let Some(pk_value) = row.get(&pk.name).cloned() else { continue };
                    let condition = pk_equality(&pk.name, pk_value);
                    let existing = self.storage.read_rows(&DataRetrieval {
                        condition: Some(condition.clone()),
                        limit: Some(1),
                        ..DataRetrieval::new(action.item_name.as_str())
                    })?;
                    if existing.rows_count() > 0 {
                        self.storage.write_rows(&DataWrite {
                            table: action.item_name.clone(),
                            values: row,
                            is_update: true,
                            condition: Some(condition),
                        })?;
                    } else {
                        self.storage.write_rows(&DataWrite {
                            table: action.item_name.clone(),
                            values: row,
                            is_update: false,
                            condition: None,
                        })?;
                    }
                }
                ActionKind::Restore(None) => {
                    tracing::warn!(table = %action.item_name, tx_id = action.tx_id, "skipping recovery of an insert: no identifying key available");
                }
                ActionKind::ReverseDdl(statement) => self.apply_reverse_ddl(statement)?,
                ActionKind::Skip => {}
            }
        }
        Ok(())
    }

    fn apply_reverse_ddl(&mut self, statement: &str) -> Result<(), Error> {
        if let Some(table) = statement.strip_prefix("DROP TABLE ") {
            if self.storage.table_exists(table.trim()) {
                ddl::drop_table(&mut self.storage, table.trim(), false)?;
            }
            return Ok(());
        }
        if let Some(rest) = statement.strip_prefix("CREATE TABLE <schema:") {
            let json_text = rest.strip_suffix('>').unwrap_or(rest);
            let schema: Schema = serde_json::from_str(json_text).map_err(|e| Error::MalformedStatement(format!("reverse DDL schema: {e}")))?;
            if !self.storage.table_exists(&schema.table_name) {
                self.storage.create_table(schema)?;
            }
            return Ok(());
        }
        Err(Error::NotImplemented(format!("unrecognized reverse DDL action `{statement}`")))
    }

    // ---- DDL ----

    fn execute_create_table(&mut self, tree: &QueryNode) -> Result<Outcome, Error> {
        let schema = ddl::parse_create_table(&tree.value)?;
        self.storage.create_table(schema.clone())?;
        self.log_ddl_change("CREATE_TABLE", None, Some(serde_json::json!({ "table_name": schema.table_name })))?;
        Ok(Outcome::Ack)
    }

    fn execute_drop_table(&mut self, tree: &QueryNode) -> Result<Outcome, Error> {
        let stmt = ddl::parse_drop_table(&tree.value)?;
        let schema = self.storage.table_schema(&stmt.table)?;
        ddl::drop_table(&mut self.storage, &stmt.table, stmt.cascade)?;
        let schema_json = serde_json::to_value(&schema).map_err(|e| Error::MalformedStatement(e.to_string()))?;
        self.log_ddl_change("DROP_TABLE", Some(schema_json), None)?;
        Ok(Outcome::Ack)
    }

    fn execute_create_index(&mut self, tree: &QueryNode) -> Result<Outcome, Error> {
        let stmt = ddl::parse_create_index(&tree.value)?;
        ddl::create_index(&mut self.storage, &stmt)?;
        Ok(Outcome::Ack)
    }

    fn execute_drop_index(&mut self, tree: &QueryNode) -> Result<Outcome, Error> {
        let stmt = ddl::parse_drop_index(&tree.value)?;
        ddl::drop_index(&mut self.storage, &stmt)?;
        Ok(Outcome::Ack)
    }

    /// DDL is logged under its own single-statement transaction: there's
    /// no multi-row undo to batch, so it always commits immediately
    /// (DDL failures leave no on-disk state, per the propagation policy).
    fn log_ddl_change(&mut self, tag: &str, old_value: Option<serde_json::Value>, new_value: Option<serde_json::Value>) -> Result<(), Error> {
        let tx = self.ccm.begin_transaction();
        self.wal.write_log(LogRecord::Start { tx_id: tx, ts: now_millis() })?;
        self.wal.write_log(LogRecord::Change {
            tx_id: tx,
            ts: now_millis(),
            item_name: tag.to_string(),
            old_value,
            new_value,
        })?;
        self.wal.write_log(LogRecord::Commit { tx_id: tx, ts: now_millis() })?;
        self.ccm.end_transaction(tx);
        Ok(())
    }

    // ---- SELECT ----

    fn execute_query(&mut self, tree: &QueryNode) -> Result<Rows, Error> {
        for table in collect_table_names(tree) {
            self.storage.table_statistic(&table)?;
        }
        let catalog = self.storage.stats_catalog();
        let owner = make_schema_owner();
        let optimized = relix_physical_plan::optimize(tree, &catalog, &owner)?;
        let tx = self.active_tx.unwrap_or(0);
        Ok(relix_execution::execute_select(&optimized, &mut self.storage, self.ccm.as_mut(), tx)?)
    }
}

fn pk_equality(column: &str, value: relix_sats::Value) -> relix_expr::ConditionNode {
    relix_expr::ConditionNode::Simple(relix_expr::Predicate::Compare {
        lhs: relix_expr::Operand::Column(column.to_string()),
        op: relix_primitives::CompareOp::Eq,
        rhs: relix_expr::Operand::Literal(value),
    })
}
