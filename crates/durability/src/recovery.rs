//! Criteria-based undo recovery.

use crate::error::DurabilityError;
use crate::record::LogRecord;
use crate::wal::Wal;
use std::collections::HashSet;

/// Selects which WAL entries a [`recover`] call should consider.
#[derive(Clone, Debug)]
pub enum Criterion {
    ByTransaction(u64),
    ByTimestamp(u64),
}

impl Criterion {
    fn matches(&self, record: &LogRecord) -> bool {
        match self {
            Criterion::ByTransaction(tx) => record.tx_id() == *tx,
            Criterion::ByTimestamp(cutoff) => record.ts() >= *cutoff,
        }
    }
}

/// The human-readable inverse of one CHANGE record.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionKind {
    /// Restore `item_name`'s row to `old_value` (`None` for a record whose
    /// old value was itself absent, e.g. an INSERT: the inverse is a
    /// delete).
    Restore(Option<serde_json::Value>),
    /// Run the inverse DDL statement described here (`CREATE_TABLE` undoes
    /// to `DROP TABLE`, `DROP_TABLE` undoes to `CREATE TABLE <schema>`).
    ReverseDdl(String),
    /// The owning transaction had already committed before the recovery
    /// criterion's range; this record must not be undone.
    Skip,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecoveryAction {
    pub tx_id: u64,
    pub item_name: String,
    pub kind: ActionKind,
}

/// Replays the log against `criteria`, producing the list of undo actions
/// a caller (the DML handler) should apply.
pub fn recover(wal: &Wal, criteria: Criterion) -> Result<Vec<RecoveryAction>, DurabilityError> {
    let records = wal.read_all()?;
    let start = if wal.active_transactions_at_checkpoint().is_empty() {
        wal.last_checkpoint_line().min(records.len())
    } else {
        0
    };

    match criteria {
        Criterion::ByTransaction(tx) => Ok(recover_by_transaction(&records[start..], tx)),
        Criterion::ByTimestamp(cutoff) => Ok(recover_by_timestamp(&records[start..], cutoff)),
    }
}

fn reverse_ddl_action(item_name: &str, old_value: &Option<serde_json::Value>, new_value: &Option<serde_json::Value>) -> Option<ActionKind> {
    match item_name {
        "CREATE_TABLE" => {
            let table = new_value.as_ref()?.get("table_name")?.as_str()?.to_string();
            Some(ActionKind::ReverseDdl(format!("DROP TABLE {table}")))
        }
        "DROP_TABLE" => {
            let schema = old_value.clone()?;
            Some(ActionKind::ReverseDdl(format!("CREATE TABLE <schema:{schema}>")))
        }
        _ => None,
    }
}

fn recover_by_transaction(records: &[LogRecord], tx: u64) -> Vec<RecoveryAction> {
    let mut committed_before = HashSet::new();
    let mut actions = Vec::new();
    for record in records {
        if record.is_commit() {
            committed_before.insert(record.tx_id());
            continue;
        }
        let Some((rtx, item_name, old_value, new_value)) = record.as_change() else {
            continue;
        };
        if rtx != tx {
            continue;
        }
        if committed_before.contains(&rtx) {
            actions.push(RecoveryAction {
                tx_id: rtx,
                item_name: item_name.to_string(),
                kind: ActionKind::Skip,
            });
            continue;
        }
        let kind = reverse_ddl_action(item_name, old_value, new_value)
            .unwrap_or_else(|| ActionKind::Restore(old_value.clone()));
        actions.push(RecoveryAction {
            tx_id: rtx,
            item_name: item_name.to_string(),
            kind,
        });
    }
    actions
}

fn recover_by_timestamp(records: &[LogRecord], cutoff: u64) -> Vec<RecoveryAction> {
    let committed_before_cutoff: HashSet<u64> = records
        .iter()
        .filter(|r| r.is_commit() && r.ts() < cutoff)
        .map(|r| r.tx_id())
        .collect();

    let mut actions = Vec::new();
    for record in records.iter().rev() {
        if record.ts() < cutoff {
            break;
        }
        let Some((tx_id, item_name, old_value, new_value)) = record.as_change() else {
            continue;
        };
        let kind = if committed_before_cutoff.contains(&tx_id) {
            ActionKind::Skip
        } else {
            reverse_ddl_action(item_name, old_value, new_value)
                .unwrap_or_else(|| ActionKind::Restore(old_value.clone()))
        };
        actions.push(RecoveryAction {
            tx_id,
            item_name: item_name.to_string(),
            kind,
        });
    }
    actions.reverse();
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogRecord;

    fn wal(dir: &tempfile::TempDir) -> Wal {
        Wal::open(dir.path(), 100).unwrap()
    }

    #[test]
    fn recover_by_transaction_returns_only_that_transactions_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = wal(&dir);
        w.write_log(LogRecord::Start { tx_id: 1, ts: 1 }).unwrap();
        w.write_log(LogRecord::Change {
            tx_id: 1,
            ts: 2,
            item_name: "t".into(),
            old_value: Some(serde_json::json!({"name": "a"})),
            new_value: Some(serde_json::json!({"name": "x"})),
        })
        .unwrap();
        w.write_log(LogRecord::Start { tx_id: 2, ts: 3 }).unwrap();
        w.write_log(LogRecord::Change {
            tx_id: 2,
            ts: 4,
            item_name: "t".into(),
            old_value: Some(serde_json::json!({"name": "b"})),
            new_value: Some(serde_json::json!({"name": "y"})),
        })
        .unwrap();
        w.write_log(LogRecord::Abort { tx_id: 1, ts: 5 }).unwrap();
        w.flush().unwrap();

        let actions = recover(&w, Criterion::ByTransaction(1)).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].tx_id, 1);
        assert_eq!(
            actions[0].kind,
            ActionKind::Restore(Some(serde_json::json!({"name": "a"})))
        );
    }

    #[test]
    fn already_committed_transaction_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = wal(&dir);
        w.write_log(LogRecord::Start { tx_id: 1, ts: 1 }).unwrap();
        w.write_log(LogRecord::Change {
            tx_id: 1,
            ts: 2,
            item_name: "t".into(),
            old_value: Some(serde_json::json!({"name": "a"})),
            new_value: Some(serde_json::json!({"name": "x"})),
        })
        .unwrap();
        w.write_log(LogRecord::Commit { tx_id: 1, ts: 3 }).unwrap();
        w.flush().unwrap();

        let actions = recover(&w, Criterion::ByTransaction(1)).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Skip);
    }

    #[test]
    fn reverse_ddl_for_create_and_drop_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = wal(&dir);
        w.write_log(LogRecord::Start { tx_id: 1, ts: 1 }).unwrap();
        w.write_log(LogRecord::Change {
            tx_id: 1,
            ts: 2,
            item_name: "CREATE_TABLE".into(),
            old_value: None,
            new_value: Some(serde_json::json!({"table_name": "t"})),
        })
        .unwrap();
        w.write_log(LogRecord::Abort { tx_id: 1, ts: 3 }).unwrap();
        w.flush().unwrap();

        let actions = recover(&w, Criterion::ByTransaction(1)).unwrap();
        assert_eq!(actions[0].kind, ActionKind::ReverseDdl("DROP TABLE t".into()));
    }
}
