use serde::{Deserialize, Serialize};

/// One WAL entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LogRecord {
    Start {
        tx_id: u64,
        ts: u64,
    },
    Commit {
        tx_id: u64,
        ts: u64,
    },
    Abort {
        tx_id: u64,
        ts: u64,
    },
    /// A data or DDL mutation. `item_name` is a table name for DML, or a
    /// DDL node-type tag (`"CREATE_TABLE"` / `"DROP_TABLE"`) for DDL;
    /// `old_value`/`new_value` carry the row (DML) or the full schema
    /// (DDL, as JSON) needed to reverse the change during recovery.
    Change {
        tx_id: u64,
        ts: u64,
        item_name: String,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    },
    Checkpoint {
        tx_id: u64,
        ts: u64,
        active_transactions: Vec<u64>,
    },
}

impl LogRecord {
    pub fn tx_id(&self) -> u64 {
        match self {
            LogRecord::Start { tx_id, .. }
            | LogRecord::Commit { tx_id, .. }
            | LogRecord::Abort { tx_id, .. }
            | LogRecord::Change { tx_id, .. }
            | LogRecord::Checkpoint { tx_id, .. } => *tx_id,
        }
    }

    pub fn ts(&self) -> u64 {
        match self {
            LogRecord::Start { ts, .. }
            | LogRecord::Commit { ts, .. }
            | LogRecord::Abort { ts, .. }
            | LogRecord::Change { ts, .. }
            | LogRecord::Checkpoint { ts, .. } => *ts,
        }
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, LogRecord::Commit { .. })
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, LogRecord::Abort { .. })
    }

    pub fn as_change(&self) -> Option<(u64, &str, &Option<serde_json::Value>, &Option<serde_json::Value>)> {
        match self {
            LogRecord::Change {
                tx_id,
                item_name,
                old_value,
                new_value,
                ..
            } => Some((*tx_id, item_name.as_str(), old_value, new_value)),
            _ => None,
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
