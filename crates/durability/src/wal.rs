//! Append-only JSON-lines write-ahead log.

use crate::error::DurabilityError;
use crate::record::{now_millis, LogRecord};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
struct Meta {
    last_checkpoint_line: usize,
    active_transactions_at_checkpoint: Vec<u64>,
    created_at: u64,
}

/// Append-only log in JSON-lines, plus a sidecar metadata file.
pub struct Wal {
    log_path: PathBuf,
    meta_path: PathBuf,
    buffer: Vec<LogRecord>,
    buffer_max: usize,
    meta: Meta,
}

impl Wal {
    /// Opens (creating if necessary) the log and meta files at
    /// `<data_root>/wal.jsonl` and `<data_root>/wal.jsonl.meta.json`.
    pub fn open(data_root: impl AsRef<Path>, buffer_max: usize) -> Result<Self, DurabilityError> {
        let log_path = data_root.as_ref().join("wal.jsonl");
        let meta_path = data_root.as_ref().join("wal.jsonl.meta.json");
        if !log_path.exists() {
            File::create(&log_path).map_err(|e| DurabilityError::io(log_path.display().to_string(), e))?;
        }
        let meta = if meta_path.exists() {
            let bytes = std::fs::read(&meta_path).map_err(|e| DurabilityError::io(meta_path.display().to_string(), e))?;
            serde_json::from_slice(&bytes)?
        } else {
            Meta {
                created_at: now_millis(),
                ..Default::default()
            }
        };
        Ok(Self {
            log_path,
            meta_path,
            buffer: Vec::new(),
            buffer_max: buffer_max.max(1),
            meta,
        })
    }

    pub fn last_checkpoint_line(&self) -> usize {
        self.meta.last_checkpoint_line
    }

    pub fn active_transactions_at_checkpoint(&self) -> &[u64] {
        &self.meta.active_transactions_at_checkpoint
    }

    /// Appends `record` to the in-memory buffer, flushing immediately if
    /// the buffer is full or the record is a COMMIT/ABORT.
    pub fn write_log(&mut self, record: LogRecord) -> Result<(), DurabilityError> {
        let force = record.is_commit() || record.is_abort();
        self.buffer.push(record);
        if force || self.buffer.len() >= self.buffer_max {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes buffered records to disk.
    pub fn flush(&mut self) -> Result<(), DurabilityError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .map_err(|e| DurabilityError::io(self.log_path.display().to_string(), e))?;
        for record in self.buffer.drain(..) {
            let line = serde_json::to_string(&record)?;
            writeln!(file, "{line}").map_err(|e| DurabilityError::io(self.log_path.display().to_string(), e))?;
        }
        file.flush().map_err(|e| DurabilityError::io(self.log_path.display().to_string(), e))?;
        Ok(())
    }

    /// Reads every record currently on disk, in order.
    pub fn read_all(&self) -> Result<Vec<LogRecord>, DurabilityError> {
        let file = File::open(&self.log_path).map_err(|e| DurabilityError::io(self.log_path.display().to_string(), e))?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| DurabilityError::io(self.log_path.display().to_string(), e))?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    fn line_count(&self) -> Result<usize, DurabilityError> {
        Ok(self.read_all()?.len())
    }

    fn write_meta(&self) -> Result<(), DurabilityError> {
        let bytes = serde_json::to_vec_pretty(&self.meta)?;
        std::fs::write(&self.meta_path, bytes).map_err(|e| DurabilityError::io(self.meta_path.display().to_string(), e))
    }

    /// Flushes the buffer, replays committed CHANGE records since the
    /// previous checkpoint via `apply`, records currently-active
    /// transactions, appends a CHECKPOINT record, and advances
    /// `last_checkpoint_line`.
    pub fn save_checkpoint(
        &mut self,
        mut apply: impl FnMut(&LogRecord),
    ) -> Result<usize, DurabilityError> {
        self.flush()?;
        let records = self.read_all()?;
        let start = self.meta.last_checkpoint_line;

        // Which transactions, within the scanned region, have a COMMIT?
        let mut committed = std::collections::HashSet::new();
        for record in &records[start.min(records.len())..] {
            if record.is_commit() {
                committed.insert(record.tx_id());
            }
        }
        for record in &records[start.min(records.len())..] {
            if let LogRecord::Change { tx_id, .. } = record {
                if committed.contains(tx_id) {
                    apply(record);
                }
            }
        }

        // Transactions active right now: a START with no subsequent COMMIT/ABORT.
        let mut active = Vec::new();
        let mut started = std::collections::HashSet::new();
        for record in &records {
            match record {
                LogRecord::Start { tx_id, .. } => {
                    started.insert(*tx_id);
                }
                LogRecord::Commit { tx_id, .. } | LogRecord::Abort { tx_id, .. } => {
                    started.remove(tx_id);
                }
                _ => {}
            }
        }
        active.extend(started);
        active.sort_unstable();

        self.write_log(LogRecord::Checkpoint {
            tx_id: 0,
            ts: now_millis(),
            active_transactions: active.clone(),
        })?;
        self.flush()?;

        self.meta.last_checkpoint_line = self.line_count()?;
        self.meta.active_transactions_at_checkpoint = active;
        self.write_meta()?;
        Ok(self.meta.last_checkpoint_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_log_forces_flush_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path(), 100).unwrap();
        wal.write_log(LogRecord::Start { tx_id: 1, ts: 1 }).unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 0, "START alone should still be buffered");
        wal.write_log(LogRecord::Commit { tx_id: 1, ts: 2 }).unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 2);
    }

    #[test]
    fn checkpoint_advances_line_count_and_tracks_actives() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path(), 100).unwrap();
        wal.write_log(LogRecord::Start { tx_id: 1, ts: 1 }).unwrap();
        wal.write_log(LogRecord::Commit { tx_id: 1, ts: 2 }).unwrap();
        wal.write_log(LogRecord::Start { tx_id: 2, ts: 3 }).unwrap();
        wal.flush().unwrap();
        let mut applied = Vec::new();
        let line = wal.save_checkpoint(|r| applied.push(r.clone())).unwrap();
        let file_lines = wal.read_all().unwrap().len();
        assert_eq!(line, file_lines);
        assert_eq!(wal.active_transactions_at_checkpoint(), &[2]);
    }

    #[test]
    fn checkpoint_replays_committed_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path(), 100).unwrap();
        wal.write_log(LogRecord::Start { tx_id: 1, ts: 1 }).unwrap();
        wal.write_log(LogRecord::Change {
            tx_id: 1,
            ts: 2,
            item_name: "t".into(),
            old_value: None,
            new_value: Some(serde_json::json!({"id": 1})),
        })
        .unwrap();
        wal.write_log(LogRecord::Commit { tx_id: 1, ts: 3 }).unwrap();
        let mut applied = Vec::new();
        wal.save_checkpoint(|r| applied.push(r.clone())).unwrap();
        assert_eq!(applied.len(), 1);
    }
}
