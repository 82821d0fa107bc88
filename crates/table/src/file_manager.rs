//! Per-table and per-schema file I/O, and DDL-time schema validation.

use crate::error::StorageError;
use relix_schema::Schema;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Owns the `schemas/` and `tables/` directories under a data root.
pub struct FileManager {
    root: PathBuf,
}

impl FileManager {
    /// Opens (creating if necessary) the `schemas/` and `tables/`
    /// directories under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        for sub in ["schemas", "tables", "indexes"] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).map_err(|e| StorageError::io(dir.display().to_string(), e))?;
        }
        Ok(Self { root })
    }

    pub fn data_root(&self) -> &Path {
        &self.root
    }

    pub fn schema_path(&self, table: &str) -> PathBuf {
        self.root.join("schemas").join(format!("{table}.dat"))
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join("tables").join(format!("{table}.dat"))
    }

    pub fn index_path(&self, table: &str, column: &str) -> PathBuf {
        self.root.join("indexes").join(format!("{table}.{column}.idx"))
    }

    pub fn schema_exists(&self, table: &str) -> bool {
        self.schema_path(table).is_file()
    }

    pub fn save_schema(&self, schema: &Schema) -> Result<(), StorageError> {
        let path = self.schema_path(&schema.table_name);
        fs::write(&path, relix_sats::encode_schema(schema))
            .map_err(|e| StorageError::io(path.display().to_string(), e))
    }

    pub fn load_schema(&self, table: &str) -> Result<Schema, StorageError> {
        let path = self.schema_path(table);
        let bytes = fs::read(&path).map_err(|_| StorageError::TableNotFound(table.to_string()))?;
        relix_sats::decode_schema(&bytes).map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    pub fn delete_schema(&self, table: &str) -> Result<(), StorageError> {
        let path = self.schema_path(table);
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        }
        Ok(())
    }

    pub fn create_table_file(&self, table: &str) -> Result<(), StorageError> {
        let path = self.table_path(table);
        if !path.exists() {
            fs::write(&path, []).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        }
        Ok(())
    }

    pub fn delete_table_file(&self, table: &str) -> Result<(), StorageError> {
        let path = self.table_path(table);
        if path.is_file() {
            fs::remove_file(&path).map_err(|e| StorageError::io(path.display().to_string(), e))?;
        }
        Ok(())
    }

    /// Lists every table name with a persisted schema file.
    pub fn list_schema_files(&self) -> Result<Vec<String>, StorageError> {
        let dir = self.root.join("schemas");
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| StorageError::io(dir.display().to_string(), e))? {
            let entry = entry.map_err(|e| StorageError::io(dir.display().to_string(), e))?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                out.push(name.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Loads every currently-persisted schema, keyed by table name. Used to
    /// resolve foreign-key targets during `validate_schema`.
    pub fn load_all_schemas(&self) -> Result<HashMap<String, Schema>, StorageError> {
        let mut out = HashMap::new();
        for name in self.list_schema_files()? {
            out.insert(name.clone(), self.load_schema(&name)?);
        }
        Ok(out)
    }

    /// Validates `schema` both in isolation and against currently known
    /// tables' foreign-key targets.
    pub fn validate_schema(&self, schema: &Schema) -> Result<(), StorageError> {
        relix_schema::validate_schema(schema)?;
        let others = self.load_all_schemas()?;
        relix_schema::validate_foreign_keys(schema, |name| others.get(name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relix_primitives::ColumnType;
    use relix_schema::Column;

    #[test]
    fn round_trips_a_schema_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fm = FileManager::open(dir.path()).unwrap();
        let schema = Schema::new("t", vec![Column::new("id", ColumnType::Integer).primary_key()]);
        fm.save_schema(&schema).unwrap();
        assert!(fm.schema_exists("t"));
        let loaded = fm.load_schema("t").unwrap();
        assert_eq!(schema, loaded);
    }

    #[test]
    fn validate_schema_catches_missing_fk_target() {
        let dir = tempfile::tempdir().unwrap();
        let fm = FileManager::open(dir.path()).unwrap();
        let schema = Schema::new(
            "orders",
            vec![Column::new("uid", ColumnType::Integer).references(relix_schema::ForeignKey {
                ref_table: "users".into(),
                ref_column: "id".into(),
                on_delete: relix_primitives::ForeignKeyAction::Restrict,
                on_update: relix_primitives::ForeignKeyAction::NoAction,
            })],
        );
        assert!(fm.validate_schema(&schema).is_err());
    }

    #[test]
    fn list_schema_files_lists_existing_tables() {
        let dir = tempfile::tempdir().unwrap();
        let fm = FileManager::open(dir.path()).unwrap();
        fm.save_schema(&Schema::new("a", vec![Column::new("id", ColumnType::Integer)]))
            .unwrap();
        fm.save_schema(&Schema::new("b", vec![Column::new("id", ColumnType::Integer)]))
            .unwrap();
        assert_eq!(fm.list_schema_files().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}
