use thiserror::Error;

/// Errors raised by the file manager, buffer pool, and B+-tree index.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("schema error: {0}")]
    Schema(#[from] relix_schema::SchemaError),
    #[error("table `{0}` already exists")]
    TableExists(String),
    #[error("table `{0}` not found")]
    TableNotFound(String),
    #[error("no unpinned page available")]
    BufferPoolExhausted,
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode on-disk data: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
