use thiserror::Error;

#[derive(Debug, Error)]
pub enum DurabilityError {
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode WAL record: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DurabilityError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
