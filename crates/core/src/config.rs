//! Engine configuration: on-disk location plus the knobs the storage
//! layer and WAL were built with (buffer pool size, page size, WAL
//! buffer flush threshold, DML abort/retry budget).

use std::path::PathBuf;

/// `DATA_ROOT`, `WAL_BUFFER_MAX`, and `DML_RETRY_LIMIT` env vars override
/// the matching default when present and parse cleanly, in the spirit of
/// an `Options` struct constructible from the environment.
const ENV_DATA_ROOT: &str = "RELIX_DATA_ROOT";
const ENV_WAL_BUFFER_MAX: &str = "RELIX_WAL_BUFFER_MAX";
const ENV_DML_RETRY_LIMIT: &str = "RELIX_DML_RETRY_LIMIT";

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub data_root: PathBuf,
    pub buffer_pool_pages: usize,
    pub page_size: usize,
    pub wal_buffer_max: usize,
    pub dml_retry_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./data"),
            buffer_pool_pages: 100,
            page_size: relix_expr::stats::PAGE_SIZE as usize,
            wal_buffer_max: 50,
            dml_retry_limit: 3,
        }
    }
}

impl Config {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    /// Builds a config from defaults, overridden by any of
    /// `RELIX_DATA_ROOT` / `RELIX_WAL_BUFFER_MAX` / `RELIX_DML_RETRY_LIMIT`
    /// present in the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(ENV_DATA_ROOT) {
            config.data_root = PathBuf::from(root);
        }
        if let Ok(value) = std::env::var(ENV_WAL_BUFFER_MAX) {
            if let Ok(parsed) = value.parse() {
                config.wal_buffer_max = parsed;
            }
        }
        if let Ok(value) = std::env::var(ENV_DML_RETRY_LIMIT) {
            if let Ok(parsed) = value.parse() {
                config.dml_retry_limit = parsed;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.dml_retry_limit, 3);
    }

    #[test]
    fn new_overrides_only_the_data_root() {
        let config = Config::new("/tmp/relix-data");
        assert_eq!(config.data_root, PathBuf::from("/tmp/relix-data"));
        assert_eq!(config.buffer_pool_pages, Config::default().buffer_pool_pages);
    }
}
