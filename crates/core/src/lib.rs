//! Top-level facade: wires configuration, the processor/dispatcher, and
//! the storage+durability stack into a single embeddable handle.

pub mod config;
pub mod ddl;
pub mod dml;
pub mod error;
pub mod meta;
pub mod processor;

pub use config::Config;
pub use error::Error;
pub use meta::{ColumnDescription, ForeignKeyDescription, TableDescription};
pub use processor::{Outcome, Processor};

use relix_expr::QueryNode;

/// An embeddable handle to one on-disk database. Construction opens (or
/// creates) the data directory, the buffer pool, and the write-ahead
/// log; [`Engine::execute`] is the single entry point a caller drives a
/// pre-built query tree through.
pub struct Engine {
    processor: Processor,
}

impl Engine {
    pub fn open(config: Config) -> Result<Self, Error> {
        Ok(Self {
            processor: Processor::open(config)?,
        })
    }

    pub fn execute(&mut self, tree: &QueryNode) -> Result<Outcome, Error> {
        self.processor.execute(tree)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.processor.list_tables()
    }

    pub fn describe_table(&self, table: &str) -> Result<TableDescription, Error> {
        self.processor.describe_table(table)
    }

    pub fn config(&self) -> &Config {
        self.processor.config()
    }
}
