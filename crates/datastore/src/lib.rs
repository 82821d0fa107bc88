//! The storage layer: file manager, buffer pool, and B+-tree indexes,
//! wired up behind the execution layer's [`relix_execution::StorageBackend`]
//! trait, plus the statistics engine feeding the cost-based optimizer.

pub mod manager;
pub mod stats;

pub use manager::StorageManager;
pub use stats::compute_statistic;
