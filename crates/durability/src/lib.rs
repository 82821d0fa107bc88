//! Write-ahead log and failure recovery manager.

pub mod error;
pub mod record;
pub mod recovery;
pub mod wal;

pub use error::DurabilityError;
pub use record::LogRecord;
pub use recovery::{recover, ActionKind, Criterion, RecoveryAction};
pub use wal::Wal;
