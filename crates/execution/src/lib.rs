//! The physical operator tree and the two traits (`StorageBackend`,
//! `Ccm`) it runs against. Everything here operates on qualified rows;
//! mapping to and from the unqualified rows stored on disk is the
//! storage layer's job.

pub mod backend;
pub mod ccm;
pub mod error;
pub mod eval;
pub mod operators;
pub mod rows;

pub use backend::{DataDeletion, DataRetrieval, DataWrite, StorageBackend};
pub use ccm::{Access, AllowAllCcm, Ccm};
pub use error::ExecutionError;
pub use operators::{execute_delete, execute_insert, execute_select, execute_update};
pub use rows::{QualifiedRow, Rows};
