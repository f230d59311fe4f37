//! `runlog` crate — the Run/Step/Branch/Attempt Log data model plus the
//! `RunLogStore` provider trait and two concrete backends (in-memory,
//! JSON-file) that make the crate runnable without a database.

pub mod error;
pub mod json_file;
pub mod memory;
pub mod models;
pub mod store;

pub use error::RunLogError;
pub use json_file::JsonFileRunLogStore;
pub use memory::InMemoryRunLogStore;
pub use models::{AttemptLog, BranchLog, CodeIdentity, GraphLog, RunLog, Status, StepLog};
pub use store::RunLogStore;
