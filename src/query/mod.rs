//! Statement execution for sqlbatch.
//!
//! Isolates the per-statement orchestration from the job lifecycle.

pub mod executor;
pub mod loaders;

pub use executor::{ExecuteOptions, ExecutionOutcome, StatementExecutor, StatementFailure};
