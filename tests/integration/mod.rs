//! Integration tests for sqlbatch.

pub mod common;
pub mod import_test;
pub mod job_test;
pub mod postgres_test;
pub mod script_test;
