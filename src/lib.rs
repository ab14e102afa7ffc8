//! sqlbatch - a batch SQL runtime with BTEQ-style script semantics.
//!
//! This library exposes the core modules for the binary and for integration
//! tests.

pub mod cli;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod query;
pub mod runtime;
pub mod script;
pub mod shell;
