//! Connection management for sqlbatch.
//!
//! Centralizes warehouse session lifecycle.

pub mod manager;

pub use manager::{ActiveConnection, ConnectionManager};
