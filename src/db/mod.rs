//! Warehouse abstraction layer for sqlbatch.
//!
//! Provides a trait-based interface for statement execution, allowing
//! different warehouse backends to be used interchangeably.

mod mock;
mod postgres;
mod sqlite;
mod types;

pub use mock::{ExecutedStatement, MockResponse, MockWarehouse};
pub use postgres::PostgresWarehouse;
pub use sqlite::SqliteWarehouse;
pub use types::{ColumnInfo, Row, StatementResult, Value};

use crate::config::LogonConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported warehouse backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::Sqlite => None,
        }
    }

    /// Returns the bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::Sqlite => "?".to_string(),
        }
    }

    /// Whether a placeholder may be referenced more than once.
    pub fn reuses_placeholders(&self) -> bool {
        matches!(self, Self::Postgres)
    }
}

/// Creates a warehouse client for the configured backend.
///
/// This is the central factory function for warehouse sessions.
pub async fn connect(config: &LogonConfig, query_tag: &str) -> Result<Box<dyn WarehouseClient>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let client = PostgresWarehouse::connect(config, query_tag).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Sqlite => {
            let client = SqliteWarehouse::connect(config, query_tag).await?;
            Ok(Box::new(client))
        }
    }
}

/// Maps a PostgreSQL SQLSTATE such as `42P01` to a stable numeric code.
///
/// SQLSTATEs are five base-36 digits, so the mapping is unique. Jobs register
/// tolerated states with `sqlstate_code("42P01")`.
pub fn sqlstate_code(sqlstate: &str) -> i64 {
    i64::from_str_radix(sqlstate, 36).unwrap_or(0)
}

/// Trait defining the interface for warehouse sessions.
///
/// One client is one session; statements run strictly one at a time.
#[async_trait]
pub trait WarehouseClient: Send {
    /// Backend kind, used for placeholder syntax.
    fn backend(&self) -> DatabaseBackend;

    /// Executes one statement with positional bind values.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Tags subsequent statements of this session for warehouse-side tracing.
    async fn set_query_tag(&mut self, tag: &str) -> Result<()>;

    /// Identifier of the most recent statement, even if it failed.
    fn last_query_id(&self) -> Option<&str>;

    /// Returns true once the session has been closed.
    fn is_closed(&self) -> bool;

    /// Closes the session. Closing twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(DatabaseBackend::Postgres.placeholder(3), "$3");
        assert_eq!(DatabaseBackend::Sqlite.placeholder(3), "?");
        assert!(DatabaseBackend::Postgres.reuses_placeholders());
        assert!(!DatabaseBackend::Sqlite.reuses_placeholders());
    }

    #[test]
    fn test_sqlstate_code_is_unique_per_state() {
        assert_ne!(sqlstate_code("42P01"), sqlstate_code("42601"));
        assert_eq!(sqlstate_code("42P01"), sqlstate_code("42p01"));
        assert!(sqlstate_code("23505") > 255);
    }
}
