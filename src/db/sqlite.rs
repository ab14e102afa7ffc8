//! SQLite warehouse client implementation.
//!
//! Local stand-in for the warehouse: the database named in the logon file is
//! a SQLite file path (or `:memory:`). Used for dry runs and tests.

use crate::config::LogonConfig;
use crate::db::{ColumnInfo, DatabaseBackend, Row, StatementResult, Value, WarehouseClient};
use crate::error::{BatchError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::TryStreamExt;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{
    Column as SqlxColumn, Connection, Either, Executor, Row as SqlxRow, Sqlite, Statement,
    TypeInfo, ValueRef,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// SQLite warehouse session.
#[derive(Debug)]
pub struct SqliteWarehouse {
    conn: Option<SqliteConnection>,
    query_tag: String,
    last_query_id: Option<String>,
}

impl SqliteWarehouse {
    /// Opens the database file named by `config.database`, creating it if needed.
    pub async fn connect(config: &LogonConfig, query_tag: &str) -> Result<Self> {
        let options = if config.database == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| BatchError::config(format!("Invalid database path: {e}")))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database)
                .create_if_missing(true)
        };

        let login_timeout = Duration::from_secs(config.login_timeout);
        let conn = tokio::time::timeout(login_timeout, SqliteConnection::connect_with(&options))
            .await
            .map_err(|_| {
                BatchError::connection(format!(
                    "Opening {} timed out after {} seconds",
                    config.database, config.login_timeout
                ))
            })?
            .map_err(|e| {
                BatchError::connection(format!("Cannot open {}: {e}", config.database))
            })?;

        debug!("Opened SQLite warehouse {}", config.database);
        Ok(Self {
            conn: Some(conn),
            query_tag: query_tag.to_string(),
            last_query_id: None,
        })
    }

    /// Current session tag (SQLite has no server-side equivalent).
    pub fn query_tag(&self) -> &str {
        &self.query_tag
    }

    fn session(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| BatchError::connection("Warehouse session is closed"))
    }
}

#[async_trait]
impl WarehouseClient for SqliteWarehouse {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.last_query_id = Some(Uuid::new_v4().to_string());
        let conn = self.session()?;

        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, value| bind_value(query, value));

        let statement = (&mut *conn).prepare(sql).await.map_err(map_statement_error)?;
        let mut result = StatementResult::new();
        result.columns = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect();

        // sqlite3_changes() keeps the count of the last DML, so a statement
        // that changes nothing would report it again.
        let changes_before = total_changes(conn).await?;
        let mut stream = (&mut *conn).fetch_many(query);
        while let Some(item) = stream.try_next().await.map_err(map_statement_error)? {
            if let Either::Right(row) = item {
                if result.columns.is_empty() {
                    result.columns = column_info(&row);
                }
                result.rows.push(convert_row(&row));
            }
        }
        drop(stream);

        if !result.has_result_set() {
            result.rows_affected = total_changes(conn).await?.saturating_sub(changes_before);
        }
        Ok(result)
    }

    async fn set_query_tag(&mut self, tag: &str) -> Result<()> {
        debug!("Query tag set to {tag}");
        self.query_tag = tag.to_string();
        Ok(())
    }

    fn last_query_id(&self) -> Option<&str> {
        self.last_query_id.as_deref()
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| BatchError::connection(format!("Failed to close session: {e}")))?;
        }
        Ok(())
    }
}

async fn total_changes(conn: &mut SqliteConnection) -> Result<u64> {
    let changes: i64 = sqlx::query_scalar("SELECT total_changes()")
        .fetch_one(conn)
        .await
        .map_err(map_statement_error)?;
    Ok(u64::try_from(changes).unwrap_or(0))
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Date(d) => query.bind(*d),
        Value::Timestamp(ts) => query.bind(*ts),
    }
}

fn column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

fn convert_row(row: &SqliteRow) -> Row {
    (0..row.len()).map(|i| convert_value(row, i)).collect()
}

/// Decodes by the value's storage class, then refines by declared type.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };
    let declared = row.columns()[index].type_info().name().to_uppercase();

    match storage.as_str() {
        "INTEGER" | "INT8" | "BIGINT" => row
            .try_get_unchecked::<i64, _>(index)
            .map(|v| match declared.as_str() {
                "BOOLEAN" | "BOOL" => Value::Bool(v != 0),
                _ => Value::Int(v),
            })
            .unwrap_or(Value::Null),
        "REAL" | "FLOAT" | "DOUBLE" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => {
            let Ok(text) = row.try_get_unchecked::<String, _>(index) else {
                return Value::Null;
            };
            match declared.as_str() {
                "DATE" => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map(Value::Date)
                    .unwrap_or(Value::String(text)),
                "DATETIME" | "TIMESTAMP" => {
                    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                        .map(Value::Timestamp)
                        .unwrap_or(Value::String(text))
                }
                _ => Value::String(text),
            }
        }
    }
}

/// SQLite reports its result codes as decimal strings.
fn map_statement_error(error: sqlx::Error) -> BatchError {
    let Some(db_error) = error.as_database_error() else {
        return BatchError::connection(error.to_string());
    };

    let message = db_error.message().to_string();
    match db_error.code().and_then(|c| c.parse::<i64>().ok()) {
        Some(code) => BatchError::statement(code, message),
        None => BatchError::internal(message),
    }
}
