//! PostgreSQL warehouse client implementation.
//!
//! Provides the `PostgresWarehouse` struct that implements the
//! `WarehouseClient` trait over a single sqlx `PgConnection`.

use crate::config::LogonConfig;
use crate::db::{
    sqlstate_code, ColumnInfo, DatabaseBackend, Row, StatementResult, Value, WarehouseClient,
};
use crate::error::{BatchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::{
    Column as SqlxColumn, Connection, Either, Executor, Row as SqlxRow, Statement, TypeInfo,
};
use std::time::Duration;
use tracing::debug;

/// PostgreSQL warehouse session.
#[derive(Debug)]
pub struct PostgresWarehouse {
    conn: Option<PgConnection>,
    backend_pid: i32,
    statement_count: u64,
    last_query_id: Option<String>,
}

impl PostgresWarehouse {
    /// Opens a session, tagging it with `query_tag` as the application name.
    ///
    /// There is no retry: a failed login is reported to the job immediately.
    pub async fn connect(config: &LogonConfig, query_tag: &str) -> Result<Self> {
        let (host, port) = config.host_and_port();
        let port = port
            .or_else(|| DatabaseBackend::Postgres.default_port())
            .unwrap_or(5432);

        let options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database)
            .application_name(query_tag);

        debug!("Connecting to {}", config.display_string());

        let login_timeout = Duration::from_secs(config.login_timeout);
        let mut conn = tokio::time::timeout(login_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                BatchError::connection(format!(
                    "Login to {host}:{port} timed out after {} seconds",
                    config.login_timeout
                ))
            })?
            .map_err(|e| map_connection_error(e, config))?;

        let backend_pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut conn)
            .await
            .map_err(map_statement_error)?;

        debug!("Successfully connected to warehouse (backend pid {backend_pid})");
        Ok(Self {
            conn: Some(conn),
            backend_pid,
            statement_count: 0,
            last_query_id: None,
        })
    }

    fn session(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| BatchError::connection("Warehouse session is closed"))
    }
}

#[async_trait]
impl WarehouseClient for PostgresWarehouse {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        // Server process id plus statement number within the session.
        self.statement_count += 1;
        self.last_query_id = Some(format!("{}-{}", self.backend_pid, self.statement_count));
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

        let mut stream = (&mut *conn).fetch_many(query);
        while let Some(item) = stream.try_next().await.map_err(map_statement_error)? {
            match item {
                Either::Left(done) => result.rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    if result.columns.is_empty() {
                        result.columns = column_info(&row);
                    }
                    result.rows.push(convert_row(&row));
                }
            }
        }

        Ok(result)
    }

    async fn set_query_tag(&mut self, tag: &str) -> Result<()> {
        let statement = format!("SET application_name = '{}'", tag.replace('\'', "''"));
        let conn = self.session()?;
        sqlx::query(&statement)
            .execute(conn)
            .await
            .map_err(map_statement_error)?;
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

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
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

fn column_info(row: &PgRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|ts| Value::Timestamp(ts.naive_utc()))
            .unwrap_or(Value::Null),

        // Extract queries format numerics with to_char; anything else is read as text.
        _ => match row.try_get::<Option<String>, _>(index) {
            Ok(v) => v.map(Value::String).unwrap_or(Value::Null),
            Err(e) => {
                debug!("Cannot decode column {index} of type {type_name}: {e}");
                Value::Null
            }
        },
    }
}

/// Maps sqlx connection errors to operator-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &LogonConfig) -> BatchError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        BatchError::connection(format!(
            "Cannot connect to {}. Check that the warehouse is reachable.",
            config.account
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        BatchError::connection(format!(
            "Authentication failed for user '{}'. Check the logon file.",
            config.user
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        BatchError::connection(format!("Database '{}' does not exist.", config.database))
    } else {
        BatchError::connection(error.to_string())
    }
}

/// Maps a statement failure to a classifiable error when the server sent a code.
fn map_statement_error(error: sqlx::Error) -> BatchError {
    let Some(db_error) = error.as_database_error() else {
        return BatchError::connection(error.to_string());
    };

    let mut message = String::from("ERROR: ");
    message.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            message.push_str("\n  DETAIL: ");
            message.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            message.push_str("\n  HINT: ");
            message.push_str(hint);
        }
    }

    match db_error.code() {
        Some(state) => {
            message.push_str(&format!(" (SQLSTATE {state})"));
            BatchError::statement(sqlstate_code(&state), message)
        }
        None => BatchError::internal(message),
    }
}
