//! Mock warehouse client for testing.
//!
//! Returns scripted results or errors based on statement text and records
//! every statement it receives.

use super::{ColumnInfo, DatabaseBackend, Row, StatementResult, Value, WarehouseClient};
use crate::error::{BatchError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted reply for statements matching a rule.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a result set.
    Rows {
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
    },
    /// Report affected rows without a result set.
    Affected(u64),
    /// Fail with a warehouse error code.
    Error { code: i64, message: String },
}

impl MockResponse {
    /// Result set with text columns named `names`.
    pub fn rows(names: &[&str], rows: Vec<Row>) -> Self {
        Self::Rows {
            columns: names.iter().map(|n| ColumnInfo::new(*n, "TEXT")).collect(),
            rows,
        }
    }

    /// Warehouse error with the given code.
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// A statement as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub query_tag: Option<String>,
}

/// A mock warehouse that answers from a list of rules.
///
/// Rules match when the statement contains the rule's fragment
/// (case-insensitive); the first match wins. Unmatched `SELECT`s return one
/// row, everything else affects zero rows.
pub struct MockWarehouse {
    backend: DatabaseBackend,
    rules: Vec<(String, MockResponse)>,
    executed: Arc<Mutex<Vec<ExecutedStatement>>>,
    closed: Arc<AtomicBool>,
    query_tag: Option<String>,
    last_query_id: Option<String>,
    statement_count: u64,
}

impl MockWarehouse {
    /// Creates a new mock warehouse with no rules.
    pub fn new() -> Self {
        Self {
            backend: DatabaseBackend::Postgres,
            rules: Vec::new(),
            executed: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            query_tag: None,
            last_query_id: None,
            statement_count: 0,
        }
    }

    /// Uses the placeholder syntax of another backend.
    pub fn with_backend(mut self, backend: DatabaseBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Adds a rule.
    pub fn on(mut self, fragment: impl Into<String>, response: MockResponse) -> Self {
        self.rules.push((fragment.into().to_uppercase(), response));
        self
    }

    /// Shared handle to the executed-statement log.
    pub fn executed(&self) -> Arc<Mutex<Vec<ExecutedStatement>>> {
        Arc::clone(&self.executed)
    }

    /// Shared handle that flips to true when the session is closed.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn respond(&self, sql: &str) -> MockResponse {
        let upper = sql.to_uppercase();
        if let Some((_, response)) = self.rules.iter().find(|(f, _)| upper.contains(f.as_str())) {
            return response.clone();
        }

        if upper.trim_start().starts_with("SELECT") {
            MockResponse::rows(
                &["result"],
                vec![vec![Value::String(format!("Mock result for: {sql}"))]],
            )
        } else {
            MockResponse::Affected(0)
        }
    }
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WarehouseClient for MockWarehouse {
    fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        if self.is_closed() {
            return Err(BatchError::connection("Warehouse session is closed"));
        }

        self.statement_count += 1;
        self.last_query_id = Some(format!("mock-query-{}", self.statement_count));

        if let Ok(mut executed) = self.executed.lock() {
            executed.push(ExecutedStatement {
                sql: sql.to_string(),
                params: params.to_vec(),
                query_tag: self.query_tag.clone(),
            });
        }

        match self.respond(sql) {
            MockResponse::Rows { columns, rows } => Ok(StatementResult::with_rows(columns, rows)),
            MockResponse::Affected(n) => Ok(StatementResult::affected(n)),
            MockResponse::Error { code, message } => Err(BatchError::statement(code, message)),
        }
    }

    async fn set_query_tag(&mut self, tag: &str) -> Result<()> {
        self.query_tag = Some(tag.to_string());
        Ok(())
    }

    fn last_query_id(&self) -> Option<&str> {
        self.last_query_id.as_deref()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
