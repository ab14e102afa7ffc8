//! Statement execution with failure classification.
//!
//! One call expands the statement, runs it, renders any result set, and on
//! failure classifies the error and asks the exit controller whether the job
//! stops. Instrumentation is logged whatever the outcome.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::db::{Value, WarehouseClient};
use crate::error::{BatchError, Result};
use crate::runtime::exit::{UNCLASSIFIED_ERROR_CODE, UNCLASSIFIED_SEVERITY};
use crate::runtime::expand::{has_param_markers, has_variable_markers, Expansion};
use crate::runtime::params::{bind_named, BoundStatement};
use crate::runtime::RuntimeContext;

const TIME_FORMAT: &str = "%Y %m %d %H:%M:%S";

/// Per-call execution settings.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Values bound to `{NAME}` tokens.
    pub using: Option<HashMap<String, Value>>,
    /// Session query tag applied before the statement.
    pub query_tag: Option<String>,
    /// Stop the job on failure. On by default.
    pub exit_on_error: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            using: None,
            query_tag: None,
            exit_on_error: true,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn using(mut self, values: HashMap<String, Value>) -> Self {
        self.using = Some(values);
        self
    }

    pub fn query_tag(mut self, tag: impl Into<String>) -> Self {
        self.query_tag = Some(tag.into());
        self
    }

    /// Log failures and return instead of stopping the job.
    pub fn continue_on_error(mut self) -> Self {
        self.exit_on_error = false;
        self
    }
}

/// A failure that was recorded but did not stop the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFailure {
    pub code: i64,
    pub severity: i32,
    pub message: String,
}

/// What one statement did.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Statement text as sent to the warehouse.
    pub sql: String,
    /// Rows returned, or rows affected when there was no result set.
    pub activity_count: u64,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub elapsed: Duration,
    pub query_id: Option<String>,
    pub error: Option<StatementFailure>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs statements on one session against the job's runtime state.
pub struct StatementExecutor<'a> {
    client: &'a mut dyn WarehouseClient,
    ctx: &'a mut RuntimeContext,
}

impl<'a> StatementExecutor<'a> {
    pub fn new(client: &'a mut dyn WarehouseClient, ctx: &'a mut RuntimeContext) -> Self {
        Self { client, ctx }
    }

    /// Executes one statement.
    ///
    /// Returns `Err(BatchError::Halt)` when the statement failed with
    /// `exit_on_error` set; the exit decision has been taken by then. With
    /// `exit_on_error` off, failures come back as `Ok` with
    /// [`ExecutionOutcome::error`] set.
    ///
    /// Once the exit has been decided nothing more is sent; every call
    /// returns the same halt.
    pub async fn execute(&mut self, sql: &str, options: &ExecuteOptions) -> Result<ExecutionOutcome> {
        self.check_not_halted()?;
        info!("Executing: {sql}.");
        let bound = self.prepare(sql, options.using.as_ref());
        self.run(bound, options).await
    }

    /// Re-runs the previous statement `times` times (`0` counts as once).
    pub async fn repeat_previous(&mut self, times: usize) -> Result<Vec<ExecutionOutcome>> {
        self.check_not_halted()?;
        let Some(previous) = self.ctx.previous_statement.clone() else {
            warn!("Warning: No previous SQL request.");
            return Ok(Vec::new());
        };

        let options = ExecuteOptions::default();
        let mut outcomes = Vec::with_capacity(times.max(1));
        for _ in 0..times.max(1) {
            info!("Executing: {}.", previous.sql);
            outcomes.push(self.run(previous.clone(), &options).await?);
        }
        Ok(outcomes)
    }

    fn check_not_halted(&self) -> Result<()> {
        match self.ctx.exit.decision() {
            Some(decision) => {
                debug!("Exit already decided with code {}; statement skipped", decision.code);
                Err(BatchError::Halt { code: decision.code })
            }
            None => Ok(()),
        }
    }

    fn prepare(&self, sql: &str, using: Option<&HashMap<String, Value>>) -> BoundStatement {
        let expander = self.ctx.expander();
        let mut text = sql.to_string();

        if has_variable_markers(&text) {
            info!("Expanding variables in SQL statement");
            let expansion = expander.expand_vars(&text);
            self.report_unresolved(&expansion);
            text = expansion.text;
            info!("Expanded string: {text}");
        }

        match using {
            Some(values) => bind_named(&text, values, self.client.backend()),
            None => {
                if has_param_markers(&text) {
                    let expansion = expander.expand_params(&text);
                    self.report_unresolved(&expansion);
                    text = expansion.text;
                }
                BoundStatement {
                    sql: text,
                    values: Vec::new(),
                }
            }
        }
    }

    fn report_unresolved(&self, expansion: &Expansion) {
        if self.ctx.strict_expansion && !expansion.is_complete() {
            warn!("Unresolved variables left in statement: {:?}", expansion.unresolved);
        }
    }

    async fn run(&mut self, bound: BoundStatement, options: &ExecuteOptions) -> Result<ExecutionOutcome> {
        let started_at = Local::now();
        let start = Instant::now();
        info!("Query Start Time: {}", started_at.format(TIME_FORMAT));

        let result = self.send(&bound, options.query_tag.as_deref()).await;

        let finished_at = Local::now();
        let elapsed = start.elapsed();
        let query_id = self.client.last_query_id().map(str::to_string);
        info!("Query End Time: {}", finished_at.format(TIME_FORMAT));
        info!(
            "Query Execution Time for Query ID {} is {:?}",
            query_id.as_deref().unwrap_or("<none>"),
            elapsed
        );

        let mut outcome = ExecutionOutcome {
            sql: bound.sql.clone(),
            activity_count: 0,
            started_at,
            finished_at,
            elapsed,
            query_id,
            error: None,
        };
        self.ctx.previous_statement = Some(bound);

        match result {
            Ok(count) => {
                outcome.activity_count = count;
                Ok(outcome)
            }
            Err(e) => {
                let failure = self.classify(&e);
                if options.exit_on_error {
                    self.ctx.exit.fail(Some(failure.code));
                    return Err(BatchError::Halt { code: failure.code });
                }
                outcome.error = Some(failure);
                Ok(outcome)
            }
        }
    }

    async fn send(&mut self, bound: &BoundStatement, query_tag: Option<&str>) -> Result<u64> {
        if let Some(tag) = query_tag {
            self.client.set_query_tag(tag).await?;
        }

        let result = self.client.execute(&bound.sql, &bound.values).await?;
        let count = result.activity_count();
        self.ctx.activity_count = count;

        let renders = if count >= 1 {
            result.has_result_set()
        } else {
            self.ctx.export.is_configured()
        };
        if renders {
            self.ctx.export.stream(&result)?;
        }
        Ok(count)
    }

    fn classify(&mut self, e: &BatchError) -> StatementFailure {
        error!("*** Failure {e}");
        let (code, severity) = match e.code() {
            Some(code) => (code, self.ctx.record_failure(code)),
            None => {
                self.ctx
                    .exit
                    .record(UNCLASSIFIED_ERROR_CODE, UNCLASSIFIED_SEVERITY);
                (UNCLASSIFIED_ERROR_CODE, UNCLASSIFIED_SEVERITY)
            }
        };
        StatementFailure {
            code,
            severity,
            message: e.to_string(),
        }
    }
}
