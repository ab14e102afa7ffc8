//! Job lifecycle: log on, run statements, and finish with one exit code.
//!
//! A [`Job`] owns the runtime context and every connection it opens.
//! [`Job::finish`] is the only shutdown path: it closes the connections,
//! settles the exit decision and hands the status back to `main`.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;

use futures::FutureExt;
use tracing::{error, info};

use crate::config::{LogonConfig, RuntimePaths};
use crate::connection::ConnectionManager;
use crate::db::WarehouseClient;
use crate::error::{BatchError, Result};
use crate::query::{ExecuteOptions, ExecutionOutcome, StatementExecutor};
use crate::runtime::exit::UNHANDLED_ERROR_CODE;
use crate::runtime::import::{ImportOutcome, ImportType};
use crate::runtime::params::read_param_args;
use crate::runtime::RuntimeContext;
use crate::shell;

/// Variable set from the logon file so statements can say `${SNOW_WAREHOUSE}`.
pub const WAREHOUSE_VARIABLE: &str = "SNOW_WAREHOUSE";

const DEFAULT_JOB_NAME: &str = "sqlbatch";

/// One batch job run.
pub struct Job {
    name: String,
    ctx: RuntimeContext,
    connections: ConnectionManager,
}

impl Job {
    /// Creates a job; `name` becomes the session query tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_variables(name, HashMap::new())
    }

    pub fn with_variables(name: impl Into<String>, variables: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            ctx: RuntimeContext::with_variables(variables),
            connections: ConnectionManager::new(),
        }
    }

    /// Job named after the running executable, with variables from
    /// `--param-NAME=VALUE` arguments.
    pub fn from_env() -> Self {
        let exe = std::env::current_exe().ok();
        Self::from_args(exe.as_deref(), std::env::args())
    }

    pub fn from_args<I, S>(exe: Option<&Path>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = exe
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_JOB_NAME.to_string());
        Self::with_variables(name, read_param_args(args))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RuntimeContext {
        &mut self.ctx
    }

    /// Logs on with the logon file at its conventional location.
    pub async fn log_on(&mut self) -> Result<()> {
        let path = RuntimePaths::from_env().logon_file();
        self.log_on_with(&path).await
    }

    /// Logs on with the given logon file.
    ///
    /// An unusable file is a configuration error and nothing is attempted.
    pub async fn log_on_with(&mut self, logon_file: &Path) -> Result<()> {
        info!("Logon file = {}", logon_file.display());
        let config = LogonConfig::load_from_file(logon_file)?;

        self.ctx
            .variables
            .entry(WAREHOUSE_VARIABLE.to_string())
            .or_insert_with(|| config.warehouse.clone());

        self.connections.open(&config, &self.name).await?;
        Ok(())
    }

    /// Uses an already open client as the current session.
    pub fn attach(&mut self, client: Box<dyn WarehouseClient>) {
        self.connections.attach(client, self.name.clone());
    }

    pub async fn execute(&mut self, sql: &str) -> Result<ExecutionOutcome> {
        self.execute_with(sql, &ExecuteOptions::default()).await
    }

    pub async fn execute_with(&mut self, sql: &str, options: &ExecuteOptions) -> Result<ExecutionOutcome> {
        let client = self.connections.current_mut()?;
        StatementExecutor::new(client, &mut self.ctx)
            .execute(sql, options)
            .await
    }

    pub async fn repeat_previous(&mut self, times: usize) -> Result<Vec<ExecutionOutcome>> {
        let client = self.connections.current_mut()?;
        StatementExecutor::new(client, &mut self.ctx)
            .repeat_previous(times)
            .await
    }

    /// Statement executor over the current session, for the bulk-load
    /// helpers in [`crate::query::loaders`].
    pub fn executor(&mut self) -> Result<StatementExecutor<'_>> {
        let client = self.connections.current_mut()?;
        Ok(StatementExecutor::new(client, &mut self.ctx))
    }

    /// Sets the severity of a warehouse error code.
    pub fn set_error_level(&mut self, code: i64, severity: i32) {
        self.ctx.severities.register(code, severity);
    }

    pub fn set_error_levels<I: IntoIterator<Item = i64>>(&mut self, codes: I, severity: i32) {
        self.ctx.severities.register_all(codes, severity);
    }

    pub fn set_default_error_level(&mut self, severity: i32) {
        self.ctx.severities.set_default_level(severity);
    }

    /// Sends subsequent result sets to a file.
    pub fn export_to(&mut self, path: &str, separator: &str) {
        self.ctx.export.configure(path, separator);
    }

    pub fn export_reset(&mut self) {
        self.ctx.export.reset();
    }

    pub fn import_from(&mut self, path: &str, separator: &str) -> Result<()> {
        self.ctx.import.configure(path, separator)
    }

    pub fn import_reset(&mut self) {
        self.ctx.import.reset();
    }

    /// Reads the next import row. See [`crate::runtime::RowImporter::read_into`].
    pub fn read_import_row<S: AsRef<str>>(&mut self, schema: &[(S, ImportType)]) -> Result<ImportOutcome> {
        self.ctx.import.read_into(schema)
    }

    /// Runs a shell command and records its return code.
    pub async fn os(&mut self, command: &str) -> Result<i32> {
        shell::os(&mut self.ctx, command).await
    }

    /// Ends the job and returns the process exit status.
    ///
    /// `result` is the outcome of the job body. Clean runs exit with the
    /// worst severity seen (normalized); a halt keeps the decision already
    /// taken; a configuration error exits with its distinguished status;
    /// anything else fails with the unhandled-error code.
    pub async fn finish(mut self, result: Result<()>) -> i32 {
        info!("Script done >>>>>>>>>>>>>>>>>>>>");
        self.connections.close_all().await;

        match result {
            Ok(()) => {
                self.ctx.exit.fail(None);
            }
            Err(BatchError::Halt { .. }) => {}
            Err(e @ BatchError::Config(_)) => {
                error!("*** Failure {e}");
                self.ctx.exit.abort_config();
            }
            Err(e) => {
                error!("*** Failure: {}: {}", e.category(), e);
                self.ctx.exit.fail(Some(UNHANDLED_ERROR_CODE));
            }
        }

        self.ctx.exit.exit_code()
    }
}

/// Runs a job body, turning a panic into an internal error so the job
/// still reaches [`Job::finish`].
pub async fn catch_panic<F>(body: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(BatchError::internal(format!(
            "panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
