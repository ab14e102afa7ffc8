//! Process-wide runtime state for one batch job.
//!
//! Everything the legacy scripting model kept in globals lives on
//! [`RuntimeContext`], which the job owns and passes to the executor.

pub mod exit;
pub mod expand;
pub mod export;
pub mod import;
pub mod params;
pub mod severity;

pub use exit::{ExitController, ExitDecision, FailureState};
pub use expand::{Expansion, VariableExpander};
pub use export::{ExportTarget, ResultStreamer, DEFAULT_SEPARATOR};
pub use import::{ImportOutcome, ImportType, RowImporter};
pub use params::BoundStatement;
pub use severity::SeverityMap;

use std::collections::HashMap;

/// Mutable state shared by every statement of a job.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    pub severities: SeverityMap,
    pub exit: ExitController,
    pub export: ResultStreamer,
    pub import: RowImporter,
    /// Job variables, from `--param-NAME=VALUE` arguments and the job itself.
    pub variables: HashMap<String, String>,
    /// Rows returned or affected by the last statement.
    pub activity_count: u64,
    /// Last statement run, after expansion and with its bound values.
    pub previous_statement: Option<BoundStatement>,
    /// Exit status of the last `.OS` command.
    pub system_return_code: i32,
    /// Warn about `$NAME`/`{NAME}` tokens that did not resolve.
    pub strict_expansion: bool,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(variables: HashMap<String, String>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Expander over this job's variables and the process environment.
    pub fn expander(&self) -> VariableExpander<'_> {
        VariableExpander::new(&self.variables)
    }

    /// Records a failure: severity through the map, worst level kept.
    /// Returns the severity.
    pub fn record_failure(&mut self, code: i64) -> i32 {
        let severity = self.severities.classify(code);
        self.exit.record(code, severity);
        severity
    }

    pub fn failure_state(&self) -> FailureState {
        self.exit.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failure_uses_severity_map() {
        let mut ctx = RuntimeContext::new();
        ctx.severities.register(2003, 0);

        assert_eq!(ctx.record_failure(2003), 0);
        assert!(!ctx.failure_state().has_failed());

        assert_eq!(ctx.record_failure(42), severity::DEFAULT_ERROR_LEVEL);
        assert_eq!(ctx.failure_state().error_level, 8);
        assert_eq!(ctx.failure_state().error_code, 42);
    }

    #[test]
    fn test_variables() {
        let mut ctx = RuntimeContext::with_variables(HashMap::from([(
            "ENVNAME".to_string(),
            "DEV".to_string(),
        )]));
        ctx.set_variable("CURR_YYYY", "2024");
        assert_eq!(ctx.variable("ENVNAME"), Some("DEV"));
        assert_eq!(
            ctx.expander().expand_params("{CURR_YYYY}").text,
            "2024"
        );
    }
}
