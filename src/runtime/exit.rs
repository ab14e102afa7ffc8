//! Failure bookkeeping and the single authoritative exit decision.
//!
//! Warehouse error codes routinely exceed 255, and a shell only sees the low
//! byte of an exit status: a code such as 512 would read as success. Every
//! non-zero failure is therefore reported as [`EXIT_FAILURE`].

use std::sync::OnceLock;
use tracing::{info, warn};

/// Exit status for a clean run.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit status for any failure.
pub const EXIT_FAILURE: i32 = 4;

/// Exit status for an unusable logon file. Not normalized.
pub const CONFIG_FAILURE_EXIT_CODE: i32 = 4;

/// Code recorded for failures that carry no warehouse error code.
pub const UNCLASSIFIED_ERROR_CODE: i64 = 999;

/// Severity recorded for failures that carry no warehouse error code.
pub const UNCLASSIFIED_SEVERITY: i32 = 8;

/// Code used when a job body fails with something other than a halt.
pub const UNHANDLED_ERROR_CODE: i64 = 1;

/// Worst outcome seen so far in this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureState {
    /// Last warehouse error code seen.
    pub error_code: i64,
    /// Highest severity seen.
    pub error_level: i32,
}

impl FailureState {
    /// Records a failure, keeping the worse of the current and new severity.
    pub fn record(&mut self, code: i64, severity: i32) {
        self.error_code = code;
        self.error_level = self.error_level.max(severity);
    }

    pub fn has_failed(&self) -> bool {
        self.error_level > 0
    }
}

/// The decision taken by the first call to [`ExitController::fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitDecision {
    /// Code the decision was made for (error code or severity).
    pub code: i64,
    /// Status the process should exit with.
    pub exit_code: i32,
}

/// Owns the failure state and makes the exit decision exactly once.
#[derive(Debug, Default)]
pub struct ExitController {
    state: FailureState,
    decision: OnceLock<ExitDecision>,
}

impl ExitController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FailureState {
        self.state
    }

    pub fn record(&mut self, code: i64, severity: i32) {
        self.state.record(code, severity);
    }

    /// Decides the exit status.
    ///
    /// `None` and `Some(0)` fall back to the worst severity seen. Returns the
    /// decision on the first call and `None` on every later call.
    pub fn fail(&self, code: Option<i64>) -> Option<ExitDecision> {
        let code = match code {
            Some(code) if code != 0 => code,
            _ => i64::from(self.state.error_level),
        };
        let decision = ExitDecision {
            code,
            exit_code: normalize_exit_code(code),
        };
        self.decide(decision)
    }

    /// Decides the distinguished configuration-failure status.
    pub fn abort_config(&self) -> Option<ExitDecision> {
        self.decide(ExitDecision {
            code: i64::from(CONFIG_FAILURE_EXIT_CODE),
            exit_code: CONFIG_FAILURE_EXIT_CODE,
        })
    }

    fn decide(&self, decision: ExitDecision) -> Option<ExitDecision> {
        if self.decision.set(decision).is_err() {
            warn!("Exit already decided; ignoring failure code {}", decision.code);
            return None;
        }
        info!("Error Code {}", decision.code);
        Some(decision)
    }

    pub fn decision(&self) -> Option<ExitDecision> {
        self.decision.get().copied()
    }

    pub fn is_decided(&self) -> bool {
        self.decision.get().is_some()
    }

    /// Status for the process: the decision if one was taken, else what a
    /// clean shutdown would decide now.
    pub fn exit_code(&self) -> i32 {
        match self.decision.get() {
            Some(decision) => decision.exit_code,
            None => normalize_exit_code(i64::from(self.state.error_level)),
        }
    }
}

/// `0` stays `0`; every other code becomes [`EXIT_FAILURE`].
pub fn normalize_exit_code(code: i64) -> i32 {
    if code == 0 {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_never_reports_success_for_failures() {
        for code in [1, 4, 8, 255, 256, 512, 1024, 2003, 100_183, -1, i64::MAX] {
            assert_eq!(normalize_exit_code(code), EXIT_FAILURE, "code {code}");
        }
        assert_eq!(normalize_exit_code(0), EXIT_SUCCESS);
    }

    #[test]
    fn test_fail_is_one_shot() {
        let controller = ExitController::new();
        let first = controller.fail(Some(2003)).unwrap();
        assert_eq!(first.code, 2003);
        assert_eq!(first.exit_code, EXIT_FAILURE);

        assert!(controller.fail(Some(0)).is_none());
        assert!(controller.fail(None).is_none());
        assert!(controller.abort_config().is_none());
        assert_eq!(controller.decision(), Some(first));
    }

    #[test]
    fn test_fail_without_code_uses_worst_severity() {
        let mut controller = ExitController::new();
        controller.record(2003, 0);
        controller.record(100_183, 8);
        controller.record(2043, 4);
        assert_eq!(controller.state().error_level, 8);
        assert_eq!(controller.state().error_code, 2043);

        let decision = controller.fail(None).unwrap();
        assert_eq!(decision.code, 8);
        assert_eq!(decision.exit_code, EXIT_FAILURE);
    }

    #[test]
    fn test_clean_run_exits_zero() {
        let controller = ExitController::new();
        assert_eq!(controller.exit_code(), EXIT_SUCCESS);
        let decision = controller.fail(Some(0)).unwrap();
        assert_eq!(decision.exit_code, EXIT_SUCCESS);
    }

    #[test]
    fn test_tolerated_failures_do_not_fail_the_run() {
        let mut controller = ExitController::new();
        controller.record(2003, 0);
        assert!(!controller.state().has_failed());
        assert_eq!(controller.exit_code(), EXIT_SUCCESS);
    }

    #[test]
    fn test_abort_config() {
        let controller = ExitController::new();
        let decision = controller.abort_config().unwrap();
        assert_eq!(decision.exit_code, CONFIG_FAILURE_EXIT_CODE);
        assert!(controller.fail(Some(1)).is_none());
        assert_eq!(controller.exit_code(), CONFIG_FAILURE_EXIT_CODE);
    }
}
