//! Operating-system commands run from a job.

use crate::error::{BatchError, Result};
use crate::runtime::RuntimeContext;
use tokio::process::Command;
use tracing::info;

/// Runs `command` through `sh -c` and records its exit status in the
/// context. A command killed by a signal records `-1`.
pub async fn os(ctx: &mut RuntimeContext, command: &str) -> Result<i32> {
    info!("Running OS command: {command}");
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .await
        .map_err(|e| BatchError::io(format!("Cannot run {command:?}: {e}")))?;

    let code = status.code().unwrap_or(-1);
    ctx.system_return_code = code;
    info!("OS command returned {code}");
    Ok(code)
}

/// Runs `command` and returns its stdout and stderr, trailing newline
/// removed.
pub async fn exec_os(command: &str) -> Result<String> {
    info!("executing os command: {command}");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .map_err(|e| BatchError::io(format!("Cannot run {command:?}: {e}")))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}
