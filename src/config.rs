//! Configuration management for sqlbatch.
//!
//! Handles the JSON logon (credential) file and the deployment path
//! conventions used to locate it and the per-run log file.

use crate::db::DatabaseBackend;
use crate::error::{BatchError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Overrides the logon file location.
pub const LOGON_FILE_ENV: &str = "SQLBATCH_LOGON_FILE";

/// Overrides the log directory.
pub const LOG_DIR_ENV: &str = "SQLBATCH_LOG_DIR";

/// Root of the deployment tree.
pub const ROOT_ENV: &str = "IDRC_ROOT";

/// Names the deployment stream (XTR, BIA, ...).
pub const STREAM_ENV: &str = "IDRC_STREAM";

const DEFAULT_ROOT: &str = "/app/IDRC";
const DEFAULT_STREAM: &str = "XTR";
const LOGON_FILE_NAME: &str = "sf.logon";

/// Warehouse credentials and session settings, read from the logon file.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogonConfig {
    /// Warehouse endpoint, `host` or `host:port`.
    #[serde(rename = "SNOW_ACCOUNT")]
    pub account: String,

    #[serde(rename = "SNOW_USER")]
    pub user: String,

    /// Never logged.
    #[serde(rename = "SNOW_PASSWORD")]
    pub password: String,

    #[serde(rename = "SNOW_DATABASE")]
    pub database: String,

    /// Compute warehouse name, exposed to statements as `${SNOW_WAREHOUSE}`.
    #[serde(rename = "SNOW_WAREHOUSE")]
    pub warehouse: String,

    /// Login timeout in seconds, passed straight to the client.
    #[serde(rename = "SNOW_TIMEOUT", default = "default_timeout")]
    pub login_timeout: u64,

    #[serde(rename = "SNOW_BACKEND", default)]
    pub backend: DatabaseBackend,
}

fn default_timeout() -> u64 {
    60
}

impl LogonConfig {
    /// Loads and parses the logon file.
    ///
    /// Any failure here is a configuration error: the job must stop before
    /// attempting to connect.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BatchError::config(format!(
                "Error encountered opening the logon file {}: {e}",
                path.display()
            ))
        })?;

        Self::parse_json(&content, path)
    }

    fn parse_json(content: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            BatchError::config(format!(
                "Malformed logon file {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Splits the account into host and optional port.
    pub fn host_and_port(&self) -> (&str, Option<u16>) {
        match self.account.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host, Some(port)),
                Err(_) => (self.account.as_str(), None),
            },
            None => (self.account.as_str(), None),
        }
    }

    /// Returns a display-safe string (no password) for log output.
    pub fn display_string(&self) -> String {
        format!(
            "{}@{} / {} (warehouse {})",
            self.user, self.account, self.database, self.warehouse
        )
    }
}

impl fmt::Debug for LogonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogonConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("warehouse", &self.warehouse)
            .field("login_timeout", &self.login_timeout)
            .field("backend", &self.backend)
            .finish()
    }
}

/// Deployment layout: `<root>/<stream>/CMS/{scripts/logon,logs}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub root: PathBuf,
    pub stream: String,
}

impl RuntimePaths {
    /// Resolves the layout from the environment and the running executable.
    pub fn from_env() -> Self {
        let root = std::env::var(ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROOT));

        let stream = std::env::var(STREAM_ENV)
            .ok()
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| stream_from_path(&exe))
            })
            .unwrap_or_else(|| DEFAULT_STREAM.to_string());

        Self { root, stream }
    }

    fn cms_dir(&self) -> PathBuf {
        self.root.join(&self.stream).join("CMS")
    }

    /// Logon file location; `SQLBATCH_LOGON_FILE` wins when set.
    pub fn logon_file(&self) -> PathBuf {
        match std::env::var(LOGON_FILE_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => self.cms_dir().join("scripts").join("logon").join(LOGON_FILE_NAME),
        }
    }

    /// Log directory; `SQLBATCH_LOG_DIR` wins when set.
    pub fn log_dir(&self) -> PathBuf {
        match std::env::var(LOG_DIR_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => self.cms_dir().join("logs"),
        }
    }

    /// Per-run log file for the given script.
    pub fn log_file(&self, script_name: &str, now: DateTime<Local>) -> PathBuf {
        self.log_dir().join(log_file_name(script_name, now))
    }
}

/// Builds `<script base name>_SF.<YYYYmmdd_HHMMSS>.log`.
pub fn log_file_name(script_name: &str, now: DateTime<Local>) -> String {
    let base = Path::new(script_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(script_name);
    format!("{base}_SF.{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Returns the path component right after `IDRC`, e.g. `XTR` for
/// `/app/IDRC/XTR/CMS/scripts/job`.
pub fn stream_from_path(path: &Path) -> Option<String> {
    let mut components = path.components().filter_map(|c| match c {
        Component::Normal(s) => s.to_str(),
        _ => None,
    });
    components.find(|c| *c == "IDRC")?;
    components.next().map(String::from)
}
