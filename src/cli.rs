//! Command-line argument parsing for sqlbatch.
//!
//! Uses clap for the fixed options. `--param-NAME=VALUE` arguments are open
//! ended, so they are taken out before clap sees the rest.

use crate::runtime::export::DEFAULT_SEPARATOR;
use crate::runtime::params::{is_param_arg, read_param_args};
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Runs a SQL script against the warehouse with BTEQ-style failure handling.
#[derive(Parser, Debug)]
#[command(name = "sqlbatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQL script to run; statements are separated by `;`
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Logon file (defaults to the deployment location)
    #[arg(long, value_name = "PATH", env = "SQLBATCH_LOGON_FILE")]
    pub logon: Option<PathBuf>,

    /// Log file (defaults to <log dir>/<script>_SF.<timestamp>.log)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Append result sets to this file instead of printing them
    #[arg(long, value_name = "PATH")]
    pub export: Option<String>,

    /// Field separator for --export
    #[arg(long, value_name = "SEP", default_value = DEFAULT_SEPARATOR)]
    pub separator: String,

    /// Record failed statements and keep going
    #[arg(long)]
    pub continue_on_error: bool,

    /// Query tag for every statement (defaults to the script name)
    #[arg(long, value_name = "TAG")]
    pub tag: Option<String>,

    /// Warn about variables that did not resolve
    #[arg(long)]
    pub strict: bool,

    /// Severity for warehouse error codes, e.g. `2003,2043=0` to tolerate
    /// both codes (repeatable)
    #[arg(long = "error-level", value_name = "CODES=SEVERITY", value_parser = parse_error_level)]
    pub error_levels: Vec<ErrorLevel>,

    /// Severity for codes without an --error-level entry
    #[arg(long, value_name = "SEVERITY")]
    pub default_error_level: Option<i32>,

    /// Job variables from `--param-NAME=VALUE`
    #[arg(skip)]
    pub params: HashMap<String, String>,
}

/// One `--error-level` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLevel {
    pub codes: Vec<i64>,
    pub severity: i32,
}

fn parse_error_level(s: &str) -> Result<ErrorLevel, String> {
    let (codes, severity) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CODES=SEVERITY, got '{s}'"))?;
    let severity = severity
        .trim()
        .parse()
        .map_err(|e| format!("invalid severity '{severity}': {e}"))?;
    let codes = codes
        .split(',')
        .map(|code| {
            code.trim()
                .parse()
                .map_err(|e| format!("invalid error code '{code}': {e}"))
        })
        .collect::<Result<Vec<i64>, String>>()?;
    Ok(ErrorLevel { codes, severity })
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse_from_args(std::env::args())
    }

    /// Parses the given arguments; the first one is the program name.
    pub fn parse_from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let params = read_param_args(&args);
        let mut cli = Self::parse_from(args.into_iter().filter(|a| !is_param_arg(a)));
        cli.params = params;
        cli
    }

    /// Base name of the script, used for the job name and the log file.
    pub fn script_name(&self) -> String {
        Path::new(&self.script)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sqlbatch".to_string())
    }
}
