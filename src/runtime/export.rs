//! Result-set output: console printing or appending to an export file.
//!
//! The export target is a process-wide mode, as in the legacy `.EXPORT
//! REPORT FILE=...` command: once configured, every row-producing statement
//! appends to it until `reset()`.

use super::expand::expand_path;
use crate::db::{Row, StatementResult};
use crate::error::{BatchError, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_SEPARATOR: &str = " ";

/// Where exported rows go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub path: PathBuf,
    pub separator: String,
}

/// Routes result sets to stdout or to the configured export file.
#[derive(Debug, Default)]
pub struct ResultStreamer {
    target: Option<ExportTarget>,
}

impl ResultStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends subsequent result sets to `path`; environment variables in the
    /// path are expanded now.
    pub fn configure(&mut self, path: &str, separator: &str) {
        let path = PathBuf::from(expand_path(path));
        info!("Export target set to {}", path.display());
        self.target = Some(ExportTarget {
            path,
            separator: separator.to_string(),
        });
    }

    /// Goes back to printing result sets.
    pub fn reset(&mut self) {
        self.target = None;
    }

    pub fn target(&self) -> Option<&ExportTarget> {
        self.target.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    /// Prints the result set, or appends it to the export file.
    ///
    /// Returns the number of lines written (rows printed when on the console).
    pub fn stream(&self, result: &StatementResult) -> Result<usize> {
        match &self.target {
            Some(target) => append_rows(target, &result.rows),
            None => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                print_result_set(result, &mut out)?;
                Ok(result.rows.len())
            }
        }
    }
}

/// Console format: a title, a comma-joined header, comma-joined rows and a
/// blank line.
pub fn print_result_set<W: Write>(result: &StatementResult, out: &mut W) -> io::Result<()> {
    writeln!(out, "Printing Result Set:")?;
    let header: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    writeln!(out, "{}", header.join(","))?;
    for row in &result.rows {
        let fields: Vec<String> = row.iter().map(|v| v.to_display_string()).collect();
        writeln!(out, "{}", fields.join(","))?;
    }
    writeln!(out)
}

/// Joins a row for export; `None` when every field is NULL or empty.
pub fn format_export_row(row: &Row, separator: &str) -> Option<String> {
    if row.iter().all(|v| v.is_blank()) {
        return None;
    }
    let fields: Vec<String> = row.iter().map(|v| v.to_export_string()).collect();
    Some(fields.join(separator))
}

/// Appends rows to the target file, creating its directory if needed.
pub fn append_rows(target: &ExportTarget, rows: &[Row]) -> Result<usize> {
    info!(">>>>>> Exporting to {}", target.path.display());
    ensure_parent_dir(&target.path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&target.path)
        .map_err(|e| {
            BatchError::io(format!("Cannot open {}: {e}", target.path.display()))
        })?;
    let mut writer = BufWriter::new(file);

    let mut written = 0;
    for row in rows {
        match format_export_row(row, &target.separator) {
            Some(line) => {
                writeln!(writer, "{line}")?;
                written += 1;
            }
            None => debug!("Row is all NULL; it will not be exported"),
        }
    }
    writer.flush()?;

    Ok(written)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|e| {
            BatchError::io(format!("Cannot create directory {}: {e}", dir.display()))
        }),
        _ => Ok(()),
    }
}
