//! Shared helpers for integration tests.

use std::fs;
use std::path::{Path, PathBuf};

/// Writes a logon file pointing at a SQLite database in `dir`.
pub fn write_sqlite_logon(dir: &Path) -> PathBuf {
    let database = dir.join("warehouse.db");
    let logon = serde_json::json!({
        "SNOW_ACCOUNT": "localhost",
        "SNOW_USER": "xtr_batch",
        "SNOW_PASSWORD": "not-a-secret",
        "SNOW_DATABASE": database.to_string_lossy(),
        "SNOW_WAREHOUSE": "XTR_WH",
        "SNOW_TIMEOUT": 5,
        "SNOW_BACKEND": "sqlite"
    });
    let path = dir.join("sf.logon");
    fs::write(&path, logon.to_string()).unwrap();
    path
}

/// Lines of a text file.
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}
