//! Script files run through a job.

use super::common::{read_lines, write_sqlite_logon};
use pretty_assertions::assert_eq;
use sqlbatch::error::BatchError;
use sqlbatch::job::Job;
use sqlbatch::query::ExecuteOptions;
use sqlbatch::runtime::exit::{EXIT_FAILURE, EXIT_SUCCESS};
use sqlbatch::script::run_script;
use std::collections::HashMap;
use std::fs;

const SCRIPT: &str = "\
-- nightly extract; step 1
CREATE TABLE ext (code TEXT, descr TEXT);
INSERT INTO ext VALUES ('A1', 'first; with semicolon'), ('B2', NULL);
SELECT code, descr FROM ext WHERE code LIKE '{PREFIX}%' OR descr IS NULL ORDER BY code;
";

#[tokio::test]
async fn test_run_script_exports_rows() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("nightly.sql");
    let export = dir.path().join("nightly.txt");
    fs::write(&script, SCRIPT).unwrap();

    let variables = HashMap::from([("PREFIX".to_string(), "A".to_string())]);
    let mut job = Job::with_variables("nightly", variables);
    job.log_on_with(&write_sqlite_logon(dir.path())).await.unwrap();
    job.export_to(export.to_str().unwrap(), "\t");

    let result = run_script(&mut job, &script, &ExecuteOptions::default()).await;
    assert!(result.is_ok());
    assert_eq!(
        read_lines(&export),
        vec!["A1\tfirst; with semicolon", "B2\t"]
    );
    assert_eq!(job.finish(result).await, EXIT_SUCCESS);
}

#[tokio::test]
async fn test_run_script_stops_at_failure() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("broken.sql");
    fs::write(
        &script,
        "CREATE TABLE a (x INTEGER); SELECT * FROM nope; INSERT INTO a VALUES (1);",
    )
    .unwrap();

    let mut job = Job::new("broken");
    job.log_on_with(&write_sqlite_logon(dir.path())).await.unwrap();

    let result = run_script(&mut job, &script, &ExecuteOptions::default()).await;
    assert!(matches!(result, Err(BatchError::Halt { .. })));
    assert_eq!(job.finish(result).await, EXIT_FAILURE);
}

#[tokio::test]
async fn test_run_script_continue_on_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("broken.sql");
    fs::write(
        &script,
        "CREATE TABLE a (x INTEGER); SELECT * FROM nope; INSERT INTO a VALUES (1);",
    )
    .unwrap();

    let mut job = Job::new("broken");
    job.log_on_with(&write_sqlite_logon(dir.path())).await.unwrap();

    let options = ExecuteOptions::new().continue_on_error();
    let result = run_script(&mut job, &script, &options).await;
    assert!(result.is_ok());
    assert_eq!(job.context().activity_count, 1);
    assert_eq!(job.context().failure_state().error_level, 8);
    assert_eq!(job.finish(result).await, EXIT_FAILURE);
}

#[tokio::test]
async fn test_missing_script_is_unhandled_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = Job::new("missing");
    job.log_on_with(&write_sqlite_logon(dir.path())).await.unwrap();

    let result = run_script(&mut job, &dir.path().join("nope.sql"), &ExecuteOptions::default()).await;
    assert!(matches!(result, Err(BatchError::Io(_))));
    assert_eq!(job.finish(result).await, EXIT_FAILURE);
}
