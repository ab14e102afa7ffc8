//! End-to-end job runs against a SQLite warehouse.

use super::common::{read_lines, write_sqlite_logon};
use pretty_assertions::assert_eq;
use sqlbatch::error::BatchError;
use sqlbatch::job::Job;
use sqlbatch::query::ExecuteOptions;
use sqlbatch::runtime::exit::{CONFIG_FAILURE_EXIT_CODE, EXIT_FAILURE, EXIT_SUCCESS};
use sqlbatch::runtime::params::using;
use std::collections::HashMap;
use std::path::Path;
use tokio_test::{assert_err, assert_ok};

// SQLITE_ERROR, returned for missing tables among others.
const SQLITE_ERROR: i64 = 1;

async fn logged_on_job(dir: &Path, variables: HashMap<String, String>) -> Job {
    let logon = write_sqlite_logon(dir);
    let mut job = Job::with_variables("JOB_TEST", variables);
    job.log_on_with(&logon).await.unwrap();
    job
}

#[tokio::test]
async fn test_tolerated_error_then_continue() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = logged_on_job(dir.path(), HashMap::new()).await;
    job.set_error_level(SQLITE_ERROR, 0);

    let options = ExecuteOptions::new().continue_on_error();
    let outcome = job
        .execute_with("DROP TABLE missing_tmp", &options)
        .await
        .unwrap();
    let failure = outcome.error.unwrap();
    assert_eq!(failure.code, SQLITE_ERROR);
    assert_eq!(failure.severity, 0);
    assert_eq!(job.context().failure_state().error_level, 0);

    assert_ok!(job.execute("CREATE TABLE t (id INTEGER)").await);
    let outcome = assert_ok!(job.execute("INSERT INTO t VALUES (1), (2)").await);
    assert_eq!(outcome.activity_count, 2);

    assert_eq!(job.finish(Ok(())).await, EXIT_SUCCESS);
}

#[tokio::test]
async fn test_halt_on_unregistered_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = logged_on_job(dir.path(), HashMap::new()).await;

    let result = job.execute("SELECT * FROM missing_table").await.map(|_| ());
    assert!(matches!(result, Err(BatchError::Halt { code: SQLITE_ERROR })));
    assert_eq!(job.finish(result).await, EXIT_FAILURE);
}

#[tokio::test]
async fn test_export_with_variables_and_binding() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("reports/claims.txt");
    let variables = HashMap::from([("YR".to_string(), "2024".to_string())]);
    let mut job = logged_on_job(dir.path(), variables).await;

    job.execute("CREATE TABLE claims (carrier TEXT, hcpcs TEXT, yr TEXT)")
        .await
        .unwrap();
    job.execute(
        "INSERT INTO claims VALUES ('00510', 'G0008', '2024'), (NULL, NULL, '2024'), ('00511', NULL, '2023')",
    )
    .await
    .unwrap();

    job.export_to(export.to_str().unwrap(), "|");
    job.execute("SELECT carrier, hcpcs FROM claims WHERE yr = '{YR}' ORDER BY carrier")
        .await
        .unwrap();

    let options = ExecuteOptions::new().using(using([("yr", "2023")]));
    job.execute_with("SELECT carrier, hcpcs FROM claims WHERE yr = {yr}", &options)
        .await
        .unwrap();
    job.export_reset();

    assert_eq!(read_lines(&export), vec!["00510|G0008", "00511|"]);
    assert_eq!(job.finish(Ok(())).await, EXIT_SUCCESS);
}

#[tokio::test]
async fn test_empty_select_after_insert_creates_export_file() {
    let dir = tempfile::tempdir().unwrap();
    let export = dir.path().join("out/empty.txt");
    let mut job = logged_on_job(dir.path(), HashMap::new()).await;

    job.execute("CREATE TABLE t (a INTEGER)").await.unwrap();
    let inserted = job.execute("INSERT INTO t VALUES (1), (2)").await.unwrap();
    assert_eq!(inserted.activity_count, 2);

    job.export_to(export.to_str().unwrap(), " ");
    let outcome = job.execute("SELECT a FROM t WHERE 1 = 0").await.unwrap();
    assert_eq!(outcome.activity_count, 0);
    assert_eq!(job.context().activity_count, 0);
    assert!(export.exists());
    assert!(read_lines(&export).is_empty());

    let ddl = job.execute("CREATE TABLE u (b TEXT)").await.unwrap();
    assert_eq!(ddl.activity_count, 0);
    assert_eq!(job.finish(Ok(())).await, EXIT_SUCCESS);
}

#[tokio::test]
async fn test_warehouse_variable_from_logon() {
    let dir = tempfile::tempdir().unwrap();
    let job = logged_on_job(dir.path(), HashMap::new()).await;
    assert_eq!(job.context().variable("SNOW_WAREHOUSE"), Some("XTR_WH"));
    job.finish(Ok(())).await;
}

#[tokio::test]
async fn test_repeat_previous_statement() {
    let dir = tempfile::tempdir().unwrap();
    let mut job = logged_on_job(dir.path(), HashMap::new()).await;

    job.execute("CREATE TABLE counter (n INTEGER)").await.unwrap();
    job.execute("INSERT INTO counter VALUES (1)").await.unwrap();
    job.repeat_previous(2).await.unwrap();

    let outcome = job.execute("SELECT n FROM counter").await.unwrap();
    assert_eq!(outcome.activity_count, 3);
    assert_eq!(job.context().activity_count, 3);
    job.finish(Ok(())).await;
}

#[tokio::test]
async fn test_malformed_logon_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let logon = dir.path().join("sf.logon");
    std::fs::write(&logon, "{ not json").unwrap();

    let mut job = Job::new("JOB_TEST");
    let result = job.log_on_with(&logon).await;
    let err = assert_err!(result.as_ref());
    assert!(matches!(err, BatchError::Config(_)));
    assert_eq!(job.finish(result).await, CONFIG_FAILURE_EXIT_CODE);
}
