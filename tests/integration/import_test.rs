//! Import-driven parameterized execution.

use super::common::{read_lines, write_sqlite_logon};
use pretty_assertions::assert_eq;
use sqlbatch::job::Job;
use sqlbatch::query::ExecuteOptions;
use sqlbatch::runtime::import::{parse_schema, ImportOutcome};
use std::fs;

#[tokio::test]
async fn test_insert_each_imported_row() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("finder.txt");
    let export = dir.path().join("out.txt");
    fs::write(&input, "101|2024-01-31|alpha\n102|2024-02-29|beta\n103||gamma\n").unwrap();

    let mut job = Job::new("IMPORT_TEST");
    job.log_on_with(&write_sqlite_logon(dir.path())).await.unwrap();
    job.execute("CREATE TABLE finder (id INTEGER, run_dt TEXT, name TEXT)")
        .await
        .unwrap();

    job.import_from(input.to_str().unwrap(), "|").unwrap();
    let schema = parse_schema(&["id", "run_dt", "name"], &["DECIMAL(10)", "VARCHAR(10)", "VARCHAR(20)"]);

    let mut inserted = 0;
    loop {
        let row = match job.read_import_row(&schema).unwrap() {
            ImportOutcome::Row(row) => row,
            ImportOutcome::Exhausted => break,
        };
        let options = ExecuteOptions::new().using(row);
        job.execute_with("INSERT INTO finder VALUES ({id}, {run_dt}, {name})", &options)
            .await
            .unwrap();
        inserted += 1;
    }
    assert_eq!(inserted, 3);
    assert!(job.context().import.no_more_rows());

    job.export_to(export.to_str().unwrap(), ",");
    job.execute("SELECT id, run_dt, name FROM finder ORDER BY id")
        .await
        .unwrap();

    assert_eq!(
        read_lines(&export),
        vec!["101,2024-01-31,alpha", "102,2024-02-29,beta", "103,,gamma"]
    );
    assert_eq!(job.finish(Ok(())).await, 0);
}

#[tokio::test]
async fn test_empty_import_file_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.txt");
    fs::write(&input, "").unwrap();

    let mut job = Job::new("IMPORT_TEST");
    job.import_from(input.to_str().unwrap(), " ").unwrap();
    let schema = parse_schema(&["id"], &["DECIMAL(10)"]);

    assert!(job.read_import_row(&schema).unwrap().is_exhausted());
    job.import_reset();
    assert!(!job.context().import.is_configured());
    assert_eq!(job.finish(Ok(())).await, 0);
}
