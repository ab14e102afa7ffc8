//! Job runs against PostgreSQL.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL (and PGPASSWORD if needed) to run them.

use pretty_assertions::assert_eq;
use sqlbatch::config::LogonConfig;
use sqlbatch::db::{sqlstate_code, DatabaseBackend, PostgresWarehouse, Value};
use sqlbatch::job::Job;
use sqlbatch::query::ExecuteOptions;
use sqlbatch::runtime::params::using;
use sqlx::postgres::PgConnectOptions;

/// Helper to build a logon config from DATABASE_URL.
fn get_test_logon() -> Option<LogonConfig> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let options: PgConnectOptions = url.parse().ok()?;
    Some(LogonConfig {
        account: format!("{}:{}", options.get_host(), options.get_port()),
        user: options.get_username().to_string(),
        password: std::env::var("PGPASSWORD").unwrap_or_default(),
        database: options.get_database().unwrap_or("postgres").to_string(),
        warehouse: "test".to_string(),
        login_timeout: 10,
        backend: DatabaseBackend::Postgres,
    })
}

/// Helper to create a job with an open PostgreSQL session.
async fn get_test_job() -> Option<Job> {
    let logon = get_test_logon()?;
    let client = PostgresWarehouse::connect(&logon, "sqlbatch_integration").await.ok()?;
    let mut job = Job::new("sqlbatch_integration");
    job.attach(Box::new(client));
    Some(job)
}

#[tokio::test]
async fn test_bound_parameters_reuse_placeholders() {
    let Some(mut job) = get_test_job().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let options = ExecuteOptions::new().using(using([("n", Value::Int(21))]));
    let outcome = job
        .execute_with("SELECT {n}::bigint + {n}::bigint AS total", &options)
        .await
        .unwrap();
    assert_eq!(outcome.activity_count, 1);
    assert!(outcome.query_id.is_some());
    assert_eq!(job.finish(Ok(())).await, 0);
}

#[tokio::test]
async fn test_undefined_table_is_classified_by_sqlstate() {
    let Some(mut job) = get_test_job().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let undefined_table = sqlstate_code("42P01");
    job.set_error_level(undefined_table, 0);

    let options = ExecuteOptions::new().continue_on_error();
    let outcome = job
        .execute_with("DROP TABLE sqlbatch_does_not_exist", &options)
        .await
        .unwrap();
    assert_eq!(outcome.error.unwrap().code, undefined_table);
    assert_eq!(job.finish(Ok(())).await, 0);
}
