//! Bulk-load helpers built from plain statements.
//!
//! The warehouse moves the data; these only issue the statement text.

use std::path::Path;

use tracing::info;

use super::executor::{ExecuteOptions, ExecutionOutcome, StatementExecutor};
use crate::error::Result;
use crate::runtime::expand::expand_path;

/// Loads a staged CSV file (header line skipped) into a temporary table.
pub async fn import_data_to_temptable(
    executor: &mut StatementExecutor<'_>,
    temp_table: &str,
    source: &str,
) -> Result<ExecutionOutcome> {
    let sql = copy_into_sql(temp_table, source);
    executor.execute(&sql, &ExecuteOptions::default()).await
}

pub async fn drop_transient_table(
    executor: &mut StatementExecutor<'_>,
    table: &str,
) -> Result<ExecutionOutcome> {
    executor
        .execute(&format!("DROP TABLE {table}"), &ExecuteOptions::default())
        .await
}

/// Replaces `schema.table` with the distinct rows of a local file.
///
/// Uploads the file to `stage`, copies it into the table, rebuilds the table
/// without duplicates through `CTE_<table>`, and renames it back. Every
/// argument has environment variables expanded first.
pub async fn simple_fast_load(
    executor: &mut StatementExecutor<'_>,
    target_schema: &str,
    file_path: &str,
    stage: &str,
    table: &str,
) -> Result<()> {
    let statements = fast_load_statements(
        &expand_path(target_schema),
        &expand_path(file_path),
        &expand_path(stage),
        &expand_path(table),
    );

    for (step, sql) in statements.iter().enumerate() {
        info!(">>> Fast load step {} of {}", step + 1, statements.len());
        executor.execute(sql, &ExecuteOptions::default()).await?;
    }
    Ok(())
}

fn copy_into_sql(table: &str, source: &str) -> String {
    format!(
        "COPY INTO {table} FROM {source} FILE_FORMAT = ( TYPE=CSV SKIP_HEADER = 1 ) ON_ERROR = CONTINUE"
    )
}

fn fast_load_statements(schema: &str, file_path: &str, stage: &str, table: &str) -> Vec<String> {
    let file_name = Path::new(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    vec![
        format!("USE SCHEMA {schema}"),
        format!("PUT file://{file_path} @{stage} OVERWRITE = TRUE"),
        copy_into_sql(&format!("{schema}.{table}"), &format!("@{stage}/{file_name}")),
        format!("CREATE TABLE {schema}.CTE_{table} AS SELECT DISTINCT * FROM {schema}.{table}"),
        format!("DROP TABLE {schema}.{table}"),
        format!("ALTER TABLE {schema}.CTE_{table} RENAME TO {schema}.{table}"),
    ]
}
