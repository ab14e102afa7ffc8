//! sqlbatch - run a SQL script with BTEQ-style failure handling.

use sqlbatch::cli::Cli;
use sqlbatch::error::Result;
use sqlbatch::job::{catch_panic, Job};
use sqlbatch::query::ExecuteOptions;
use sqlbatch::{logging, script};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();
    let script_name = cli.script_name();

    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| logging::job_log_path(&script_name));
    match logging::init_job_logging(&log_path) {
        Ok(()) => info!("Logging to {}", log_path.display()),
        Err(e) => {
            logging::init_console_logging();
            warn!("{}: {}", e.category(), e);
        }
    }

    let mut job = Job::with_variables(script_name, cli.params.clone());
    let result = catch_panic(run(&mut job, &cli)).await;
    let code = job.finish(result).await;
    std::process::exit(code);
}

async fn run(job: &mut Job, cli: &Cli) -> Result<()> {
    job.context_mut().strict_expansion = cli.strict;
    if let Some(severity) = cli.default_error_level {
        job.set_default_error_level(severity);
    }
    for level in &cli.error_levels {
        job.set_error_levels(level.codes.iter().copied(), level.severity);
    }

    match &cli.logon {
        Some(path) => job.log_on_with(path).await?,
        None => job.log_on().await?,
    }

    if let Some(path) = &cli.export {
        job.export_to(path, &cli.separator);
    }

    let mut options = ExecuteOptions::new();
    if let Some(tag) = &cli.tag {
        options = options.query_tag(tag);
    }
    if cli.continue_on_error {
        options = options.continue_on_error();
    }

    script::run_script(job, &cli.script, &options).await
}
