use anyhow::Result;
use charityhub_db::Database;
use std::backtrace::BacktraceStatus;
use std::process::ExitCode;
use tracing::error;

use crate::config::Config;
use crate::{audit, fix, report};

pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charityhub_reconcile=info,charityhub_db=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point shared by both binaries: load `.env`, set up logging and
/// config, run `command`, print its output. Exit 1 on any error.
pub fn main_with<F>(command: F) -> ExitCode
where
    F: FnOnce(&Config) -> Result<String>,
{
    let _ = dotenvy::dotenv();
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match command(&config) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e, config.trace_lines);
            ExitCode::FAILURE
        }
    }
}

pub fn audit_command(config: &Config) -> Result<String> {
    let db = Database::open_read_only(&config.db_path, config.busy_timeout)?;
    let audit_report = audit::run_audit(&db)?;
    report::render(&audit_report, config.format)
}

pub fn fix_command(config: &Config) -> Result<String> {
    let db = Database::open(&config.db_path, config.busy_timeout)?;
    let fix_report = fix::run_fix(&db)?;
    report::render(&fix_report, config.format)
}

fn report_failure(err: &anyhow::Error, trace_lines: usize) {
    error!("{:#}", err);
    eprintln!("ERROR: {:#}", err);
    if let Some(trace) = truncated_backtrace(err, trace_lines) {
        eprintln!("{}", trace);
    }
}

/// First `lines` lines of the error's backtrace, if one was captured
/// (set `RUST_BACKTRACE=1`).
fn truncated_backtrace(err: &anyhow::Error, lines: usize) -> Option<String> {
    let backtrace = err.backtrace();
    if backtrace.status() != BacktraceStatus::Captured || lines == 0 {
        return None;
    }

    let full = backtrace.to_string();
    let total = full.lines().count();
    let mut out: Vec<String> = full.lines().take(lines).map(str::to_string).collect();
    if total > lines {
        out.push(format!("  ... {} more line(s)", total - lines));
    }
    Some(out.join("\n"))
}
