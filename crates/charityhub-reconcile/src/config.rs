use std::path::PathBuf;
use std::time::Duration;

use crate::report::ReportFormat;

const DEFAULT_DB_PATH: &str = "charityhub.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_TRACE_LINES: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub format: ReportFormat,
    pub busy_timeout: Duration,
    /// Backtrace lines printed when a run fails.
    pub trace_lines: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path: PathBuf = lookup("CHARITYHUB_DB_PATH")
            .unwrap_or_else(|| DEFAULT_DB_PATH.into())
            .into();

        let format = match lookup("CHARITYHUB_REPORT_FORMAT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var: "CHARITYHUB_REPORT_FORMAT",
                expected: "'text' or 'json'",
                value,
            })?,
            None => ReportFormat::Text,
        };

        let busy_timeout_ms = parse_number(&lookup, "CHARITYHUB_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?;
        let trace_lines = parse_number(&lookup, "CHARITYHUB_TRACE_LINES", DEFAULT_TRACE_LINES as u64)?;

        Ok(Self {
            db_path,
            format,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            trace_lines: trace_lines as usize,
        })
    }
}

fn parse_number<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected: "a non-negative integer",
            value,
        }),
        None => Ok(default),
    }
}
