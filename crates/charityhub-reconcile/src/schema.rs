use anyhow::Result;
use charityhub_db::queries;
use charityhub_db::models::StatusCount;
use charityhub_types::{DonationStatus, RefundStatus};
use rusqlite::Connection;
use std::fmt;
use std::str::FromStr;

/// Columns the reconciler reads or writes, per table.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "donations",
        &[
            "id",
            "donor_id",
            "campaign_id",
            "charity_id",
            "amount",
            "status",
            "is_refunded",
            "refunded_at",
        ],
    ),
    ("refund_requests", &["id", "donation_id", "user_id", "status", "reviewed_at"]),
    ("campaigns", &["id", "charity_id", "total_donations_received", "donors_count"]),
    ("charities", &["id", "total_donations_received", "donors_count"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaGap {
    Table(&'static str),
    Column { table: &'static str, column: &'static str },
}

impl fmt::Display for SchemaGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(table) => write!(f, "table '{}' is missing", table),
            Self::Column { table, column } => write!(f, "column '{}.{}' is missing", table, column),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("schema precondition failed: {}", join_gaps(.gaps))]
pub struct SchemaError {
    pub gaps: Vec<SchemaGap>,
}

fn join_gaps(gaps: &[SchemaGap]) -> String {
    gaps.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

pub fn schema_gaps(conn: &Connection) -> Result<Vec<SchemaGap>> {
    let mut gaps = Vec::new();

    for &(table, required) in REQUIRED_COLUMNS {
        let present = queries::table_columns(conn, table)?;
        if present.is_empty() {
            gaps.push(SchemaGap::Table(table));
            continue;
        }
        for &column in required {
            if !present.iter().any(|p| p == column) {
                gaps.push(SchemaGap::Column { table, column });
            }
        }
    }

    Ok(gaps)
}

/// Fail unless every required column is present.
pub fn require_schema(conn: &Connection) -> Result<()> {
    let gaps = schema_gaps(conn)?;
    if gaps.is_empty() {
        Ok(())
    } else {
        Err(SchemaError { gaps }.into())
    }
}

/// Warnings for status values outside the known enum sets.
pub fn status_drift(conn: &Connection) -> Result<Vec<String>> {
    let mut warnings = unknown_statuses::<DonationStatus>("donation", &queries::donation_status_counts(conn)?);
    warnings.extend(unknown_statuses::<RefundStatus>(
        "refund request",
        &queries::refund_status_counts(conn)?,
    ));
    Ok(warnings)
}

fn unknown_statuses<S: FromStr>(what: &str, counts: &[StatusCount]) -> Vec<String> {
    counts
        .iter()
        .filter(|c| c.status.parse::<S>().is_err())
        .map(|c| format!("{} {}(s) with unknown status '{}'", c.count, what, c.status))
        .collect()
}
