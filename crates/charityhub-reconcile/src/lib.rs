//! Refund consistency reconciliation for the CharityHub database.
//!
//! Approved refund requests must leave their donation marked refunded
//! (status, flag and timestamp), and campaign and charity totals must only
//! count completed, non-refunded donations. [`audit`] reports drift without
//! writing; [`fix`] repairs it in one transaction and recomputes the
//! affected totals.

pub mod audit;
pub mod cli;
pub mod config;
pub mod fix;
pub mod report;
pub mod schema;

#[cfg(test)]
mod testing;

pub use audit::{AuditReport, RefundState, classify, run_audit};
pub use config::{Config, ConfigError};
pub use fix::{FixReport, run_fix, run_fix_at};
pub use report::ReportFormat;
