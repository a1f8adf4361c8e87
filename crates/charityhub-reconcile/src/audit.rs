use anyhow::Result;
use charityhub_db::Database;
use charityhub_db::models::{ApprovedRefundRow, DonationCounts, DonationRow, StatusCount};
use charityhub_db::queries;
use charityhub_types::RefundStatus;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::report::{donor_label, heading, yes_no};
use crate::schema;

/// Where an approved refund stands relative to its donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    /// Donation is refunded by status and flag and carries a timestamp.
    Consistent,
    /// Donation status is not "refunded" or its flag is not set.
    Inconsistent,
    /// Status and flag agree, but `refunded_at` was never recorded.
    MissingTimestamp,
    /// The donation row no longer exists.
    Orphaned,
}

pub fn classify(row: &ApprovedRefundRow) -> RefundState {
    match &row.donation {
        None => RefundState::Orphaned,
        Some(donation) => donation_state(donation),
    }
}

pub(crate) fn donation_state(donation: &DonationRow) -> RefundState {
    if !donation.is_marked_refunded() {
        RefundState::Inconsistent
    } else if donation.refunded_at.is_none() {
        RefundState::MissingTimestamp
    } else {
        RefundState::Consistent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefundCounts {
    pub pending: i64,
    pub approved: i64,
    pub denied: i64,
    pub cancelled: i64,
    /// Statuses outside the known set.
    pub other: Vec<StatusCount>,
}

impl RefundCounts {
    fn from_rows(rows: Vec<StatusCount>) -> Self {
        let mut counts = Self::default();
        for row in rows {
            match row.status.parse::<RefundStatus>() {
                Ok(RefundStatus::Pending) => counts.pending += row.count,
                Ok(RefundStatus::Approved) => counts.approved += row.count,
                Ok(RefundStatus::Denied) => counts.denied += row.count,
                Ok(RefundStatus::Cancelled) => counts.cancelled += row.count,
                Err(_) => counts.other.push(row),
            }
        }
        counts
    }
}

/// One approved refund whose donation needs attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundFinding {
    pub refund_id: i64,
    pub donation_id: i64,
    pub donor: String,
    pub amount: i64,
    pub status: String,
    pub is_refunded: bool,
    pub refunded_at_missing: bool,
    pub reviewed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedRefund {
    pub refund_id: i64,
    pub donation_id: i64,
    pub donor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// False when a schema gap stopped the audit before the data checks.
    pub complete: bool,
    pub warnings: Vec<String>,
    pub refund_counts: RefundCounts,
    pub consistent: usize,
    pub inconsistent: Vec<RefundFinding>,
    pub missing_timestamp: Vec<RefundFinding>,
    pub orphaned: Vec<OrphanedRefund>,
    pub flagged_not_refunded: Vec<DonationRow>,
    pub donation_counts: DonationCounts,
    pub donation_counts_mismatch: bool,
}

impl AuditReport {
    /// Approved refunds a fix run would repair.
    pub fn repairable(&self) -> usize {
        self.inconsistent.len() + self.missing_timestamp.len()
    }

    pub fn is_clean(&self) -> bool {
        self.complete
            && self.warnings.is_empty()
            && self.repairable() == 0
            && self.orphaned.is_empty()
            && self.flagged_not_refunded.is_empty()
            && !self.donation_counts_mismatch
    }
}

/// Read-only consistency audit of refunds and donations.
pub fn run_audit(db: &Database) -> Result<AuditReport> {
    let report = db.with_conn(|conn| {
        let mut report = AuditReport::default();

        let gaps = schema::schema_gaps(conn)?;
        if !gaps.is_empty() {
            for gap in &gaps {
                warn!(%gap, "Schema precondition not met");
                report.warnings.push(format!("schema: {}", gap));
            }
            return Ok(report);
        }

        for warning in schema::status_drift(conn)? {
            warn!("{}", warning);
            report.warnings.push(warning);
        }

        report.refund_counts = RefundCounts::from_rows(queries::refund_status_counts(conn)?);

        for row in queries::approved_refunds(conn)? {
            let state = classify(&row);
            let donor_id = row.donation.as_ref().map_or(row.refund.user_id, |d| d.donor_id);
            let donor = donor_label(row.donor.as_ref(), donor_id);

            match (state, row.donation) {
                (RefundState::Consistent, _) => report.consistent += 1,
                (RefundState::Orphaned, _) | (_, None) => report.orphaned.push(OrphanedRefund {
                    refund_id: row.refund.id,
                    donation_id: row.refund.donation_id,
                    donor,
                }),
                (state, Some(donation)) => {
                    let finding = RefundFinding {
                        refund_id: row.refund.id,
                        donation_id: donation.id,
                        donor,
                        amount: donation.amount,
                        status: donation.status,
                        is_refunded: donation.is_refunded,
                        refunded_at_missing: donation.refunded_at.is_none(),
                        reviewed_at: row.refund.reviewed_at,
                    };
                    if state == RefundState::MissingTimestamp {
                        report.missing_timestamp.push(finding);
                    } else {
                        report.inconsistent.push(finding);
                    }
                }
            }
        }

        report.flagged_not_refunded = queries::flagged_not_refunded(conn)?;
        report.donation_counts = queries::donation_counts(conn)?;
        report.donation_counts_mismatch = report.donation_counts.mismatch();
        report.complete = true;

        Ok(report)
    })?;

    info!(
        inconsistent = report.inconsistent.len(),
        missing_timestamp = report.missing_timestamp.len(),
        orphaned = report.orphaned.len(),
        flagged_not_refunded = report.flagged_not_refunded.len(),
        "Audit complete"
    );

    Ok(report)
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Refund Consistency Audit ===")?;

        if !self.warnings.is_empty() {
            heading(f, "Warnings")?;
            for warning in &self.warnings {
                writeln!(f, "  ! {}", warning)?;
            }
        }

        if !self.complete {
            writeln!(f)?;
            return writeln!(f, "Audit incomplete: fix the schema warnings above and re-run.");
        }

        let c = &self.refund_counts;
        heading(f, "Refund requests by status")?;
        writeln!(f, "  pending     {}", c.pending)?;
        writeln!(f, "  approved    {}", c.approved)?;
        writeln!(f, "  denied      {}", c.denied)?;
        writeln!(f, "  cancelled   {}", c.cancelled)?;
        for other in &c.other {
            writeln!(f, "  {} (unknown)  {}", other.status, other.count)?;
        }

        heading(f, "Approved refunds")?;
        writeln!(f, "  consistent          {}", self.consistent)?;
        writeln!(f, "  inconsistent        {}", self.inconsistent.len())?;
        writeln!(f, "  missing refunded_at {}", self.missing_timestamp.len())?;
        writeln!(f, "  orphaned            {}", self.orphaned.len())?;

        for (title, findings) in [
            ("Inconsistent approved refunds", &self.inconsistent),
            ("Refunded donations without refunded_at", &self.missing_timestamp),
        ] {
            if findings.is_empty() {
                continue;
            }
            heading(f, title)?;
            for item in findings {
                writeln!(
                    f,
                    "  refund #{} -> donation #{}  donor: {}  amount: {}  status: {}  is_refunded: {}  refunded_at: {}",
                    item.refund_id,
                    item.donation_id,
                    item.donor,
                    item.amount,
                    item.status,
                    yes_no(item.is_refunded),
                    if item.refunded_at_missing { "missing" } else { "set" },
                )?;
            }
        }

        if !self.orphaned.is_empty() {
            heading(f, "Approved refunds whose donation no longer exists")?;
            for item in &self.orphaned {
                writeln!(
                    f,
                    "  refund #{} -> donation #{} (deleted)  donor: {}",
                    item.refund_id, item.donation_id, item.donor
                )?;
            }
        }

        heading(f, "Donations flagged refunded with a different status")?;
        writeln!(f, "  count {}", self.flagged_not_refunded.len())?;
        for d in &self.flagged_not_refunded {
            writeln!(f, "  donation #{}  status: {}  amount: {}", d.id, d.status, d.amount)?;
        }

        let d = &self.donation_counts;
        heading(f, "Donations")?;
        writeln!(f, "  total               {}", d.total)?;
        writeln!(f, "  completed           {}", d.completed)?;
        writeln!(f, "  refunded (status)   {}", d.refunded_by_status)?;
        writeln!(f, "  refunded (flag)     {}", d.refunded_by_flag)?;
        if self.donation_counts_mismatch {
            writeln!(f, "  MISMATCH: refunded-by-status and refunded-by-flag disagree")?;
        }

        writeln!(f)?;
        if self.is_clean() {
            writeln!(f, "No inconsistencies found.")
        } else if self.repairable() > 0 {
            writeln!(
                f,
                "{} approved refund(s) need repair; run refund-fix to correct them.",
                self.repairable()
            )
        } else {
            writeln!(
                f,
                "No approved refunds need repair; the findings above need manual review."
            )
        }
    }
}
