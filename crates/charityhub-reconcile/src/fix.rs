use anyhow::{Context, Result, ensure};
use charityhub_db::models::{ApprovedRefundRow, DonationRow, RefundRequestRow};
use charityhub_db::{Database, TotalsChange, queries, totals};
use charityhub_types::RefundStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::audit::{RefundState, classify, donation_state};
use crate::report::{heading, yes_no};
use crate::schema;

/// Where the `refunded_at` written for a donation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// The donation already carried one.
    Existing,
    /// The refund request's review time.
    ReviewedAt,
    /// Neither was set; the time of this run.
    Now,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixedDonation {
    pub refund_id: i64,
    pub donation_id: i64,
    pub previous_status: String,
    pub previous_is_refunded: bool,
    pub previous_refunded_at: Option<String>,
    pub refunded_at: String,
    pub timestamp_source: TimestampSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    DonationMissing,
    RefundNoLongerApproved { status: String },
    AlreadyConsistent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DonationMissing => f.write_str("donation no longer exists"),
            Self::RefundNoLongerApproved { status } => {
                write!(f, "refund request is now '{}'", status)
            }
            Self::AlreadyConsistent => f.write_str("donation already consistent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRefund {
    pub refund_id: i64,
    pub donation_id: i64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixReport {
    /// Approved refunds found needing repair in the read phase.
    pub candidates: usize,
    pub fixed: Vec<FixedDonation>,
    pub skipped: Vec<SkippedRefund>,
    pub campaigns: Vec<TotalsChange>,
    pub charities: Vec<TotalsChange>,
    /// Approved refunds still needing repair after commit.
    pub remaining: usize,
}

/// Read-phase result: what the write phase will attempt.
struct Plan {
    repairs: Vec<ApprovedRefundRow>,
    orphaned: Vec<ApprovedRefundRow>,
}

fn build_plan(conn: &Connection) -> Result<Plan> {
    let mut plan = Plan {
        repairs: Vec::new(),
        orphaned: Vec::new(),
    };

    for row in queries::approved_refunds(conn)? {
        match classify(&row) {
            RefundState::Consistent => {}
            RefundState::Orphaned => plan.orphaned.push(row),
            RefundState::Inconsistent | RefundState::MissingTimestamp => plan.repairs.push(row),
        }
    }

    Ok(plan)
}

pub fn run_fix(db: &Database) -> Result<FixReport> {
    run_fix_at(db, Utc::now())
}

/// Repair every approved refund whose donation is not fully marked
/// refunded, then recompute the totals of every campaign and charity a
/// repaired donation belongs to. `now` stamps donations that have neither
/// their own `refunded_at` nor a review time.
///
/// All writes happen in one transaction. Any error rolls the whole run
/// back and is returned.
pub fn run_fix_at(db: &Database, now: DateTime<Utc>) -> Result<FixReport> {
    db.with_conn(schema::require_schema)?;

    let plan = db.with_conn(build_plan)?;
    info!(
        repairs = plan.repairs.len(),
        orphaned = plan.orphaned.len(),
        "Planned refund repairs"
    );

    let mut report = FixReport {
        candidates: plan.repairs.len(),
        ..FixReport::default()
    };

    for row in &plan.orphaned {
        warn!(
            refund_id = row.refund.id,
            donation_id = row.refund.donation_id,
            "Approved refund references a deleted donation; skipping"
        );
        report.skipped.push(SkippedRefund {
            refund_id: row.refund.id,
            donation_id: row.refund.donation_id,
            reason: SkipReason::DonationMissing,
        });
    }

    if plan.repairs.is_empty() {
        info!("No approved refunds need repair");
        return Ok(report);
    }

    let applied = db
        .with_tx(|conn| apply(conn, &plan.repairs, now))
        .context("refund repair failed; all changes rolled back")?;

    report.fixed = applied.fixed;
    report.skipped.extend(applied.skipped);
    report.campaigns = applied.campaigns;
    report.charities = applied.charities;
    report.remaining = db.with_conn(build_plan)?.repairs.len();

    info!(
        fixed = report.fixed.len(),
        skipped = report.skipped.len(),
        campaigns = report.campaigns.len(),
        charities = report.charities.len(),
        remaining = report.remaining,
        "Refund repair committed"
    );

    Ok(report)
}

#[derive(Default)]
struct Applied {
    fixed: Vec<FixedDonation>,
    skipped: Vec<SkippedRefund>,
    campaigns: Vec<TotalsChange>,
    charities: Vec<TotalsChange>,
}

enum Recheck {
    Repair {
        refund: RefundRequestRow,
        donation: DonationRow,
    },
    Skip(SkipReason),
}

/// Re-read the refund and its donation inside the transaction. The plan
/// was built before the transaction began, so either may have moved.
fn recheck(conn: &Connection, planned: &ApprovedRefundRow) -> Result<Recheck> {
    let refund = match queries::refund_by_id(conn, planned.refund.id)? {
        Some(refund) => refund,
        None => {
            return Ok(Recheck::Skip(SkipReason::RefundNoLongerApproved {
                status: "deleted".into(),
            }));
        }
    };
    if refund.status.parse::<RefundStatus>() != Ok(RefundStatus::Approved) {
        return Ok(Recheck::Skip(SkipReason::RefundNoLongerApproved {
            status: refund.status,
        }));
    }

    let Some(donation) = queries::donation_by_id(conn, refund.donation_id)? else {
        return Ok(Recheck::Skip(SkipReason::DonationMissing));
    };
    if donation_state(&donation) == RefundState::Consistent {
        return Ok(Recheck::Skip(SkipReason::AlreadyConsistent));
    }

    Ok(Recheck::Repair { refund, donation })
}

fn resolve_refunded_at(
    donation: &DonationRow,
    refund: &RefundRequestRow,
    now: DateTime<Utc>,
) -> (String, TimestampSource) {
    if let Some(existing) = &donation.refunded_at {
        (existing.clone(), TimestampSource::Existing)
    } else if let Some(reviewed) = &refund.reviewed_at {
        (reviewed.clone(), TimestampSource::ReviewedAt)
    } else {
        (now.to_rfc3339_opts(SecondsFormat::Secs, true), TimestampSource::Now)
    }
}

fn apply(conn: &Connection, repairs: &[ApprovedRefundRow], now: DateTime<Utc>) -> Result<Applied> {
    let mut applied = Applied::default();
    let mut campaign_ids = BTreeSet::new();
    let mut charity_ids = BTreeSet::new();

    // Donations first: totals must see every status change.
    for planned in repairs {
        let (refund, donation) = match recheck(conn, planned)? {
            Recheck::Repair { refund, donation } => (refund, donation),
            Recheck::Skip(reason) => {
                warn!(
                    refund_id = planned.refund.id,
                    donation_id = planned.refund.donation_id,
                    %reason,
                    "Skipping refund"
                );
                applied.skipped.push(SkippedRefund {
                    refund_id: planned.refund.id,
                    donation_id: planned.refund.donation_id,
                    reason,
                });
                continue;
            }
        };

        let (refunded_at, timestamp_source) = resolve_refunded_at(&donation, &refund, now);
        let changed = queries::mark_donation_refunded(conn, donation.id, &refunded_at)?;
        ensure!(changed == 1, "donation {} was not updated", donation.id);

        debug!(
            refund_id = refund.id,
            donation_id = donation.id,
            previous_status = %donation.status,
            previous_is_refunded = donation.is_refunded,
            %refunded_at,
            "Marked donation refunded"
        );

        // Charity totals also count gifts made through its campaigns, so
        // the campaign's owner is touched even when charity_id is NULL.
        charity_ids.extend(donation.charity_id);
        if let Some(campaign_id) = donation.campaign_id {
            campaign_ids.insert(campaign_id);
            charity_ids.extend(queries::campaign_charity_id(conn, campaign_id)?);
        }

        applied.fixed.push(FixedDonation {
            refund_id: refund.id,
            donation_id: donation.id,
            previous_status: donation.status,
            previous_is_refunded: donation.is_refunded,
            previous_refunded_at: donation.refunded_at,
            refunded_at,
            timestamp_source,
        });
    }

    for id in campaign_ids {
        let change = totals::recalculate_campaign_totals(conn, id)
            .with_context(|| format!("recalculating totals for campaign {}", id))?;
        applied.campaigns.push(change);
    }

    for id in charity_ids {
        let change = totals::recalculate_charity_totals(conn, id)
            .with_context(|| format!("recalculating totals for charity {}", id))?;
        applied.charities.push(change);
    }

    Ok(applied)
}

fn write_totals(f: &mut fmt::Formatter<'_>, change: &TotalsChange) -> fmt::Result {
    let (before, after) = (change.before, change.after);
    write!(
        f,
        "  {} #{}  total {} -> {}",
        change.kind, change.id, before.total_donations_received, after.total_donations_received
    )?;
    if change.total_delta() < 0 {
        write!(f, " ({})", change.total_delta())?;
    }
    writeln!(f, "  donors {} -> {}", before.donors_count, after.donors_count)
}

impl fmt::Display for FixReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Refund Consistency Fix ===")?;
        writeln!(f)?;
        writeln!(f, "Approved refunds needing repair: {}", self.candidates)?;

        if !self.fixed.is_empty() {
            heading(f, "Donations corrected")?;
            for item in &self.fixed {
                let source = match item.timestamp_source {
                    TimestampSource::Existing => "kept",
                    TimestampSource::ReviewedAt => "from review",
                    TimestampSource::Now => "from run time",
                };
                writeln!(
                    f,
                    "  refund #{} -> donation #{}  status {} -> refunded  is_refunded {} -> true  refunded_at {} ({})",
                    item.refund_id,
                    item.donation_id,
                    item.previous_status,
                    yes_no(item.previous_is_refunded),
                    item.refunded_at,
                    source,
                )?;
            }
        }

        if !self.skipped.is_empty() {
            heading(f, "Skipped")?;
            for item in &self.skipped {
                writeln!(
                    f,
                    "  refund #{} -> donation #{}: {}",
                    item.refund_id, item.donation_id, item.reason
                )?;
            }
        }

        if !self.campaigns.is_empty() {
            heading(f, "Campaign totals")?;
            for change in &self.campaigns {
                write_totals(f, change)?;
            }
        }

        if !self.charities.is_empty() {
            heading(f, "Charity totals")?;
            for change in &self.charities {
                write_totals(f, change)?;
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "Corrected {} donation(s), skipped {}, recalculated {} campaign(s) and {} charity(ies).",
            self.fixed.len(),
            self.skipped.len(),
            self.campaigns.len(),
            self.charities.len()
        )?;
        writeln!(f, "Approved refunds still needing repair: {}", self.remaining)
    }
}
