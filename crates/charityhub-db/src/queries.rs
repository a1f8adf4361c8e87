use crate::models::{
    ApprovedRefundRow, DonationCounts, DonationRow, DonorRow, RefundRequestRow, StatusCount,
};
use crate::Database;
use anyhow::Result;
use charityhub_types::{DonationStatus, RefundStatus};
use rusqlite::{Connection, OptionalExtension, Row};

const DONATION_COLUMNS: &str =
    "id, donor_id, campaign_id, charity_id, amount, status, is_refunded, refunded_at";

impl Database {
    pub fn approved_refunds(&self) -> Result<Vec<ApprovedRefundRow>> {
        self.with_conn(approved_refunds)
    }

    pub fn donation_by_id(&self, id: i64) -> Result<Option<DonationRow>> {
        self.with_conn(|conn| donation_by_id(conn, id))
    }

    pub fn donation_counts(&self) -> Result<DonationCounts> {
        self.with_conn(donation_counts)
    }
}

// -- Refund requests --

/// Every approved refund request, oldest first, joined to its donation and
/// to the donor (the donation's donor, falling back to the requester).
pub fn approved_refunds(conn: &Connection) -> Result<Vec<ApprovedRefundRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.donation_id, r.user_id, r.status, r.reviewed_at,
                d.id, d.donor_id, d.campaign_id, d.charity_id, d.amount,
                d.status, d.is_refunded, d.refunded_at,
                u.id, u.name, u.email
         FROM refund_requests r
         LEFT JOIN donations d ON d.id = r.donation_id
         LEFT JOIN users u ON u.id = COALESCE(d.donor_id, r.user_id)
         WHERE r.status = ?1
         ORDER BY r.id",
    )?;

    let rows = stmt
        .query_map([RefundStatus::Approved.as_str()], |row| {
            let refund = RefundRequestRow {
                id: row.get(0)?,
                donation_id: row.get(1)?,
                user_id: row.get(2)?,
                status: row.get(3)?,
                reviewed_at: row.get(4)?,
            };

            // LEFT JOIN: a NULL donation id means the row is gone
            let donation = match row.get::<_, Option<i64>>(5)? {
                Some(_) => Some(donation_from_row(row, 5)?),
                None => None,
            };

            let donor = match row.get::<_, Option<i64>>(13)? {
                Some(id) => Some(DonorRow {
                    id,
                    name: row.get(14)?,
                    email: row.get(15)?,
                }),
                None => None,
            };

            Ok(ApprovedRefundRow { refund, donation, donor })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn refund_by_id(conn: &Connection, id: i64) -> Result<Option<RefundRequestRow>> {
    let row = conn
        .query_row(
            "SELECT id, donation_id, user_id, status, reviewed_at FROM refund_requests WHERE id = ?1",
            [id],
            |row| {
                Ok(RefundRequestRow {
                    id: row.get(0)?,
                    donation_id: row.get(1)?,
                    user_id: row.get(2)?,
                    status: row.get(3)?,
                    reviewed_at: row.get(4)?,
                })
            },
        )
        .optional()?;

    Ok(row)
}

pub fn refund_status_counts(conn: &Connection) -> Result<Vec<StatusCount>> {
    status_counts(conn, "SELECT status, COUNT(*) FROM refund_requests GROUP BY status ORDER BY status")
}

// -- Campaigns --

/// Owning charity of a campaign, `None` when the campaign does not exist.
pub fn campaign_charity_id(conn: &Connection, campaign_id: i64) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT charity_id FROM campaigns WHERE id = ?1", [campaign_id], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(id)
}

// -- Donations --

pub fn donation_by_id(conn: &Connection, id: i64) -> Result<Option<DonationRow>> {
    let sql = format!("SELECT {} FROM donations WHERE id = ?1", DONATION_COLUMNS);
    let row = conn
        .query_row(&sql, [id], |row| donation_from_row(row, 0))
        .optional()?;

    Ok(row)
}

pub fn donation_status_counts(conn: &Connection) -> Result<Vec<StatusCount>> {
    status_counts(conn, "SELECT status, COUNT(*) FROM donations GROUP BY status ORDER BY status")
}

pub fn donation_counts(conn: &Connection) -> Result<DonationCounts> {
    let counts = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = ?1), 0),
                COALESCE(SUM(status = ?2), 0),
                COALESCE(SUM(is_refunded = 1), 0)
         FROM donations",
        [
            DonationStatus::Completed.as_str(),
            DonationStatus::Refunded.as_str(),
        ],
        |row| {
            Ok(DonationCounts {
                total: row.get(0)?,
                completed: row.get(1)?,
                refunded_by_status: row.get(2)?,
                refunded_by_flag: row.get(3)?,
            })
        },
    )?;

    Ok(counts)
}

/// Donations whose flag says refunded while the status disagrees.
pub fn flagged_not_refunded(conn: &Connection) -> Result<Vec<DonationRow>> {
    let sql = format!(
        "SELECT {} FROM donations WHERE is_refunded = 1 AND status != ?1 ORDER BY id",
        DONATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([DonationStatus::Refunded.as_str()], |row| donation_from_row(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Mark a donation refunded. The flag is derived from the status written,
/// so the two columns always agree after this call.
pub fn mark_donation_refunded(conn: &Connection, id: i64, refunded_at: &str) -> Result<usize> {
    let status = DonationStatus::Refunded;
    let changed = conn.execute(
        "UPDATE donations SET status = ?2, is_refunded = ?3, refunded_at = ?4 WHERE id = ?1",
        rusqlite::params![id, status.as_str(), status.refunded_flag(), refunded_at],
    )?;

    Ok(changed)
}

// -- Schema --

/// Column names of `table`, empty when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(names)
}

fn status_counts(conn: &Connection, sql: &str) -> Result<Vec<StatusCount>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StatusCount {
                status: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Map `DONATION_COLUMNS`, starting at column `at`.
fn donation_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<DonationRow> {
    Ok(DonationRow {
        id: row.get(at)?,
        donor_id: row.get(at + 1)?,
        campaign_id: row.get(at + 2)?,
        charity_id: row.get(at + 3)?,
        amount: row.get(at + 4)?,
        status: row.get(at + 5)?,
        is_refunded: row.get(at + 6)?,
        refunded_at: row.get(at + 7)?,
    })
}
