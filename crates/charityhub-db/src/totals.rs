use anyhow::Result;
use charityhub_types::{AggregateTotals, Contribution};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::Database;

/// Which denormalized aggregate row is being recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Campaign,
    Charity,
}

impl AggregateKind {
    fn table(self) -> &'static str {
        match self {
            Self::Campaign => "campaigns",
            Self::Charity => "charities",
        }
    }

    /// Donations feeding this aggregate. Charity totals come straight from
    /// the donation set (direct gifts plus gifts to any of its campaigns),
    /// never from campaign totals.
    fn contributions_sql(self) -> &'static str {
        match self {
            Self::Campaign => {
                "SELECT donor_id, amount, status, is_refunded FROM donations
                 WHERE campaign_id = ?1"
            }
            Self::Charity => {
                "SELECT donor_id, amount, status, is_refunded FROM donations
                 WHERE charity_id = ?1
                    OR campaign_id IN (SELECT id FROM campaigns WHERE charity_id = ?1)"
            }
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Campaign => f.write_str("campaign"),
            Self::Charity => f.write_str("charity"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TotalsError {
    #[error("{kind} {id} does not exist; cannot recalculate its totals")]
    Missing { kind: AggregateKind, id: i64 },
}

/// Stored totals before and after a recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TotalsChange {
    pub kind: AggregateKind,
    pub id: i64,
    pub before: AggregateTotals,
    pub after: AggregateTotals,
}

impl TotalsChange {
    /// Signed change in `total_donations_received`.
    pub fn total_delta(&self) -> i64 {
        self.after.total_donations_received - self.before.total_donations_received
    }

    pub fn donors_delta(&self) -> i64 {
        self.after.donors_count - self.before.donors_count
    }

    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

impl Database {
    /// Recompute and persist one campaign's totals in its own transaction.
    pub fn recalculate_campaign_totals(&self, id: i64) -> Result<TotalsChange> {
        self.with_tx(|conn| recalculate_campaign_totals(conn, id))
    }

    pub fn recalculate_charity_totals(&self, id: i64) -> Result<TotalsChange> {
        self.with_tx(|conn| recalculate_charity_totals(conn, id))
    }
}

pub fn recalculate_campaign_totals(conn: &Connection, id: i64) -> Result<TotalsChange> {
    recalculate(conn, AggregateKind::Campaign, id)
}

pub fn recalculate_charity_totals(conn: &Connection, id: i64) -> Result<TotalsChange> {
    recalculate(conn, AggregateKind::Charity, id)
}

pub fn stored_totals(
    conn: &Connection,
    kind: AggregateKind,
    id: i64,
) -> Result<Option<AggregateTotals>> {
    let sql = format!(
        "SELECT total_donations_received, donors_count FROM {} WHERE id = ?1",
        kind.table()
    );
    let totals = conn
        .query_row(&sql, [id], |row| {
            Ok(AggregateTotals {
                total_donations_received: row.get(0)?,
                donors_count: row.get(1)?,
            })
        })
        .optional()?;

    Ok(totals)
}

/// The single recomputation entry point: load the donation set, derive the
/// totals, persist them. Runs on whatever transaction `conn` is part of.
fn recalculate(conn: &Connection, kind: AggregateKind, id: i64) -> Result<TotalsChange> {
    let before = stored_totals(conn, kind, id)?.ok_or(TotalsError::Missing { kind, id })?;

    let mut stmt = conn.prepare(kind.contributions_sql())?;
    let contributions = stmt
        .query_map([id], |row| {
            Ok(Contribution {
                donor_id: row.get(0)?,
                amount: row.get(1)?,
                status: row.get(2)?,
                is_refunded: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let after = AggregateTotals::compute(&contributions);

    let sql = format!(
        "UPDATE {} SET total_donations_received = ?2, donors_count = ?3 WHERE id = ?1",
        kind.table()
    );
    conn.execute(&sql, rusqlite::params![id, after.total_donations_received, after.donors_count])?;

    debug!(
        kind = %kind,
        id,
        old_total = before.total_donations_received,
        new_total = after.total_donations_received,
        old_donors = before.donors_count,
        new_donors = after.donors_count,
        "Recalculated totals"
    );

    Ok(TotalsChange { kind, id, before, after })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "
                INSERT INTO users (id, name, email) VALUES
                    (1, 'Ada', 'ada@example.org'),
                    (2, 'Ben', 'ben@example.org'),
                    (3, 'Cy', 'cy@example.org');
                INSERT INTO charities (id, name, total_donations_received, donors_count)
                    VALUES (1, 'Wells for All', 9999, 9);
                INSERT INTO campaigns (id, charity_id, title, total_donations_received, donors_count)
                    VALUES (7, 1, 'Spring Drive', 2000, 4), (8, 1, 'Autumn Drive', 0, 0);
                INSERT INTO donations (id, donor_id, campaign_id, charity_id, amount, status, is_refunded) VALUES
                    (1, 1, 7, 1, 500, 'completed', 0),
                    (2, 2, 7, 1, 700, 'refunded', 1),
                    (3, 2, 8, NULL, 250, 'completed', 0),
                    (4, 3, NULL, 1, 100, 'completed', 0),
                    (5, 1, NULL, 1, 40, 'pending', 0);
                ",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn campaign_totals_follow_counting_donations() {
        let db = seeded();
        let change = db.recalculate_campaign_totals(7).unwrap();

        assert_eq!(change.before.total_donations_received, 2000);
        assert_eq!(change.after.total_donations_received, 500);
        assert_eq!(change.after.donors_count, 1);
        assert_eq!(change.total_delta(), -1500);
        assert_eq!(change.donors_delta(), -3);

        let stored = db
            .with_conn(|conn| stored_totals(conn, AggregateKind::Campaign, 7))
            .unwrap()
            .unwrap();
        assert_eq!(stored, change.after);
    }

    #[test]
    fn charity_totals_include_direct_and_campaign_donations_once() {
        let db = seeded();
        let change = db.recalculate_charity_totals(1).unwrap();

        // 500 (campaign 7) + 250 (campaign 8, no charity_id) + 100 (direct)
        assert_eq!(change.after.total_donations_received, 850);
        assert_eq!(change.after.donors_count, 3);
    }

    #[test]
    fn recalculating_twice_is_a_noop() {
        let db = seeded();
        db.recalculate_campaign_totals(8).unwrap();
        let second = db.recalculate_campaign_totals(8).unwrap();
        assert!(second.is_noop());
    }

    #[test]
    fn missing_row_is_a_typed_error() {
        let db = seeded();
        let err = db.recalculate_campaign_totals(404).unwrap_err();
        match err.downcast_ref::<TotalsError>() {
            Some(TotalsError::Missing { kind, id }) => {
                assert_eq!(*kind, AggregateKind::Campaign);
                assert_eq!(*id, 404);
            }
            None => panic!("unexpected error: {err:#}"),
        }
    }
}
