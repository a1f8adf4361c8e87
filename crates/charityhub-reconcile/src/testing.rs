//! Seed data and snapshots shared by the reconciler tests.

use charityhub_db::Database;
use charityhub_db::models::DonationRow;
use charityhub_types::AggregateTotals;

/// Donors, one charity and two campaigns with nothing donated yet.
pub const BASE: &str = "
    INSERT INTO users (id, name, email) VALUES
        (1, 'Ada Okafor', 'ada@example.org'),
        (2, 'Ben Ruiz', 'ben@example.org'),
        (3, 'Chen Wei', 'chen@example.org'),
        (4, 'Dana Idowu', 'dana@example.org');
    INSERT INTO charities (id, name) VALUES (1, 'Wells for All');
    INSERT INTO campaigns (id, charity_id, title) VALUES
        (7, 1, 'Spring Drive'),
        (8, 1, 'Autumn Drive');
";

/// In-memory database with `BASE` plus `sql` applied. Foreign keys are off
/// so tests can leave refunds pointing at deleted donations.
pub fn seeded(sql: &str) -> Database {
    let db = Database::open_in_memory().unwrap();
    db.with_conn(|conn| {
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        conn.execute_batch(BASE)?;
        conn.execute_batch(sql)?;
        Ok(())
    })
    .unwrap();
    db
}

pub fn donations(db: &Database) -> Vec<DonationRow> {
    let ids: Vec<i64> = db
        .with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM donations ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .unwrap();

    ids.into_iter()
        .map(|id| db.donation_by_id(id).unwrap().unwrap())
        .collect()
}

pub fn donation(db: &Database, id: i64) -> DonationRow {
    db.donation_by_id(id).unwrap().unwrap()
}

/// `(id, totals)` for every row of `table`.
pub fn aggregates(db: &Database, table: &str) -> Vec<(i64, AggregateTotals)> {
    db.with_conn(|conn| {
        let sql = format!(
            "SELECT id, total_donations_received, donors_count FROM {} ORDER BY id",
            table
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    AggregateTotals {
                        total_donations_received: row.get(1)?,
                        donors_count: row.get(2)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .unwrap()
}

pub fn aggregate(total_donations_received: i64, donors_count: i64) -> AggregateTotals {
    AggregateTotals {
        total_donations_received,
        donors_count,
    }
}
