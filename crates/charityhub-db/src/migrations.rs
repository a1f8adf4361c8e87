use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Create or upgrade the CharityHub tables this workspace reads and writes.
///
/// The production schema is owned by the web application. This mirrors the
/// subset of it the reconciler depends on, for fresh databases and tests.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE charities (
                id                        INTEGER PRIMARY KEY,
                name                      TEXT NOT NULL,
                total_donations_received  INTEGER NOT NULL DEFAULT 0,
                donors_count              INTEGER NOT NULL DEFAULT 0,
                created_at                TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE campaigns (
                id                        INTEGER PRIMARY KEY,
                charity_id                INTEGER NOT NULL REFERENCES charities(id),
                title                     TEXT NOT NULL,
                total_donations_received  INTEGER NOT NULL DEFAULT 0,
                donors_count              INTEGER NOT NULL DEFAULT 0,
                created_at                TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE donations (
                id           INTEGER PRIMARY KEY,
                donor_id     INTEGER NOT NULL REFERENCES users(id),
                campaign_id  INTEGER REFERENCES campaigns(id),
                charity_id   INTEGER REFERENCES charities(id),
                amount       INTEGER NOT NULL,
                status       TEXT NOT NULL DEFAULT 'pending',
                is_refunded  INTEGER NOT NULL DEFAULT 0,
                refunded_at  TEXT,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_donations_campaign ON donations(campaign_id);
            CREATE INDEX idx_donations_charity ON donations(charity_id);

            CREATE TABLE refund_requests (
                id           INTEGER PRIMARY KEY,
                donation_id  INTEGER NOT NULL REFERENCES donations(id),
                user_id      INTEGER NOT NULL REFERENCES users(id),
                reason       TEXT NOT NULL DEFAULT '',
                status       TEXT NOT NULL DEFAULT 'pending',
                reviewed_at  TEXT,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_refund_requests_status ON refund_requests(status);
            CREATE INDEX idx_refund_requests_donation ON refund_requests(donation_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_twice_is_harmless() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
