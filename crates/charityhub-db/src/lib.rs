pub mod migrations;
pub mod models;
pub mod queries;
pub mod totals;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

pub use totals::{AggregateKind, TotalsChange, TotalsError};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open an existing CharityHub database for reading and writing.
    ///
    /// The schema belongs to the host application, so no migrations run
    /// here and a missing file is an error rather than a fresh database.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("opening database at {}", path.display()))?;

        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        info!("Database opened at {}", path.display());
        Ok(Self::from_conn(conn))
    }

    /// Open an existing database with writes refused at the SQLite level.
    pub fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("opening database at {} (read-only)", path.display()))?;

        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "query_only", "ON")?;

        info!("Database opened read-only at {}", path.display());
        Ok(Self::from_conn(conn))
    }

    /// Fresh in-memory database with the full schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run `f` inside one transaction. Commits when `f` returns `Ok`;
    /// any error drops the transaction, which rolls every write back.
    ///
    /// The write lock is taken at BEGIN, so reads made inside `f` cannot be
    /// invalidated by another writer before `f`'s own writes.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit().context("committing transaction")?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_tx_commits_on_success() {
        let db = Database::open_in_memory().unwrap();
        db.with_tx(|conn| {
            conn.execute("INSERT INTO charities (id, name) VALUES (1, 'Wells for All')", [])?;
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM charities", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn with_tx_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.with_tx(|conn| {
            conn.execute("INSERT INTO charities (id, name) VALUES (1, 'Wells for All')", [])?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM charities", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn with_tx_holds_the_write_lock_from_the_start() {
        let path = std::env::temp_dir().join(format!("charityhub-tx-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let setup = Connection::open(&path).unwrap();
            migrations::run(&setup).unwrap();
        }

        let db = Database::open(&path, Duration::from_millis(10)).unwrap();
        let other = Connection::open(&path).unwrap();
        other.busy_timeout(Duration::ZERO).unwrap();

        db.with_tx(|conn| {
            // read only so far; a second writer must still be locked out
            let _: i64 = conn.query_row("SELECT COUNT(*) FROM charities", [], |r| r.get(0))?;
            let blocked = other.execute("INSERT INTO charities (id, name) VALUES (9, 'Late Writer')", []);
            assert!(blocked.is_err());
            conn.execute("INSERT INTO charities (id, name) VALUES (1, 'Wells for All')", [])?;
            Ok(())
        })
        .unwrap();

        let names: i64 = other
            .query_row("SELECT COUNT(*) FROM charities", [], |r| r.get(0))
            .unwrap();
        assert_eq!(names, 1);

        drop(other);
        drop(db);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn open_refuses_missing_file() {
        let path = std::env::temp_dir().join("charityhub-does-not-exist.db");
        assert!(Database::open(&path, Duration::from_millis(10)).is_err());
        assert!(Database::open_read_only(&path, Duration::from_millis(10)).is_err());
    }
}
