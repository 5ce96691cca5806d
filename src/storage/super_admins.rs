//! Super-admin rows.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::domain::{SuperAdmin, UserId};
use crate::error::DatabaseError;
use crate::storage::database::{col_ts, ts, Database};

impl Database {
    pub fn is_super_admin(&self, user: UserId) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM super_admins WHERE telegram_id = ?1", params![user], |r| r.get(0))?;
            Ok(n > 0)
        })
    }

    /// Insert; fails with a constraint violation if the user already is one.
    pub fn insert_super_admin(&self, user: UserId, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO super_admins (telegram_id, created_at) VALUES (?1, ?2)",
                params![user, ts(now)],
            )?;
            Ok(())
        })
    }

    /// Bootstrap insert; returns whether a row was added.
    pub fn insert_super_admin_if_absent(&self, user: UserId, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT OR IGNORE INTO super_admins (telegram_id, created_at) VALUES (?1, ?2)",
                params![user, ts(now)],
            )? > 0)
        })
    }

    pub fn delete_super_admin(&self, user: UserId) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM super_admins WHERE telegram_id = ?1", params![user])? > 0))
    }

    pub fn list_super_admins(&self) -> Result<Vec<SuperAdmin>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, telegram_id, created_at FROM super_admins ORDER BY id")?;
            let rows = stmt.query_map([], |r| {
                Ok(SuperAdmin { id: r.get(0)?, telegram_id: r.get(1)?, created_at: col_ts(r, 2)? })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}
