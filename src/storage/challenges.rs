//! Challenge rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Challenge, UserId};
use crate::error::DatabaseError;
use crate::storage::database::{col_bool, col_ts, ts, Database};

const CHALLENGE_COLUMNS: &str =
    "id, name, description, creator_id, daily_task_limit, hide_future_tasks, created_at, updated_at";

fn challenge_from_row(row: &Row<'_>) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        creator_id: row.get(3)?,
        daily_task_limit: row.get::<_, i64>(4)?.max(0) as u32,
        hide_future_tasks: col_bool(row, 5)?,
        created_at: col_ts(row, 6)?,
        updated_at: col_ts(row, 7)?,
    })
}

pub(crate) fn insert_challenge_in(conn: &Connection, c: &Challenge) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO challenges (id, name, description, creator_id, daily_task_limit,
         hide_future_tasks, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            c.id,
            c.name,
            c.description,
            c.creator_id,
            c.daily_task_limit,
            c.hide_future_tasks as i64,
            ts(c.created_at),
            ts(c.updated_at),
        ],
    )?;
    Ok(())
}

pub(crate) fn touch_challenge_in(conn: &Connection, id: &str, now: DateTime<Utc>) -> Result<(), DatabaseError> {
    conn.execute("UPDATE challenges SET updated_at = ?2 WHERE id = ?1", params![id, ts(now)])?;
    Ok(())
}

impl Database {
    /// Insert a new challenge.
    pub fn insert_challenge(&self, c: &Challenge) -> Result<(), DatabaseError> {
        self.with_conn(|conn| insert_challenge_in(conn, c))
    }

    pub fn get_challenge(&self, id: &str) -> Result<Option<Challenge>, DatabaseError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], challenge_from_row).optional()?)
        })
    }

    pub fn challenge_exists(&self, id: &str) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM challenges WHERE id = ?1", params![id], |r| r.get(0))?;
            Ok(n > 0)
        })
    }

    /// Challenges the user created or participates in, most recently updated first.
    pub fn challenges_for_user(&self, user: UserId) -> Result<Vec<Challenge>, DatabaseError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHALLENGE_COLUMNS} FROM challenges
                 WHERE creator_id = ?1
                    OR id IN (SELECT challenge_id FROM participants WHERE telegram_id = ?1)
                 ORDER BY updated_at DESC, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user], challenge_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn count_challenges_for_user(&self, user: UserId) -> Result<usize, DatabaseError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM challenges
                 WHERE creator_id = ?1
                    OR id IN (SELECT challenge_id FROM participants WHERE telegram_id = ?1)",
                params![user],
                |r| r.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Every challenge in the system, newest first (super-admin observer view).
    pub fn all_challenges(&self) -> Result<Vec<Challenge>, DatabaseError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {CHALLENGE_COLUMNS} FROM challenges ORDER BY created_at DESC, id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], challenge_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn update_challenge_name(&self, id: &str, name: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE challenges SET name = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, name, ts(now)],
            )?;
            Ok(n > 0)
        })
    }

    pub fn update_challenge_description(
        &self,
        id: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE challenges SET description = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, description, ts(now)],
            )?;
            Ok(n > 0)
        })
    }

    pub fn update_challenge_daily_limit(&self, id: &str, limit: u32, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE challenges SET daily_task_limit = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, limit, ts(now)],
            )?;
            Ok(n > 0)
        })
    }

    pub fn update_challenge_hide_future(&self, id: &str, hide: bool, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE challenges SET hide_future_tasks = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, hide as i64, ts(now)],
            )?;
            Ok(n > 0)
        })
    }

    /// Bump `updated_at` (task edits count as challenge activity).
    pub fn touch_challenge(&self, id: &str, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.with_conn(|conn| touch_challenge_in(conn, id, now))
    }

    /// Delete a challenge; tasks, participants, completions and derived templates cascade.
    pub fn delete_challenge(&self, id: &str) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM challenges WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn sample_challenge(id: &str, creator: UserId) -> Challenge {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        Challenge {
            id: id.to_string(),
            name: format!("Challenge {id}"),
            description: String::new(),
            creator_id: creator,
            daily_task_limit: 0,
            hide_future_tasks: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_get_challenge() {
        let db = Database::open_in_memory().unwrap();
        let c = sample_challenge("ABCD1234", 1);
        db.insert_challenge(&c).unwrap();

        assert_eq!(db.get_challenge("ABCD1234").unwrap(), Some(c));
        assert!(db.challenge_exists("ABCD1234").unwrap());
        assert_eq!(db.get_challenge("ZZZZ9999").unwrap(), None);
    }

    #[test]
    fn test_duplicate_id_is_constraint_violation() {
        let db = Database::open_in_memory().unwrap();
        db.insert_challenge(&sample_challenge("ABCD1234", 1)).unwrap();
        let err = db.insert_challenge(&sample_challenge("ABCD1234", 2)).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn test_user_challenges_sorted_by_update() {
        let db = Database::open_in_memory().unwrap();
        db.insert_challenge(&sample_challenge("AAAA0001", 7)).unwrap();
        db.insert_challenge(&sample_challenge("AAAA0002", 7)).unwrap();
        db.insert_challenge(&sample_challenge("AAAA0003", 8)).unwrap();

        let later = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        db.update_challenge_name("AAAA0001", "Renamed", later).unwrap();

        let ids: Vec<String> = db.challenges_for_user(7).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["AAAA0001", "AAAA0002"]);
        assert_eq!(db.count_challenges_for_user(7).unwrap(), 2);
        assert_eq!(db.count_challenges_for_user(9).unwrap(), 0);

        db.update_challenge_hide_future("AAAA0002", true, later + Duration::seconds(1)).unwrap();
        let first = db.challenges_for_user(7).unwrap().remove(0);
        assert_eq!(first.id, "AAAA0002");
        assert!(first.hide_future_tasks);
    }
}
