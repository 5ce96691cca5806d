//! Task completion rows.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::TaskCompletion;
use crate::error::DatabaseError;
use crate::storage::database::{col_ts, ts, Database};

fn completion_from_row(row: &Row<'_>) -> rusqlite::Result<TaskCompletion> {
    Ok(TaskCompletion {
        id: row.get(0)?,
        task_id: row.get(1)?,
        participant_id: row.get(2)?,
        completed_at: col_ts(row, 3)?,
    })
}

fn find_completion(conn: &Connection, task_id: i64, participant_id: i64) -> Result<Option<TaskCompletion>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, task_id, participant_id, completed_at FROM task_completions
             WHERE task_id = ?1 AND participant_id = ?2",
            params![task_id, participant_id],
            completion_from_row,
        )
        .optional()?)
}

impl Database {
    /// Insert a completion unless one exists; returns the stored row either way.
    pub fn insert_completion(
        &self,
        task_id: i64,
        participant_id: i64,
        at: DateTime<Utc>,
    ) -> Result<TaskCompletion, DatabaseError> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO task_completions (task_id, participant_id, completed_at)
                 VALUES (?1, ?2, ?3)",
                params![task_id, participant_id, ts(at)],
            )?;
            find_completion(tx, task_id, participant_id)?
                .ok_or_else(|| DatabaseError::QueryFailed("completion missing after insert".into()))
        })
    }

    pub fn get_completion(&self, task_id: i64, participant_id: i64) -> Result<Option<TaskCompletion>, DatabaseError> {
        self.with_conn(|conn| find_completion(conn, task_id, participant_id))
    }

    /// Returns whether a row was removed.
    pub fn delete_completion(&self, task_id: i64, participant_id: i64) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM task_completions WHERE task_id = ?1 AND participant_id = ?2",
                params![task_id, participant_id],
            )? > 0)
        })
    }

    pub fn completed_task_ids(&self, participant_id: i64) -> Result<HashSet<i64>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT task_id FROM task_completions WHERE participant_id = ?1")?;
            let rows = stmt.query_map(params![participant_id], |r| r.get(0))?;
            Ok(rows.collect::<Result<HashSet<i64>, _>>()?)
        })
    }

    pub fn count_completions(&self, participant_id: i64) -> Result<usize, DatabaseError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM task_completions WHERE participant_id = ?1",
                params![participant_id],
                |r| r.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Completions with `from <= completed_at < to`.
    pub fn count_completions_between(
        &self,
        participant_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM task_completions
                 WHERE participant_id = ?1 AND completed_at >= ?2 AND completed_at < ?3",
                params![participant_id, ts(from), ts(to)],
                |r| r.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Completed task ids per participant for a whole challenge.
    pub fn completions_by_participant(&self, challenge_id: &str) -> Result<HashMap<i64, HashSet<i64>>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT tc.participant_id, tc.task_id FROM task_completions tc
                 JOIN participants p ON p.id = tc.participant_id
                 WHERE p.challenge_id = ?1",
            )?;
            let rows = stmt.query_map(params![challenge_id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?;
            let mut out: HashMap<i64, HashSet<i64>> = HashMap::new();
            for row in rows {
                let (participant, task) = row?;
                out.entry(participant).or_default().insert(task);
            }
            Ok(out)
        })
    }

    /// Participant ids that completed a task.
    pub fn completers_of_task(&self, task_id: i64) -> Result<Vec<i64>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT participant_id FROM task_completions WHERE task_id = ?1 ORDER BY completed_at")?;
            let rows = stmt.query_map(params![task_id], |r| r.get(0))?;
            Ok(rows.collect::<Result<Vec<i64>, _>>()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskContent;
    use crate::storage::challenges::tests::sample_challenge;
    use crate::storage::participants::tests::join;
    use chrono::{Duration, TimeZone};

    fn setup() -> (Database, i64, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        db.insert_challenge(&sample_challenge("CHAL0001", 1)).unwrap();
        let c = TaskContent { title: "T".into(), description: String::new(), image_file_id: String::new() };
        let t1 = db.append_task("CHAL0001", &c, Utc::now()).unwrap();
        let t2 = db.append_task("CHAL0001", &c, Utc::now()).unwrap();
        let p = join(&db, "CHAL0001", 1, "John", "💪");
        (db, t1.id, t2.id, p.id)
    }

    #[test]
    fn test_insert_is_idempotent() {
        let (db, t1, _, p) = setup();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let first = db.insert_completion(t1, p, at).unwrap();
        let second = db.insert_completion(t1, p, at + Duration::hours(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.count_completions(p).unwrap(), 1);
    }

    #[test]
    fn test_delete_absent_is_not_an_error() {
        let (db, t1, _, p) = setup();
        assert!(!db.delete_completion(t1, p).unwrap());
        db.insert_completion(t1, p, Utc::now()).unwrap();
        assert!(db.delete_completion(t1, p).unwrap());
        assert_eq!(db.get_completion(t1, p).unwrap(), None);
    }

    #[test]
    fn test_window_count_is_half_open() {
        let (db, t1, t2, p) = setup();
        let day = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        db.insert_completion(t1, p, day).unwrap();
        db.insert_completion(t2, p, day + Duration::days(1)).unwrap();
        assert_eq!(db.count_completions_between(p, day, day + Duration::days(1)).unwrap(), 1);
    }

    #[test]
    fn test_cascades() {
        let (db, t1, t2, p) = setup();
        db.insert_completion(t1, p, Utc::now()).unwrap();
        db.insert_completion(t2, p, Utc::now()).unwrap();

        db.delete_task_and_renumber(t1, "CHAL0001", Utc::now(), |_| Vec::new()).unwrap();
        assert_eq!(db.completed_task_ids(p).unwrap(), HashSet::from([t2]));

        db.delete_participant(p).unwrap();
        assert!(db.completers_of_task(t2).unwrap().is_empty());
    }
}
