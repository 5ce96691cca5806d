//! Task rows and the collision-free renumber primitive.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Task, TaskContent};
use crate::error::DatabaseError;
use crate::storage::challenges::touch_challenge_in;
use crate::storage::database::{col_ts, stored_precision, ts, Database};

const TASK_COLUMNS: &str = "id, challenge_id, order_num, title, description, image_file_id, created_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        challenge_id: row.get(1)?,
        order_num: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        image_file_id: row.get(5)?,
        created_at: col_ts(row, 6)?,
    })
}

/// Append a task at the tail of its challenge (`order_num = max + 1`).
pub(crate) fn append_task_in(
    conn: &Connection,
    challenge_id: &str,
    content: &TaskContent,
    now: DateTime<Utc>,
) -> Result<Task, DatabaseError> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(order_num), 0) + 1 FROM tasks WHERE challenge_id = ?1",
        params![challenge_id],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO tasks (challenge_id, order_num, title, description, image_file_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![challenge_id, next, content.title, content.description, content.image_file_id, ts(now)],
    )?;
    Ok(Task {
        id: conn.last_insert_rowid(),
        challenge_id: challenge_id.to_string(),
        order_num: next,
        title: content.title.clone(),
        description: content.description.clone(),
        image_file_id: content.image_file_id.clone(),
        created_at: stored_precision(now),
    })
}

fn tasks_in(conn: &Connection, challenge_id: &str) -> Result<Vec<Task>, DatabaseError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE challenge_id = ?1 ORDER BY order_num");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![challenge_id], task_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Phase one parks every touched row at `-new_order`, phase two writes the
/// final positive value. Negative and positive ranges are disjoint, so
/// `UNIQUE(challenge_id, order_num)` holds after every single statement.
fn renumber_in(conn: &Connection, updates: &[(i64, i64)]) -> Result<(), DatabaseError> {
    {
        let mut park = conn.prepare("UPDATE tasks SET order_num = ?2 WHERE id = ?1")?;
        for (id, order) in updates {
            park.execute(params![id, -order])?;
        }
    }
    let mut set = conn.prepare("UPDATE tasks SET order_num = ?2 WHERE id = ?1")?;
    for (id, order) in updates {
        if set.execute(params![id, order])? == 0 {
            return Err(DatabaseError::TransactionFailed(format!("task {id} vanished during renumber")));
        }
    }
    tracing::debug!(target: "storage", count = updates.len(), "Tasks renumbered");
    Ok(())
}

impl Database {
    /// Insert a task at the end of the challenge's list.
    pub fn append_task(
        &self,
        challenge_id: &str,
        content: &TaskContent,
        now: DateTime<Utc>,
    ) -> Result<Task, DatabaseError> {
        self.with_tx(|tx| append_task_in(tx, challenge_id, content, now))
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>, DatabaseError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], task_from_row).optional()?)
        })
    }

    /// All tasks of a challenge in order.
    pub fn tasks_for_challenge(&self, challenge_id: &str) -> Result<Vec<Task>, DatabaseError> {
        self.with_conn(|conn| tasks_in(conn, challenge_id))
    }

    pub fn count_tasks(&self, challenge_id: &str) -> Result<usize, DatabaseError> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM tasks WHERE challenge_id = ?1", params![challenge_id], |r| r.get(0))?;
            Ok(n as usize)
        })
    }

    /// Overwrite title, description and image. Order is not touched here.
    pub fn update_task_content(&self, id: i64, content: &TaskContent) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE tasks SET title = ?2, description = ?3, image_file_id = ?4 WHERE id = ?1",
                params![id, content.title, content.description, content.image_file_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Delete a task (completions cascade) and renumber the survivors in the
    /// same transaction. `plan` gets the remaining tasks in order and returns
    /// the `(task_id, new_order)` pairs to write. Returns `None` when the task
    /// is not in this challenge.
    pub fn delete_task_and_renumber(
        &self,
        id: i64,
        challenge_id: &str,
        now: DateTime<Utc>,
        plan: impl FnOnce(&[Task]) -> Vec<(i64, i64)>,
    ) -> Result<Option<Vec<(i64, i64)>>, DatabaseError> {
        self.with_tx(|tx| {
            let n = tx.execute(
                "DELETE FROM tasks WHERE id = ?1 AND challenge_id = ?2",
                params![id, challenge_id],
            )?;
            if n == 0 {
                return Ok(None);
            }
            let updates = plan(&tasks_in(tx, challenge_id)?);
            renumber_in(tx, &updates)?;
            touch_challenge_in(tx, challenge_id, now)?;
            Ok(Some(updates))
        })
    }

    /// Apply `(task_id, new_order)` pairs atomically.
    pub fn renumber_tasks(&self, updates: &[(i64, i64)]) -> Result<(), DatabaseError> {
        if updates.is_empty() {
            return Ok(());
        }
        self.with_tx(|tx| renumber_in(tx, updates))
    }
}
