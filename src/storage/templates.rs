//! Template and template-task rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Template, TemplateDraft, TemplateTask};
use crate::error::DatabaseError;
use crate::storage::database::{col_bool, col_ts, stored_precision, ts, Database};

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        daily_task_limit: row.get::<_, i64>(3)?.max(0) as u32,
        hide_future_tasks: col_bool(row, 4)?,
        created_at: col_ts(row, 5)?,
    })
}

impl Database {
    /// Insert a template with its tasks in one transaction.
    pub fn insert_template(
        &self,
        draft: &TemplateDraft,
        source_challenge_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Template, DatabaseError> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO templates (name, description, daily_task_limit, hide_future_tasks, source_challenge_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    draft.name,
                    draft.description,
                    draft.daily_task_limit,
                    draft.hide_future_tasks as i64,
                    source_challenge_id,
                    ts(now)
                ],
            )?;
            let id = tx.last_insert_rowid();
            let mut stmt = tx.prepare(
                "INSERT INTO template_tasks (template_id, order_num, title, description, image_file_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (i, t) in draft.tasks.iter().enumerate() {
                stmt.execute(params![id, (i + 1) as i64, t.title, t.description, t.image_file_id])?;
            }
            Ok(Template {
                id,
                name: draft.name.clone(),
                description: draft.description.clone(),
                daily_task_limit: draft.daily_task_limit,
                hide_future_tasks: draft.hide_future_tasks,
                created_at: stored_precision(now),
            })
        })
    }

    pub fn get_template(&self, id: i64) -> Result<Option<Template>, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, description, daily_task_limit, hide_future_tasks, created_at
                     FROM templates WHERE id = ?1",
                    params![id],
                    template_from_row,
                )
                .optional()?)
        })
    }

    pub fn template_name_exists(&self, name: &str) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM templates WHERE name = ?1", params![name], |r| r.get(0))?;
            Ok(n > 0)
        })
    }

    pub fn list_templates(&self) -> Result<Vec<Template>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, daily_task_limit, hide_future_tasks, created_at
                 FROM templates ORDER BY name",
            )?;
            let rows = stmt.query_map([], template_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn template_tasks(&self, template_id: i64) -> Result<Vec<TemplateTask>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, template_id, order_num, title, description, image_file_id
                 FROM template_tasks WHERE template_id = ?1 ORDER BY order_num",
            )?;
            let rows = stmt.query_map(params![template_id], |r| {
                Ok(TemplateTask {
                    id: r.get(0)?,
                    template_id: r.get(1)?,
                    order_num: r.get(2)?,
                    title: r.get(3)?,
                    description: r.get(4)?,
                    image_file_id: r.get(5)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn delete_template(&self, id: i64) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM templates WHERE id = ?1", params![id])? > 0))
    }
}
