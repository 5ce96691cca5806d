//! Challenge templates: the bank loaded at startup and snapshots saved by super admins.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::domain::{Template, TemplateDraft, TemplateTask, TemplateTaskDraft, UserId, MAX_TASKS_PER_CHALLENGE};
use crate::error::{DatabaseError, ServiceError, ServiceResult, ValidationError};
use crate::storage::Database;
use crate::validate;

#[derive(Clone)]
pub struct TemplateService {
  db: Arc<Database>,
}

fn clean(draft: &TemplateDraft) -> ServiceResult<TemplateDraft> {
  let name = validate::challenge_name(&draft.name)?;
  let description = validate::challenge_description(&draft.description)?;
  if draft.daily_task_limit > validate::DAILY_LIMIT_MAX {
    return Err(ValidationError::OutOfRange { max: validate::DAILY_LIMIT_MAX }.into());
  }
  if draft.tasks.len() > MAX_TASKS_PER_CHALLENGE {
    return Err(ServiceError::MaxTasksReached);
  }
  let mut tasks = Vec::with_capacity(draft.tasks.len());
  for t in &draft.tasks {
    let title = validate::task_title(&t.title)?;
    let description = t.description.trim().to_string();
    if description.chars().count() > validate::TASK_DESCRIPTION_HARD_CAP {
      return Err(ValidationError::TooLong { field: "Task description", max: validate::TASK_DESCRIPTION_HARD_CAP }.into());
    }
    tasks.push(TemplateTaskDraft { title, description, image_file_id: t.image_file_id.clone() });
  }
  Ok(TemplateDraft { name, description, daily_task_limit: draft.daily_task_limit, hide_future_tasks: draft.hide_future_tasks, tasks })
}

impl TemplateService {
  pub fn new(db: Arc<Database>) -> Self { Self { db } }

  pub fn list(&self) -> ServiceResult<Vec<Template>> {
    Ok(self.db.list_templates()?)
  }

  pub fn get(&self, id: i64) -> ServiceResult<(Template, Vec<TemplateTask>)> {
    let t = self.db.get_template(id)?.ok_or(ServiceError::TemplateNotFound)?;
    let tasks = self.db.template_tasks(id)?;
    Ok((t, tasks))
  }

  fn insert(&self, draft: &TemplateDraft, source: Option<&str>) -> ServiceResult<Template> {
    let draft = clean(draft)?;
    if self.db.template_name_exists(&draft.name)? {
      return Err(ServiceError::TemplateNameExists);
    }
    match self.db.insert_template(&draft, source, Utc::now()) {
      Ok(t) => Ok(t),
      Err(DatabaseError::ConstraintViolation(_)) => Err(ServiceError::TemplateNameExists),
      Err(e) => Err(e.into()),
    }
  }

  /// Snapshot a challenge and its tasks. Super admins only.
  #[instrument(level = "info", skip(self))]
  pub fn save_from_challenge(&self, challenge_id: &str, by: UserId) -> ServiceResult<Template> {
    if !self.db.is_super_admin(by)? {
      return Err(ServiceError::NotSuperAdmin);
    }
    let c = self.db.get_challenge(challenge_id)?.ok_or(ServiceError::ChallengeNotFound)?;
    let tasks = self
      .db
      .tasks_for_challenge(challenge_id)?
      .into_iter()
      .map(|t| TemplateTaskDraft { title: t.title, description: t.description, image_file_id: t.image_file_id })
      .collect();
    let draft = TemplateDraft {
      name: c.name,
      description: c.description,
      daily_task_limit: c.daily_task_limit,
      hide_future_tasks: c.hide_future_tasks,
      tasks,
    };
    let t = self.insert(&draft, Some(challenge_id))?;
    info!(target: "challenge", %challenge_id, template_id = t.id, "Challenge saved as template");
    Ok(t)
  }

  /// Insert bank entries whose names are not taken yet. Bad entries are logged and skipped.
  pub fn import_bank(&self, drafts: &[TemplateDraft]) -> ServiceResult<usize> {
    let mut added = 0;
    for d in drafts {
      match self.insert(d, None) {
        Ok(_) => added += 1,
        Err(ServiceError::TemplateNameExists) => {}
        Err(ServiceError::Database(e)) => return Err(e.into()),
        Err(e) => warn!(target: "challenge", name = %d.name, error = %e, "Skipping template bank entry"),
      }
    }
    if added > 0 {
      info!(target: "challenge", added, "Template bank imported");
    }
    Ok(added)
  }

  #[instrument(level = "info", skip(self))]
  pub fn delete(&self, id: i64, by: UserId) -> ServiceResult<()> {
    if !self.db.is_super_admin(by)? {
      return Err(ServiceError::NotSuperAdmin);
    }
    if !self.db.delete_template(id)? {
      return Err(ServiceError::TemplateNotFound);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::TaskContent;
  use crate::services::challenge::{ChallengeService, NewChallenge};

  fn draft(name: &str) -> TemplateDraft {
    TemplateDraft {
      name: name.into(),
      description: "d".into(),
      daily_task_limit: 1,
      hide_future_tasks: false,
      tasks: vec![TemplateTaskDraft { title: "first".into(), ..Default::default() }],
    }
  }

  #[test]
  fn bank_import_skips_existing_and_invalid() {
    let s = TemplateService::new(Arc::new(Database::open_in_memory().unwrap()));
    let bad = TemplateDraft { name: String::new(), ..draft("x") };
    assert_eq!(s.import_bank(&[draft("Yoga"), bad, draft("Run")]).unwrap(), 2);
    assert_eq!(s.import_bank(&[draft("Yoga")]).unwrap(), 0);
    let names: Vec<String> = s.list().unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["Run", "Yoga"]);
  }

  #[test]
  fn bank_import_skips_oversized_templates() {
    let s = TemplateService::new(Arc::new(Database::open_in_memory().unwrap()));
    let task = |i: usize| TemplateTaskDraft { title: format!("Day {i}"), ..Default::default() };
    let full = TemplateDraft { tasks: (1..=MAX_TASKS_PER_CHALLENGE).map(task).collect(), ..draft("Full") };
    let oversized = TemplateDraft { tasks: (1..=MAX_TASKS_PER_CHALLENGE + 10).map(task).collect(), ..draft("Huge") };

    assert_eq!(s.import_bank(&[full, oversized]).unwrap(), 1);
    let names: Vec<String> = s.list().unwrap().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["Full"]);
  }

  #[test]
  fn save_from_challenge_requires_super_admin() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let c = ChallengeService::new(db.clone())
      .create(NewChallenge { name: "Plank".into(), description: String::new(), creator_id: 1, daily_task_limit: 2, hide_future_tasks: true })
      .unwrap();
    db.append_task(&c.id, &TaskContent { title: "30s".into(), description: String::new(), image_file_id: String::new() }, Utc::now())
      .unwrap();
    let s = TemplateService::new(db.clone());

    assert!(matches!(s.save_from_challenge(&c.id, 1), Err(ServiceError::NotSuperAdmin)));
    db.insert_super_admin(1, Utc::now()).unwrap();
    let t = s.save_from_challenge(&c.id, 1).unwrap();
    let (got, tasks) = s.get(t.id).unwrap();
    assert_eq!(got.name, "Plank");
    assert_eq!(got.daily_task_limit, 2);
    assert_eq!(tasks.len(), 1);
    assert!(matches!(s.save_from_challenge(&c.id, 1), Err(ServiceError::TemplateNameExists)));

    s.delete(t.id, 1).unwrap();
    assert!(matches!(s.get(t.id), Err(ServiceError::TemplateNotFound)));
  }
}
