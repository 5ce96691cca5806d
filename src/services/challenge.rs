//! Challenge lifecycle: creation, admin edits, deletion, join eligibility, templates.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::domain::{
  Challenge, TaskContent, UserId, MAX_CHALLENGES_PER_USER, MAX_PARTICIPANTS_PER_CHALLENGE,
  MAX_TASKS_PER_CHALLENGE,
};
use crate::error::{DatabaseError, ServiceError, ServiceResult, ValidationError};
use crate::ids::generate_challenge_id;
use crate::storage::{stored_precision, Database};
use crate::validate;

const ID_ATTEMPTS: usize = 10;

/// Input for `ChallengeService::create`.
#[derive(Debug, Clone)]
pub struct NewChallenge {
  pub name: String,
  pub description: String,
  pub creator_id: UserId,
  pub daily_task_limit: u32,
  pub hide_future_tasks: bool,
}

#[derive(Clone)]
pub struct ChallengeService {
  db: Arc<Database>,
}

impl ChallengeService {
  pub fn new(db: Arc<Database>) -> Self { Self { db } }

  /// Create a challenge with a fresh unique id. The creator still has to join it.
  #[instrument(level = "info", skip(self, new), fields(creator = new.creator_id))]
  pub fn create(&self, new: NewChallenge) -> ServiceResult<Challenge> {
    let name = validate::challenge_name(&new.name)?;
    let description = validate::challenge_description(&new.description)?;
    if new.daily_task_limit > validate::DAILY_LIMIT_MAX {
      return Err(ValidationError::OutOfRange { max: validate::DAILY_LIMIT_MAX }.into());
    }
    if self.db.count_challenges_for_user(new.creator_id)? >= MAX_CHALLENGES_PER_USER {
      return Err(ServiceError::MaxChallengesReached);
    }

    let now = stored_precision(Utc::now());
    for attempt in 1..=ID_ATTEMPTS {
      let id = generate_challenge_id();
      if self.db.challenge_exists(&id)? {
        warn!(target: "challenge", %id, attempt, "Challenge id collision; retrying");
        continue;
      }
      let challenge = Challenge {
        id,
        name: name.clone(),
        description: description.clone(),
        creator_id: new.creator_id,
        daily_task_limit: new.daily_task_limit,
        hide_future_tasks: new.hide_future_tasks,
        created_at: now,
        updated_at: now,
      };
      match self.db.insert_challenge(&challenge) {
        Ok(()) => {
          info!(target: "challenge", id = %challenge.id, "Challenge created");
          return Ok(challenge);
        }
        Err(DatabaseError::ConstraintViolation(_)) => {
          warn!(target: "challenge", id = %challenge.id, attempt, "Challenge id taken concurrently; retrying");
        }
        Err(e) => return Err(e.into()),
      }
    }
    Err(ServiceError::IdGenerationExhausted(ID_ATTEMPTS))
  }

  pub fn get(&self, id: &str) -> ServiceResult<Challenge> {
    self.db.get_challenge(id)?.ok_or(ServiceError::ChallengeNotFound)
  }

  /// Challenges the user created or joined, most recently updated first.
  pub fn for_user(&self, user: UserId) -> ServiceResult<Vec<Challenge>> {
    Ok(self.db.challenges_for_user(user)?)
  }

  /// Structural admin check: the creator is the admin.
  pub fn is_admin(&self, challenge: &Challenge, user: UserId) -> bool {
    challenge.is_creator(user)
  }

  /// Admin or super-admin; anything else is `NotAdmin`.
  pub fn ensure_can_manage(&self, challenge: &Challenge, user: UserId) -> ServiceResult<()> {
    if self.is_admin(challenge, user) || self.db.is_super_admin(user)? {
      Ok(())
    } else {
      Err(ServiceError::NotAdmin)
    }
  }

  fn managed(&self, id: &str, user: UserId) -> ServiceResult<Challenge> {
    let c = self.get(id)?;
    self.ensure_can_manage(&c, user)?;
    Ok(c)
  }

  #[instrument(level = "info", skip(self, name))]
  pub fn update_name(&self, id: &str, user: UserId, name: &str) -> ServiceResult<()> {
    self.managed(id, user)?;
    let name = validate::challenge_name(name)?;
    self.db.update_challenge_name(id, &name, Utc::now())?;
    Ok(())
  }

  #[instrument(level = "info", skip(self, description))]
  pub fn update_description(&self, id: &str, user: UserId, description: &str) -> ServiceResult<()> {
    self.managed(id, user)?;
    let description = validate::challenge_description(description)?;
    self.db.update_challenge_description(id, &description, Utc::now())?;
    Ok(())
  }

  #[instrument(level = "info", skip(self))]
  pub fn update_daily_limit(&self, id: &str, user: UserId, limit: u32) -> ServiceResult<()> {
    self.managed(id, user)?;
    if limit > validate::DAILY_LIMIT_MAX {
      return Err(ValidationError::OutOfRange { max: validate::DAILY_LIMIT_MAX }.into());
    }
    self.db.update_challenge_daily_limit(id, limit, Utc::now())?;
    Ok(())
  }

  #[instrument(level = "info", skip(self))]
  pub fn update_hide_future_tasks(&self, id: &str, user: UserId, hide: bool) -> ServiceResult<()> {
    self.managed(id, user)?;
    self.db.update_challenge_hide_future(id, hide, Utc::now())?;
    Ok(())
  }

  /// Flip the flag; returns the new value.
  #[instrument(level = "info", skip(self))]
  pub fn toggle_hide_future_tasks(&self, id: &str, user: UserId) -> ServiceResult<bool> {
    let c = self.managed(id, user)?;
    let hide = !c.hide_future_tasks;
    self.db.update_challenge_hide_future(id, hide, Utc::now())?;
    Ok(hide)
  }

  /// Delete the challenge and everything under it. Returns the deleted row.
  /// Callers reset user states pointing at it and notify members.
  #[instrument(level = "info", skip(self))]
  pub fn delete(&self, id: &str, user: UserId) -> ServiceResult<Challenge> {
    let c = self.managed(id, user)?;
    self.db.delete_challenge(id)?;
    info!(target: "challenge", %id, by = user, "Challenge deleted");
    Ok(c)
  }

  /// Whether `user` may join: fails `ChallengeNotFound`, `AlreadyMember`,
  /// `ChallengeFull` or `MaxChallengesReached`.
  pub fn can_join(&self, id: &str, user: UserId) -> ServiceResult<Challenge> {
    let c = self.get(id)?;
    if self.db.get_participant(id, user)?.is_some() {
      return Err(ServiceError::AlreadyMember);
    }
    if self.db.count_participants(id)? >= MAX_PARTICIPANTS_PER_CHALLENGE {
      return Err(ServiceError::ChallengeFull);
    }
    if self.db.count_challenges_for_user(user)? >= MAX_CHALLENGES_PER_USER {
      return Err(ServiceError::MaxChallengesReached);
    }
    Ok(c)
  }

  /// Create a challenge from a template and copy its tasks in order.
  /// If any task copy fails, the half-built challenge is deleted again.
  #[instrument(level = "info", skip(self, name))]
  pub fn create_from_template(&self, template_id: i64, name: &str, creator: UserId) -> ServiceResult<Challenge> {
    let template = self.db.get_template(template_id)?.ok_or(ServiceError::TemplateNotFound)?;
    let tasks = self.db.template_tasks(template_id)?;
    if tasks.len() > MAX_TASKS_PER_CHALLENGE {
      return Err(ServiceError::MaxTasksReached);
    }

    let challenge = self.create(NewChallenge {
      name: name.to_string(),
      description: template.description.clone(),
      creator_id: creator,
      daily_task_limit: template.daily_task_limit,
      hide_future_tasks: template.hide_future_tasks,
    })?;

    let now = Utc::now();
    for t in &tasks {
      let content = TaskContent {
        title: t.title.clone(),
        description: t.description.clone(),
        image_file_id: t.image_file_id.clone(),
      };
      if let Err(e) = self.db.append_task(&challenge.id, &content, now) {
        warn!(target: "challenge", id = %challenge.id, template_id, error = %e, "Template copy failed; rolling back");
        if let Err(cleanup) = self.db.delete_challenge(&challenge.id) {
          warn!(target: "challenge", id = %challenge.id, error = %cleanup, "Rollback delete failed");
        }
        return Err(e.into());
      }
    }

    info!(target: "challenge", id = %challenge.id, template_id, tasks = tasks.len(), "Challenge created from template");
    Ok(challenge)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{TemplateDraft, TemplateTaskDraft};
  use crate::ids::is_valid_challenge_id;
  use crate::storage::NewParticipant;

  fn svc() -> (Arc<Database>, ChallengeService) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    (db.clone(), ChallengeService::new(db))
  }

  fn new(name: &str, creator: UserId) -> NewChallenge {
    NewChallenge {
      name: name.into(),
      description: String::new(),
      creator_id: creator,
      daily_task_limit: 0,
      hide_future_tasks: false,
    }
  }

  #[test]
  fn create_generates_valid_unique_ids() {
    let (_db, s) = svc();
    let a = s.create(new("A", 1)).unwrap();
    let b = s.create(new("B", 2)).unwrap();
    assert!(is_valid_challenge_id(&a.id));
    assert_ne!(a.id, b.id);
    assert_eq!(s.get(&a.id).unwrap(), a);
  }

  #[test]
  fn create_enforces_per_user_quota() {
    let (_db, s) = svc();
    for i in 0..MAX_CHALLENGES_PER_USER {
      s.create(new(&format!("C{i}"), 1)).unwrap();
    }
    assert!(matches!(s.create(new("one more", 1)), Err(ServiceError::MaxChallengesReached)));
  }

  #[test]
  fn create_validates_name() {
    let (_db, s) = svc();
    assert!(matches!(s.create(new("  ", 1)), Err(ServiceError::Validation(_))));
    assert!(matches!(s.create(new(&"x".repeat(51), 1)), Err(ServiceError::Validation(_))));
  }

  #[test]
  fn only_admin_or_super_admin_can_edit() {
    let (db, s) = svc();
    let c = s.create(new("A", 1)).unwrap();

    assert!(matches!(s.update_name(&c.id, 2, "Hijack"), Err(ServiceError::NotAdmin)));
    s.update_name(&c.id, 1, "Renamed").unwrap();
    assert_eq!(s.get(&c.id).unwrap().name, "Renamed");

    db.insert_super_admin(2, Utc::now()).unwrap();
    s.update_description(&c.id, 2, "by super admin").unwrap();
    assert_eq!(s.get(&c.id).unwrap().description, "by super admin");

    assert!(s.toggle_hide_future_tasks(&c.id, 1).unwrap());
    assert!(!s.toggle_hide_future_tasks(&c.id, 1).unwrap());
    s.update_daily_limit(&c.id, 1, 7).unwrap();
    assert_eq!(s.get(&c.id).unwrap().daily_task_limit, 7);
    assert!(s.update_daily_limit(&c.id, 1, 51).is_err());
  }

  #[test]
  fn can_join_reports_reasons() {
    let (db, s) = svc();
    let c = s.create(new("A", 1)).unwrap();
    assert!(matches!(s.can_join("NOPE0000", 2), Err(ServiceError::ChallengeNotFound)));

    db.insert_participant(
      &NewParticipant { challenge_id: &c.id, telegram_id: 1, display_name: "A", emoji: "💪", time_offset_minutes: 0 },
      Utc::now(),
    )
    .unwrap();
    assert!(matches!(s.can_join(&c.id, 1), Err(ServiceError::AlreadyMember)));
    assert!(s.can_join(&c.id, 2).is_ok());
  }

  #[test]
  fn can_join_rejects_full_challenge() {
    let (db, s) = svc();
    let c = s.create(new("A", 1)).unwrap();
    for i in 0..MAX_PARTICIPANTS_PER_CHALLENGE as i64 {
      let emoji = char::from_u32(0x1F600 + i as u32).unwrap().to_string();
      db.insert_participant(
        &NewParticipant { challenge_id: &c.id, telegram_id: 100 + i, display_name: "P", emoji: &emoji, time_offset_minutes: 0 },
        Utc::now(),
      )
      .unwrap();
    }
    assert!(matches!(s.can_join(&c.id, 2), Err(ServiceError::ChallengeFull)));
  }

  #[test]
  fn delete_requires_admin() {
    let (_db, s) = svc();
    let c = s.create(new("A", 1)).unwrap();
    assert!(matches!(s.delete(&c.id, 2), Err(ServiceError::NotAdmin)));
    s.delete(&c.id, 1).unwrap();
    assert!(matches!(s.get(&c.id), Err(ServiceError::ChallengeNotFound)));
  }

  #[test]
  fn create_from_template_copies_tasks() {
    let (db, s) = svc();
    let draft = TemplateDraft {
      name: "Morning".into(),
      description: "wake up".into(),
      daily_task_limit: 1,
      hide_future_tasks: true,
      tasks: vec![
        TemplateTaskDraft { title: "Stretch".into(), ..Default::default() },
        TemplateTaskDraft { title: "Run".into(), ..Default::default() },
      ],
    };
    let t = db.insert_template(&draft, None, Utc::now()).unwrap();

    let c = s.create_from_template(t.id, "My mornings", 9).unwrap();
    assert_eq!(c.name, "My mornings");
    assert_eq!(c.description, "wake up");
    assert!(c.hide_future_tasks);
    let titles: Vec<String> = db.tasks_for_challenge(&c.id).unwrap().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["Stretch", "Run"]);

    assert!(matches!(s.create_from_template(999, "x", 9), Err(ServiceError::TemplateNotFound)));
  }

  #[test]
  fn create_from_template_respects_task_limit() {
    let (db, s) = svc();
    let draft = TemplateDraft {
      name: "Marathon".into(),
      tasks: (1..=MAX_TASKS_PER_CHALLENGE + 10)
        .map(|i| TemplateTaskDraft { title: format!("Km {i}"), ..Default::default() })
        .collect(),
      ..Default::default()
    };
    let t = db.insert_template(&draft, None, Utc::now()).unwrap();

    assert!(matches!(s.create_from_template(t.id, "Too long", 9), Err(ServiceError::MaxTasksReached)));
    assert!(s.for_user(9).unwrap().is_empty());
  }
}
