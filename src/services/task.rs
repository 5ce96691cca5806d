//! Task authoring and ordering.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::domain::{Task, TaskContent, MAX_TASKS_PER_CHALLENGE};
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::services::ordering::{compaction_plan, move_plan, shuffle_plan};
use crate::storage::Database;
use crate::validate;

#[derive(Clone)]
pub struct TaskService {
  db: Arc<Database>,
}

fn check_content(content: &TaskContent) -> ServiceResult<TaskContent> {
  let title = validate::task_title(&content.title)?;
  let description = content.description.trim().to_string();
  if description.chars().count() > validate::TASK_DESCRIPTION_HARD_CAP {
    return Err(ValidationError::TooLong { field: "Task description", max: validate::TASK_DESCRIPTION_HARD_CAP }.into());
  }
  Ok(TaskContent { title, description, image_file_id: content.image_file_id.clone() })
}

impl TaskService {
  pub fn new(db: Arc<Database>) -> Self { Self { db } }

  /// Append a task at the end of the challenge.
  #[instrument(level = "info", skip(self, content), fields(title_len = content.title.len()))]
  pub fn create(&self, challenge_id: &str, content: &TaskContent) -> ServiceResult<Task> {
    let content = check_content(content)?;
    if self.db.get_challenge(challenge_id)?.is_none() {
      return Err(ServiceError::ChallengeNotFound);
    }
    if self.db.count_tasks(challenge_id)? >= MAX_TASKS_PER_CHALLENGE {
      return Err(ServiceError::MaxTasksReached);
    }
    let now = Utc::now();
    let task = self.db.append_task(challenge_id, &content, now)?;
    self.db.touch_challenge(challenge_id, now)?;
    info!(target: "challenge", %challenge_id, task_id = task.id, order = task.order_num, "Task created");
    Ok(task)
  }

  pub fn get(&self, id: i64) -> ServiceResult<Task> {
    self.db.get_task(id)?.ok_or(ServiceError::TaskNotFound)
  }

  /// Task by id, checked to belong to `challenge_id`.
  pub fn get_in(&self, id: i64, challenge_id: &str) -> ServiceResult<Task> {
    let t = self.get(id)?;
    if t.challenge_id != challenge_id {
      return Err(ServiceError::TaskNotFound);
    }
    Ok(t)
  }

  /// Tasks sorted by order.
  pub fn list(&self, challenge_id: &str) -> ServiceResult<Vec<Task>> {
    Ok(self.db.tasks_for_challenge(challenge_id)?)
  }

  pub fn count(&self, challenge_id: &str) -> ServiceResult<usize> {
    Ok(self.db.count_tasks(challenge_id)?)
  }

  /// Replace title, description and image. Order changes go through `move_task`.
  #[instrument(level = "info", skip(self, content))]
  pub fn update(&self, id: i64, content: &TaskContent) -> ServiceResult<Task> {
    let content = check_content(content)?;
    let existing = self.get(id)?;
    self.db.update_task_content(id, &content)?;
    self.db.touch_challenge(&existing.challenge_id, Utc::now())?;
    Ok(Task { title: content.title, description: content.description, image_file_id: content.image_file_id, ..existing })
  }

  /// Delete a task and close the gap in the ordering.
  #[instrument(level = "info", skip(self))]
  pub fn delete(&self, id: i64, challenge_id: &str) -> ServiceResult<Task> {
    let task = self.get_in(id, challenge_id)?;
    let plan = self
      .db
      .delete_task_and_renumber(id, challenge_id, Utc::now(), compaction_plan)?
      .ok_or(ServiceError::TaskNotFound)?;
    info!(target: "challenge", %challenge_id, task_id = id, shifted = plan.len(), "Task deleted");
    Ok(task)
  }

  /// Move a task to `new_pos` (1-based). Same position is a no-op.
  #[instrument(level = "info", skip(self))]
  pub fn move_task(&self, id: i64, challenge_id: &str, new_pos: i64) -> ServiceResult<()> {
    let task = self.get_in(id, challenge_id)?;
    let tasks = self.db.tasks_for_challenge(challenge_id)?;
    if new_pos < 1 || new_pos > tasks.len() as i64 {
      return Err(ValidationError::BadPosition { max: tasks.len() }.into());
    }
    if new_pos == task.order_num {
      debug!(target: "challenge", task_id = id, "Move to same position ignored");
      return Ok(());
    }
    let plan = move_plan(&tasks, id, new_pos);
    self.db.renumber_tasks(&plan)?;
    self.db.touch_challenge(challenge_id, Utc::now())?;
    info!(target: "challenge", %challenge_id, task_id = id, from = task.order_num, to = new_pos, "Task moved");
    Ok(())
  }

  /// Shuffle the whole list.
  #[instrument(level = "info", skip(self))]
  pub fn randomize_order(&self, challenge_id: &str) -> ServiceResult<()> {
    let tasks = self.db.tasks_for_challenge(challenge_id)?;
    let plan = shuffle_plan(&tasks, &mut rand::thread_rng());
    self.db.renumber_tasks(&plan)?;
    self.db.touch_challenge(challenge_id, Utc::now())?;
    info!(target: "challenge", %challenge_id, tasks = tasks.len(), "Tasks shuffled");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::challenge::{ChallengeService, NewChallenge};
  use proptest::prelude::*;

  fn setup() -> (TaskService, String) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let c = ChallengeService::new(db.clone())
      .create(NewChallenge {
        name: "Fitness".into(),
        description: String::new(),
        creator_id: 1,
        daily_task_limit: 0,
        hide_future_tasks: false,
      })
      .unwrap();
    (TaskService::new(db), c.id)
  }

  fn content(title: &str) -> TaskContent {
    TaskContent { title: title.into(), description: String::new(), image_file_id: String::new() }
  }

  fn titles(s: &TaskService, cid: &str) -> Vec<(String, i64)> {
    s.list(cid).unwrap().into_iter().map(|t| (t.title, t.order_num)).collect()
  }

  #[test]
  fn create_rejects_empty_title_and_overflow() {
    let (s, cid) = setup();
    assert!(matches!(s.create(&cid, &content("  ")), Err(ServiceError::Validation(_))));
    for i in 0..MAX_TASKS_PER_CHALLENGE {
      s.create(&cid, &content(&format!("t{i}"))).unwrap();
    }
    assert!(matches!(s.create(&cid, &content("overflow")), Err(ServiceError::MaxTasksReached)));
  }

  #[test]
  fn delete_middle_compacts() {
    let (s, cid) = setup();
    s.create(&cid, &content("A")).unwrap();
    let b = s.create(&cid, &content("B")).unwrap();
    s.create(&cid, &content("C")).unwrap();

    s.delete(b.id, &cid).unwrap();
    assert_eq!(titles(&s, &cid), vec![("A".into(), 1), ("C".into(), 2)]);
  }

  #[test]
  fn delete_twice_is_not_found() {
    let (s, cid) = setup();
    let a = s.create(&cid, &content("A")).unwrap();
    s.create(&cid, &content("B")).unwrap();

    s.delete(a.id, &cid).unwrap();
    assert!(matches!(s.delete(a.id, &cid), Err(ServiceError::TaskNotFound)));
    assert_eq!(titles(&s, &cid), vec![("B".into(), 1)]);
  }

  #[test]
  fn move_last_to_first() {
    let (s, cid) = setup();
    s.create(&cid, &content("A")).unwrap();
    s.create(&cid, &content("B")).unwrap();
    let c = s.create(&cid, &content("C")).unwrap();

    s.move_task(c.id, &cid, 1).unwrap();
    assert_eq!(titles(&s, &cid), vec![("C".into(), 1), ("A".into(), 2), ("B".into(), 3)]);

    assert!(matches!(s.move_task(c.id, &cid, 4), Err(ServiceError::Validation(_))));
    assert!(matches!(s.move_task(c.id, &cid, 0), Err(ServiceError::Validation(_))));
  }

  #[test]
  fn update_keeps_position() {
    let (s, cid) = setup();
    s.create(&cid, &content("A")).unwrap();
    let b = s.create(&cid, &content("B")).unwrap();
    let updated = s
      .update(b.id, &TaskContent { title: "B2".into(), description: "more".into(), image_file_id: "ph".into() })
      .unwrap();
    assert_eq!(updated.order_num, 2);
    assert_eq!(s.get(b.id).unwrap().description, "more");
    assert!(s.update(b.id, &content("")).is_err());
  }

  #[test]
  fn task_from_other_challenge_is_not_found() {
    let (s, cid) = setup();
    let t = s.create(&cid, &content("A")).unwrap();
    assert!(matches!(s.delete(t.id, "OTHER000"), Err(ServiceError::TaskNotFound)));
  }

  #[derive(Debug, Clone)]
  enum Op {
    Create,
    Delete(usize),
    Move(usize, usize),
    Shuffle,
  }

  fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
      3 => Just(Op::Create),
      1 => (0usize..64).prop_map(Op::Delete),
      2 => (0usize..64, 0usize..64).prop_map(|(a, b)| Op::Move(a, b)),
      1 => Just(Op::Shuffle),
    ]
  }

  proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ordering_stays_dense(ops in proptest::collection::vec(op(), 1..40)) {
      let (s, cid) = setup();
      let mut n = 0usize;
      for op in ops {
        let tasks = s.list(&cid).unwrap();
        match op {
          Op::Create => {
            s.create(&cid, &content(&format!("t{n}"))).unwrap();
            n += 1;
          }
          Op::Delete(i) if !tasks.is_empty() => {
            s.delete(tasks[i % tasks.len()].id, &cid).unwrap();
          }
          Op::Move(i, p) if !tasks.is_empty() => {
            let pos = (p % tasks.len()) as i64 + 1;
            s.move_task(tasks[i % tasks.len()].id, &cid, pos).unwrap();
          }
          Op::Shuffle => s.randomize_order(&cid).unwrap(),
          _ => {}
        }
        let orders: Vec<i64> = s.list(&cid).unwrap().iter().map(|t| t.order_num).collect();
        let expected: Vec<i64> = (1..=orders.len() as i64).collect();
        prop_assert_eq!(orders, expected);
      }
    }
  }
}
