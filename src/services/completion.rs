//! Completion tracking, current-task computation and daily pacing.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{debug, info, instrument};

use crate::domain::{Participant, Task, TaskCompletion};
use crate::error::ServiceResult;
use crate::storage::Database;

/// Result of a daily pacing check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyLimitStatus {
  pub allowed: bool,
  pub completed: usize,
  /// 0 means unlimited.
  pub limit: u32,
  pub time_to_reset: Duration,
  pub user_local_time: NaiveDateTime,
}

/// One row of the progress view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantProgress {
  pub participant: Participant,
  pub completed: usize,
  pub total: usize,
  pub current_task: i64,
}

/// The participant's next task: the first open task after the furthest one
/// they have done, else the first open gap, else 0 when everything is done.
pub fn current_task_num(completed: &HashSet<i64>, tasks: &[Task]) -> i64 {
  let last_done = tasks
    .iter()
    .filter(|t| completed.contains(&t.id))
    .map(|t| t.order_num)
    .max()
    .unwrap_or(0);

  let open = || tasks.iter().filter(|t| !completed.contains(&t.id));
  open()
    .filter(|t| t.order_num > last_done)
    .map(|t| t.order_num)
    .min()
    .or_else(|| open().map(|t| t.order_num).min())
    .unwrap_or(0)
}

/// True only for a non-empty task list that is fully done.
pub fn is_all_completed(completed_count: usize, total_tasks: usize) -> bool {
  total_tasks > 0 && completed_count >= total_tasks
}

/// The participant's local calendar day as a half-open UTC window, plus their local clock.
pub fn local_day_window(now: DateTime<Utc>, offset_minutes: i32) -> (DateTime<Utc>, DateTime<Utc>, NaiveDateTime) {
  let offset = Duration::minutes(offset_minutes as i64);
  let local = now.naive_utc() + offset;
  let local_midnight = local.date().and_hms_opt(0, 0, 0).unwrap_or(local);
  let start = local_midnight.and_utc() - offset;
  (start, start + Duration::hours(24), local)
}

#[derive(Clone)]
pub struct CompletionService {
  db: Arc<Database>,
}

impl CompletionService {
  pub fn new(db: Arc<Database>) -> Self { Self { db } }

  /// Mark done. Completing twice returns the same row.
  pub fn complete(&self, task_id: i64, participant_id: i64) -> ServiceResult<TaskCompletion> {
    self.complete_at(task_id, participant_id, Utc::now())
  }

  #[instrument(level = "info", skip(self, at))]
  pub fn complete_at(&self, task_id: i64, participant_id: i64, at: DateTime<Utc>) -> ServiceResult<TaskCompletion> {
    let c = self.db.insert_completion(task_id, participant_id, at)?;
    debug!(target: "challenge", task_id, participant_id, completion_id = c.id, "Task completed");
    Ok(c)
  }

  /// Remove a completion; absent rows are fine.
  #[instrument(level = "info", skip(self))]
  pub fn uncomplete(&self, task_id: i64, participant_id: i64) -> ServiceResult<()> {
    let removed = self.db.delete_completion(task_id, participant_id)?;
    debug!(target: "challenge", task_id, participant_id, removed, "Task uncompleted");
    Ok(())
  }

  pub fn is_completed(&self, task_id: i64, participant_id: i64) -> ServiceResult<bool> {
    Ok(self.db.get_completion(task_id, participant_id)?.is_some())
  }

  pub fn completed_task_ids(&self, participant_id: i64) -> ServiceResult<HashSet<i64>> {
    Ok(self.db.completed_task_ids(participant_id)?)
  }

  pub fn completed_count(&self, participant_id: i64) -> ServiceResult<usize> {
    Ok(self.db.count_completions(participant_id)?)
  }

  /// `current_task_num` against stored completions.
  pub fn current_task_num(&self, participant_id: i64, tasks: &[Task]) -> ServiceResult<i64> {
    Ok(current_task_num(&self.db.completed_task_ids(participant_id)?, tasks))
  }

  pub fn is_all_completed(&self, participant_id: i64, total_tasks: usize) -> ServiceResult<bool> {
    Ok(is_all_completed(self.db.count_completions(participant_id)?, total_tasks))
  }

  pub fn check_daily_limit(&self, participant: &Participant, limit: u32) -> ServiceResult<DailyLimitStatus> {
    self.check_daily_limit_at(participant, limit, Utc::now())
  }

  /// Count today's completions in the participant's local day.
  pub fn check_daily_limit_at(
    &self,
    participant: &Participant,
    limit: u32,
    now: DateTime<Utc>,
  ) -> ServiceResult<DailyLimitStatus> {
    let (start, end, local) = local_day_window(now, participant.time_offset_minutes);
    let time_to_reset = end - now;
    if limit == 0 {
      return Ok(DailyLimitStatus { allowed: true, completed: 0, limit, time_to_reset, user_local_time: local });
    }
    let completed = self.db.count_completions_between(participant.id, start, end)?;
    Ok(DailyLimitStatus {
      allowed: completed < limit as usize,
      completed,
      limit,
      time_to_reset,
      user_local_time: local,
    })
  }

  /// Per-participant progress for a challenge, most completed first.
  pub fn progress(&self, challenge_id: &str) -> ServiceResult<Vec<ParticipantProgress>> {
    let tasks = self.db.tasks_for_challenge(challenge_id)?;
    let done = self.db.completions_by_participant(challenge_id)?;
    let empty = HashSet::new();
    let mut rows: Vec<ParticipantProgress> = self
      .db
      .participants_for_challenge(challenge_id)?
      .into_iter()
      .map(|p| {
        let completed = done.get(&p.id).unwrap_or(&empty);
        ParticipantProgress {
          completed: completed.len(),
          total: tasks.len(),
          current_task: current_task_num(completed, &tasks),
          participant: p,
        }
      })
      .collect();
    rows.sort_by(|a, b| b.completed.cmp(&a.completed));
    Ok(rows)
  }

  /// Ids of participants who have finished every task of the challenge.
  pub fn finished_participants(&self, challenge_id: &str) -> ServiceResult<HashSet<i64>> {
    let total = self.db.count_tasks(challenge_id)?;
    let done = self.db.completions_by_participant(challenge_id)?;
    Ok(done.into_iter().filter(|(_, ids)| is_all_completed(ids.len(), total)).map(|(p, _)| p).collect())
  }

  /// Participants who are finished now but were not in `before`.
  #[instrument(level = "info", skip(self, before))]
  pub fn newly_finished(&self, challenge_id: &str, before: &HashSet<i64>) -> ServiceResult<Vec<Participant>> {
    let after = self.finished_participants(challenge_id)?;
    let fresh: Vec<Participant> = self
      .db
      .participants_for_challenge(challenge_id)?
      .into_iter()
      .filter(|p| after.contains(&p.id) && !before.contains(&p.id))
      .collect();
    if !fresh.is_empty() {
      info!(target: "challenge", %challenge_id, count = fresh.len(), "Participants finished after task removal");
    }
    Ok(fresh)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::TaskContent;
  use crate::services::challenge::{ChallengeService, NewChallenge};
  use crate::services::participant::ParticipantService;
  use crate::services::task::TaskService;
  use chrono::TimeZone;
  use proptest::prelude::*;

  fn task(id: i64, order: i64) -> Task {
    Task {
      id,
      challenge_id: "CHAL0001".into(),
      order_num: order,
      title: format!("t{order}"),
      description: String::new(),
      image_file_id: String::new(),
      created_at: Utc::now(),
    }
  }

  fn five() -> Vec<Task> {
    (1..=5).map(|i| task(i * 100, i)).collect()
  }

  #[test]
  fn current_task_skips_past_gaps() {
    let tasks = five();
    let done: HashSet<i64> = [100, 300].into();
    assert_eq!(current_task_num(&done, &tasks), 4);
  }

  #[test]
  fn current_task_falls_back_to_earliest_gap() {
    let tasks = five();
    let done: HashSet<i64> = [100, 300, 400, 500].into();
    assert_eq!(current_task_num(&done, &tasks), 2);
    let all: HashSet<i64> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(current_task_num(&all, &tasks), 0);
    assert_eq!(current_task_num(&HashSet::new(), &tasks), 1);
  }

  #[test]
  fn local_day_window_respects_offset() {
    // 23:30 UTC is already 02:30 next day at UTC+3
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
    let (start, end, local) = local_day_window(now, 180);
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 10, 21, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 11, 21, 0, 0).unwrap());
    assert_eq!(local.format("%H:%M").to_string(), "02:30");

    let (start, _, _) = local_day_window(now, -300);
    assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap());
  }

  proptest! {
    #[test]
    fn current_zero_iff_all_done(n in 1i64..20, mask in proptest::collection::vec(any::<bool>(), 20)) {
      let tasks: Vec<Task> = (1..=n).map(|i| task(i, i)).collect();
      let done: HashSet<i64> = tasks.iter().filter(|t| mask[(t.id - 1) as usize]).map(|t| t.id).collect();
      let current = current_task_num(&done, &tasks);
      prop_assert_eq!(current == 0, is_all_completed(done.len(), tasks.len()));
      if current != 0 {
        prop_assert!(tasks.iter().any(|t| t.order_num == current && !done.contains(&t.id)));
      }
    }
  }

  struct Fixture {
    completions: CompletionService,
    participants: ParticipantService,
    tasks: TaskService,
    challenge_id: String,
  }

  fn fixture(limit: u32) -> Fixture {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let c = ChallengeService::new(db.clone())
      .create(NewChallenge {
        name: "Steps".into(),
        description: String::new(),
        creator_id: 1,
        daily_task_limit: limit,
        hide_future_tasks: false,
      })
      .unwrap();
    let tasks = TaskService::new(db.clone());
    for i in 1..=5 {
      let content = TaskContent { title: format!("Task {i}"), description: String::new(), image_file_id: String::new() };
      tasks.create(&c.id, &content).unwrap();
    }
    Fixture {
      completions: CompletionService::new(db.clone()),
      participants: ParticipantService::new(db),
      tasks,
      challenge_id: c.id,
    }
  }

  #[test]
  fn complete_is_idempotent_and_uncomplete_clears() {
    let f = fixture(0);
    let p = f.participants.join(&f.challenge_id, 1, "John", "💪", 0).unwrap();
    let t = &f.tasks.list(&f.challenge_id).unwrap()[0];

    let a = f.completions.complete(t.id, p.id).unwrap();
    let b = f.completions.complete(t.id, p.id).unwrap();
    assert_eq!(a, b);
    assert_eq!(f.completions.completed_count(p.id).unwrap(), 1);

    f.completions.uncomplete(t.id, p.id).unwrap();
    f.completions.uncomplete(t.id, p.id).unwrap();
    assert_eq!(f.completions.completed_count(p.id).unwrap(), 0);
  }

  #[test]
  fn daily_limit_resets_at_local_midnight() {
    let f = fixture(3);
    let p = f.participants.join(&f.challenge_id, 1, "John", "💪", 0).unwrap();
    let tasks = f.tasks.list(&f.challenge_id).unwrap();
    let morning = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    for t in &tasks[..3] {
      f.completions.complete_at(t.id, p.id, morning).unwrap();
    }
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let status = f.completions.check_daily_limit_at(&p, 3, now).unwrap();
    assert!(!status.allowed);
    assert_eq!(status.completed, 3);
    assert_eq!(status.limit, 3);
    assert_eq!(status.time_to_reset, Duration::hours(14));

    let tomorrow = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 1).unwrap();
    let status = f.completions.check_daily_limit_at(&p, 3, tomorrow).unwrap();
    assert!(status.allowed);
    assert_eq!(status.completed, 0);

    let unlimited = f.completions.check_daily_limit_at(&p, 0, now).unwrap();
    assert!(unlimited.allowed);
  }

  #[test]
  fn progress_is_sorted_and_finishers_are_detected() {
    let f = fixture(0);
    let a = f.participants.join(&f.challenge_id, 1, "Ann", "💪", 0).unwrap();
    let b = f.participants.join(&f.challenge_id, 2, "Bob", "🔥", 0).unwrap();
    let tasks = f.tasks.list(&f.challenge_id).unwrap();
    for t in &tasks[..4] {
      f.completions.complete(t.id, b.id).unwrap();
    }
    f.completions.complete(tasks[0].id, a.id).unwrap();

    let rows = f.completions.progress(&f.challenge_id).unwrap();
    assert_eq!(rows[0].participant.id, b.id);
    assert_eq!((rows[0].completed, rows[0].total, rows[0].current_task), (4, 5, 5));
    assert_eq!(rows[1].current_task, 2);

    let before = f.completions.finished_participants(&f.challenge_id).unwrap();
    assert!(before.is_empty());
    f.tasks.delete(tasks[4].id, &f.challenge_id).unwrap();
    let fresh = f.completions.newly_finished(&f.challenge_id, &before).unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].id, b.id);

    let again = f.completions.newly_finished(&f.challenge_id, &f.completions.finished_participants(&f.challenge_id).unwrap()).unwrap();
    assert!(again.is_empty());
  }
}
