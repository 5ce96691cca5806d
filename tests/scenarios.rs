//! End-to-end conversations against an in-memory database.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use challenge_bot::conversation::{Controller, Incoming, Reply};
use challenge_bot::domain::{Challenge, TaskContent, UserId};
use challenge_bot::error::ServiceError;
use challenge_bot::notifier::Notice;
use challenge_bot::services::{NewChallenge, Services};
use challenge_bot::storage::Database;

fn task(title: &str) -> TaskContent {
  TaskContent { title: title.into(), description: String::new(), image_file_id: String::new() }
}

struct Harness {
  svc: Services,
  ctl: Controller,
}

impl Harness {
  fn new() -> Self {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let svc = Services::new(db);
    let ctl = Controller::new(svc.clone(), Some("ChallengeBot".into()));
    Self { svc, ctl }
  }

  fn start(&self, user: UserId, payload: &str) -> Reply {
    self.ctl.handle(user, Incoming::Start { payload: payload.into() })
  }

  fn text(&self, user: UserId, text: &str) -> Reply {
    self.ctl.handle(user, Incoming::Text(text.into()))
  }

  fn tap(&self, user: UserId, data: &str) -> Reply {
    self.ctl.handle(user, Incoming::Callback { id: "q".into(), data: data.into(), message_id: Some(1) })
  }

  fn state(&self, user: UserId) -> (String, String, String) {
    let s = self.svc.db.get_user_state(user).unwrap();
    (s.state, s.temp_data, s.current_challenge)
  }

  /// Challenge created by `creator` with `n` tasks, creator joined as Anna.
  fn challenge_with_tasks(&self, creator: UserId, n: usize) -> (Challenge, Vec<i64>) {
    let c = self
      .svc
      .challenges
      .create(NewChallenge {
        name: "Spring Sprint".into(),
        description: String::new(),
        creator_id: creator,
        daily_task_limit: 0,
        hide_future_tasks: false,
      })
      .unwrap();
    self.svc.participants.join(&c.id, creator, "Anna", "🌟", 0).unwrap();
    let ids = (1..=n)
      .map(|i| self.svc.tasks.create(&c.id, &task(&format!("Task {i}"))).unwrap().id)
      .collect();
    (c, ids)
  }

  fn titles(&self, challenge_id: &str) -> Vec<(i64, String)> {
    self.svc.tasks.list(challenge_id).unwrap().into_iter().map(|t| (t.order_num, t.title)).collect()
  }
}

#[test]
fn create_challenge_end_to_end() {
  let h = Harness::new();
  let me = 12345;

  h.start(me, "");
  h.tap(me, "create_challenge");
  h.text(me, "30-Day Fitness");
  h.tap(me, "skip");
  h.text(me, "John");
  h.text(me, "💪");
  h.text(me, "5");
  h.tap(me, "hide_future_no");
  let reply = h.text(me, "14:30");
  assert!(reply.last_text().contains("Challenge created"), "{:?}", reply.texts());

  let mine = h.svc.challenges.for_user(me).unwrap();
  assert_eq!(mine.len(), 1);
  let c = &mine[0];
  assert_eq!(c.name, "30-Day Fitness");
  assert_eq!(c.description, "");
  assert_eq!(c.daily_task_limit, 5);
  assert!(!c.hide_future_tasks);
  assert_eq!(c.creator_id, me);

  let p = h.svc.participants.get(&c.id, me).unwrap();
  assert_eq!((p.display_name.as_str(), p.emoji.as_str()), ("John", "💪"));
  assert!(p.notifications_enabled);

  assert_eq!(h.state(me), ("idle".to_string(), String::new(), c.id.clone()));
}

#[test]
fn join_by_deep_link_and_complete_out_of_order() {
  let h = Harness::new();
  let (c, tasks) = h.challenge_with_tasks(1001, 5);
  let bee = 2002;

  h.start(bee, &c.id);
  h.text(bee, "Sarah");
  h.text(bee, "🔥");
  let joined = h.tap(bee, "skip_sync_time");
  assert!(joined.notices.iter().any(|n| matches!(n, Notice::Joined { actor: 2002, .. })));

  let p = h.svc.participants.get(&c.id, bee).unwrap();
  assert_eq!(p.time_offset_minutes, 0);

  h.tap(bee, &format!("complete_task|{}", tasks[0]));
  let third = h.tap(bee, &format!("complete_task|{}", tasks[2]));
  assert!(third
    .notices
    .iter()
    .any(|n| matches!(n, Notice::TaskCompleted { actor: 2002, task_num: 3, .. })));

  let all = h.svc.tasks.list(&c.id).unwrap();
  assert_eq!(h.svc.completions.current_task_num(p.id, &all).unwrap(), 4);
  assert_eq!(h.state(bee).2, c.id);
}

#[test]
fn deleting_middle_task_compacts_order() {
  let h = Harness::new();
  let (c, tasks) = h.challenge_with_tasks(1001, 3);

  h.tap(1001, &format!("open_challenge|{}", c.id));
  let reply = h.tap(1001, &format!("confirm_delete_task|{}", tasks[1]));
  assert!(reply.last_text().contains("deleted"), "{:?}", reply.texts());

  assert_eq!(h.titles(&c.id), vec![(1, "Task 1".to_string()), (2, "Task 3".to_string())]);
}

#[test]
fn moving_last_task_to_the_top() {
  let h = Harness::new();
  let (c, tasks) = h.challenge_with_tasks(1001, 3);

  h.tap(1001, &format!("open_challenge|{}", c.id));
  h.tap(1001, &format!("reorder_position|{}|1", tasks[2]));

  assert_eq!(
    h.titles(&c.id),
    vec![(1, "Task 3".to_string()), (2, "Task 1".to_string()), (3, "Task 2".to_string())]
  );
}

#[test]
fn emoji_frees_up_after_change() {
  let h = Harness::new();
  let (c, _) = h.challenge_with_tasks(1001, 1);
  let anna = h.svc.participants.get(&c.id, 1001).unwrap();

  let clash = h.svc.participants.join(&c.id, 2002, "Sarah", "🌟", 0);
  assert!(matches!(clash, Err(ServiceError::EmojiTaken)));

  h.svc.participants.update_emoji(anna.id, &c.id, "🔥").unwrap();
  let sarah = h.svc.participants.join(&c.id, 2002, "Sarah", "🌟", 0).unwrap();
  assert_eq!(sarah.emoji, "🌟");
}

#[test]
fn daily_limit_resets_at_local_midnight() {
  let h = Harness::new();
  let c = h
    .svc
    .challenges
    .create(NewChallenge {
      name: "Three a day".into(),
      description: String::new(),
      creator_id: 1001,
      daily_task_limit: 3,
      hide_future_tasks: false,
    })
    .unwrap();
  let p = h.svc.participants.join(&c.id, 1001, "Anna", "🌟", 0).unwrap();
  let ids: Vec<i64> = (1..=4)
    .map(|i| h.svc.tasks.create(&c.id, &task(&format!("T{i}"))).unwrap().id)
    .collect();

  for (hour, id) in [9, 10, 11].into_iter().zip(&ids) {
    let at = Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap();
    h.svc.completions.complete_at(*id, p.id, at).unwrap();
  }

  let afternoon = Utc.with_ymd_and_hms(2026, 3, 10, 15, 0, 0).unwrap();
  let status = h.svc.completions.check_daily_limit_at(&p, 3, afternoon).unwrap();
  assert!(!status.allowed);
  assert_eq!((status.completed, status.limit), (3, 3));
  assert_eq!(status.time_to_reset, chrono::Duration::hours(9));

  let after_midnight = Utc.with_ymd_and_hms(2026, 3, 11, 0, 30, 0).unwrap();
  let status = h.svc.completions.check_daily_limit_at(&p, 3, after_midnight).unwrap();
  assert!(status.allowed);
  assert_eq!(status.completed, 0);
}

#[test]
fn deleting_a_challenge_clears_everyones_pointer() {
  let h = Harness::new();
  let (c, _) = h.challenge_with_tasks(1001, 2);
  h.svc.participants.join(&c.id, 2002, "Sarah", "🔥", 0).unwrap();
  h.tap(2002, &format!("open_challenge|{}", c.id));
  h.tap(3003, "create_challenge");

  h.tap(1001, &format!("open_challenge|{}", c.id));
  let reply = h.tap(1001, "confirm_delete_challenge");

  let recipients = reply.notices.iter().find_map(|n| match n {
    Notice::ChallengeDeleted { recipients, .. } => Some(recipients.clone()),
    _ => None,
  });
  assert!(recipients.unwrap().contains(&2002));
  assert!(h.svc.challenges.get(&c.id).is_err());

  assert_eq!(h.state(1001), ("idle".to_string(), String::new(), String::new()));
  assert_eq!(h.state(2002), ("idle".to_string(), String::new(), String::new()));
  // unrelated users keep their flow
  assert_eq!(h.state(3003).0, "awaiting_challenge_name");
}

#[test]
fn bad_input_keeps_the_step() {
  let h = Harness::new();
  let (c, _) = h.challenge_with_tasks(1001, 1);

  h.start(2002, &c.id);
  h.text(2002, "Sarah");
  let reply = h.text(2002, "not an emoji");
  assert_eq!(h.state(2002).0, "awaiting_participant_emoji");
  assert!(!reply.outbound.is_empty());

  let taken = h.text(2002, "🌟");
  assert_eq!(h.state(2002).0, "awaiting_participant_emoji");
  assert!(!taken.outbound.is_empty());

  h.tap(2002, "cancel");
  assert_eq!(h.state(2002).0, "idle");
  assert!(h.svc.participants.find(&c.id, 2002).unwrap().is_none());
}

#[test]
fn non_admin_cannot_reach_admin_actions() {
  let h = Harness::new();
  let (c, tasks) = h.challenge_with_tasks(1001, 2);
  h.svc.participants.join(&c.id, 2002, "Sarah", "🔥", 0).unwrap();

  h.tap(2002, &format!("open_challenge|{}", c.id));
  h.tap(2002, &format!("confirm_delete_task|{}", tasks[0]));
  h.tap(2002, "confirm_delete_challenge");

  assert_eq!(h.svc.tasks.count(&c.id).unwrap(), 2);
  assert!(h.svc.challenges.get(&c.id).is_ok());
}

#[test]
fn slash_commands_leave_the_flow() {
  let h = Harness::new();

  h.tap(12345, "create_challenge");
  h.text(12345, "Reading");
  assert_eq!(h.state(12345).0, "awaiting_challenge_description");

  h.ctl.handle(12345, Incoming::Command("cancel".into()));
  assert_eq!(h.state(12345).0, "idle");
  assert!(h.svc.challenges.for_user(12345).unwrap().is_empty());

  let help = h.ctl.handle(12345, Incoming::Command("help".into()));
  assert!(help.last_text().contains("How it works"));
  let unknown = h.ctl.handle(12345, Incoming::Command("frobnicate".into()));
  assert!(unknown.last_callbacks().contains(&"create_challenge"));
}

#[test]
fn opening_a_foreign_challenge_keeps_the_current_one() {
  let h = Harness::new();
  let (mine, _) = h.challenge_with_tasks(1001, 1);
  let (theirs, _) = h.challenge_with_tasks(2002, 1);

  h.tap(1001, &format!("open_challenge|{}", mine.id));
  let reply = h.tap(1001, &format!("open_challenge|{}", theirs.id));
  assert_eq!(h.state(1001).2, mine.id);
  let back = format!("open_challenge|{}", mine.id);
  assert!(reply.last_callbacks().contains(&back.as_str()), "{:?}", reply.last_callbacks());

  h.tap(1001, "open_challenge|ZZZZZZZZ");
  assert_eq!(h.state(1001).2, mine.id);
}
