//! Domain models: challenges, tasks, participants, completions, super-admins and templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many challenges a user may own or take part in at once.
pub const MAX_CHALLENGES_PER_USER: usize = 10;
/// Hard cap on members of one challenge (creator included).
pub const MAX_PARTICIPANTS_PER_CHALLENGE: usize = 50;
/// Hard cap on tasks of one challenge.
pub const MAX_TASKS_PER_CHALLENGE: usize = 50;

/// Telegram user id.
pub type UserId = i64;

/// A named, ordered list of tasks shared by a squad.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
  pub id: String,
  pub name: String,
  #[serde(default)] pub description: String,
  pub creator_id: UserId,
  /// 0 means unlimited.
  pub daily_task_limit: u32,
  pub hide_future_tasks: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Challenge {
  pub fn is_creator(&self, user: UserId) -> bool { self.creator_id == user }
}

/// One work item. `order_num` is 1-based and dense within its challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub id: i64,
  pub challenge_id: String,
  pub order_num: i64,
  pub title: String,
  #[serde(default)] pub description: String,
  /// Opaque platform media id; empty when the task has no picture.
  #[serde(default)] pub image_file_id: String,
  pub created_at: DateTime<Utc>,
}

impl Task {
  pub fn has_image(&self) -> bool { !self.image_file_id.is_empty() }
}

/// Editable task content. Order is deliberately absent: reordering goes through
/// the task service's move/shuffle operations only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskContent {
  pub title: String,
  pub description: String,
  pub image_file_id: String,
}

impl From<&Task> for TaskContent {
  fn from(t: &Task) -> Self {
    Self { title: t.title.clone(), description: t.description.clone(), image_file_id: t.image_file_id.clone() }
  }
}

/// A user's membership in one challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
  pub id: i64,
  pub challenge_id: String,
  pub telegram_id: UserId,
  pub display_name: String,
  pub emoji: String,
  pub notifications_enabled: bool,
  /// Minutes to add to UTC to get the participant's wall clock.
  pub time_offset_minutes: i32,
  pub joined_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletion {
  pub id: i64,
  pub task_id: i64,
  pub participant_id: i64,
  pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperAdmin {
  pub id: i64,
  pub telegram_id: UserId,
  pub created_at: DateTime<Utc>,
}

/// Reusable challenge blueprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
  pub id: i64,
  pub name: String,
  #[serde(default)] pub description: String,
  pub daily_task_limit: u32,
  pub hide_future_tasks: bool,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTask {
  pub id: i64,
  pub template_id: i64,
  pub order_num: i64,
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub image_file_id: String,
}

/// Template plus its tasks, as accepted by the template bank and the "save as template" action.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TemplateDraft {
  pub name: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub daily_task_limit: u32,
  #[serde(default)] pub hide_future_tasks: bool,
  #[serde(default)] pub tasks: Vec<TemplateTaskDraft>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TemplateTaskDraft {
  pub title: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub image_file_id: String,
}
