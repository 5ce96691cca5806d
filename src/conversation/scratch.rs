//! Per-flow scratch data persisted between turns as tagged JSON.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Values collected so far by the challenge creation flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateDraft {
  pub name: String,
  pub description: String,
  pub display_name: String,
  pub emoji: String,
  pub daily_limit: u32,
  pub hide_future: bool,
  /// Set when the flow started from a template.
  pub template_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinDraft {
  pub challenge_id: String,
  pub display_name: String,
  pub emoji: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDraft {
  pub title: String,
  pub image_file_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum Scratch {
  #[default]
  Empty,
  Create(CreateDraft),
  Join(JoinDraft),
  AddTask(TaskDraft),
  EditTask { task_id: i64 },
  Reorder { task_id: Option<i64> },
  /// Participant settings; a sync-time prompt in this flow updates the offset only.
  Settings,
}

impl Scratch {
  /// Serialized form stored in `user_states.temp_data`. Empty scratch is stored as "".
  pub fn encode(&self) -> String {
    if *self == Scratch::Empty {
      return String::new();
    }
    match serde_json::to_string(self) {
      Ok(s) => s,
      Err(e) => {
        warn!(target: "conversation", error = %e, "Scratch serialization failed; dropping it");
        String::new()
      }
    }
  }

  /// Lenient decode: unreadable data is treated as empty.
  pub fn decode(raw: &str) -> Scratch {
    if raw.trim().is_empty() {
      return Scratch::Empty;
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
      warn!(target: "conversation", error = %e, "Unreadable scratch; starting fresh");
      Scratch::Empty
    })
  }

  pub fn create(&self) -> CreateDraft {
    match self {
      Scratch::Create(d) => d.clone(),
      _ => CreateDraft::default(),
    }
  }

  pub fn join(&self) -> JoinDraft {
    match self {
      Scratch::Join(d) => d.clone(),
      _ => JoinDraft::default(),
    }
  }

  pub fn task(&self) -> TaskDraft {
    match self {
      Scratch::AddTask(d) => d.clone(),
      _ => TaskDraft::default(),
    }
  }

  pub fn edit_task_id(&self) -> Option<i64> {
    match self {
      Scratch::EditTask { task_id } => Some(*task_id),
      _ => None,
    }
  }

  pub fn reorder_task_id(&self) -> Option<i64> {
    match self {
      Scratch::Reorder { task_id } => *task_id,
      _ => None,
    }
  }
}
