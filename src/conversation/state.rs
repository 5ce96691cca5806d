//! Conversation states and their persisted tags.

/// Where a user is in a multi-step flow. `Idle` means no flow is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConversationState {
  #[default]
  Idle,

  // challenge creation
  AwaitingChallengeName,
  AwaitingChallengeDescription,
  AwaitingCreatorName,
  AwaitingCreatorEmoji,
  AwaitingDailyLimit,
  AwaitingHideFutureTasks,
  AwaitingCreatorSyncTime,

  // task authoring
  AwaitingTaskTitle,
  AwaitingTaskImage,
  AwaitingTaskDescription,
  AwaitingEditTitle,
  AwaitingEditDescription,
  AwaitingEditImage,
  ReorderSelectTask,
  ReorderSelectPosition,

  // join
  AwaitingChallengeId,
  AwaitingParticipantName,
  AwaitingParticipantEmoji,
  AwaitingSyncTime,

  // admin edits
  AwaitingNewChallengeName,
  AwaitingNewChallengeDescription,
  AwaitingNewDailyLimit,

  // participant settings
  AwaitingNewName,
  AwaitingNewEmoji,

  // super admin
  AwaitingSuperAdminId,
}

/// Which flow a state belongs to; decides where `cancel` lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
  None,
  Create,
  Join,
  Admin,
  Settings,
  SuperAdmin,
}

impl ConversationState {
  pub const ALL: [ConversationState; 26] = [
    Self::Idle,
    Self::AwaitingChallengeName,
    Self::AwaitingChallengeDescription,
    Self::AwaitingCreatorName,
    Self::AwaitingCreatorEmoji,
    Self::AwaitingDailyLimit,
    Self::AwaitingHideFutureTasks,
    Self::AwaitingCreatorSyncTime,
    Self::AwaitingTaskTitle,
    Self::AwaitingTaskImage,
    Self::AwaitingTaskDescription,
    Self::AwaitingEditTitle,
    Self::AwaitingEditDescription,
    Self::AwaitingEditImage,
    Self::ReorderSelectTask,
    Self::ReorderSelectPosition,
    Self::AwaitingChallengeId,
    Self::AwaitingParticipantName,
    Self::AwaitingParticipantEmoji,
    Self::AwaitingSyncTime,
    Self::AwaitingNewChallengeName,
    Self::AwaitingNewChallengeDescription,
    Self::AwaitingNewDailyLimit,
    Self::AwaitingNewName,
    Self::AwaitingNewEmoji,
    Self::AwaitingSuperAdminId,
  ];

  pub fn tag(self) -> &'static str {
    use ConversationState::*;
    match self {
      Idle => "idle",
      AwaitingChallengeName => "awaiting_challenge_name",
      AwaitingChallengeDescription => "awaiting_challenge_description",
      AwaitingCreatorName => "awaiting_creator_name",
      AwaitingCreatorEmoji => "awaiting_creator_emoji",
      AwaitingDailyLimit => "awaiting_daily_limit",
      AwaitingHideFutureTasks => "awaiting_hide_future_tasks",
      AwaitingCreatorSyncTime => "awaiting_creator_sync_time",
      AwaitingTaskTitle => "awaiting_task_title",
      AwaitingTaskImage => "awaiting_task_image",
      AwaitingTaskDescription => "awaiting_task_description",
      AwaitingEditTitle => "awaiting_edit_title",
      AwaitingEditDescription => "awaiting_edit_description",
      AwaitingEditImage => "awaiting_edit_image",
      ReorderSelectTask => "reorder_select_task",
      ReorderSelectPosition => "reorder_select_position",
      AwaitingChallengeId => "awaiting_challenge_id",
      AwaitingParticipantName => "awaiting_participant_name",
      AwaitingParticipantEmoji => "awaiting_participant_emoji",
      AwaitingSyncTime => "awaiting_sync_time",
      AwaitingNewChallengeName => "awaiting_new_challenge_name",
      AwaitingNewChallengeDescription => "awaiting_new_challenge_description",
      AwaitingNewDailyLimit => "awaiting_new_daily_limit",
      AwaitingNewName => "awaiting_new_name",
      AwaitingNewEmoji => "awaiting_new_emoji",
      AwaitingSuperAdminId => "awaiting_super_admin_id",
    }
  }

  pub fn from_tag(tag: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|s| s.tag() == tag)
  }

  pub fn is_idle(self) -> bool { self == Self::Idle }

  pub fn family(self) -> Family {
    use ConversationState::*;
    match self {
      Idle => Family::None,
      AwaitingChallengeName | AwaitingChallengeDescription | AwaitingCreatorName | AwaitingCreatorEmoji
      | AwaitingDailyLimit | AwaitingHideFutureTasks | AwaitingCreatorSyncTime => Family::Create,
      AwaitingChallengeId | AwaitingParticipantName | AwaitingParticipantEmoji | AwaitingSyncTime => Family::Join,
      AwaitingTaskTitle | AwaitingTaskImage | AwaitingTaskDescription | AwaitingEditTitle | AwaitingEditDescription
      | AwaitingEditImage | ReorderSelectTask | ReorderSelectPosition | AwaitingNewChallengeName
      | AwaitingNewChallengeDescription | AwaitingNewDailyLimit => Family::Admin,
      AwaitingNewName | AwaitingNewEmoji => Family::Settings,
      AwaitingSuperAdminId => Family::SuperAdmin,
    }
  }
}

impl std::fmt::Display for ConversationState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.tag())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tags_are_unique_and_parse_back() {
    let mut seen = std::collections::HashSet::new();
    for s in ConversationState::ALL {
      assert_eq!(ConversationState::from_tag(s.tag()), Some(s));
      seen.insert(s.tag());
    }
    assert_eq!(seen.len(), 26);
    assert_eq!(ConversationState::from_tag("awaiting_nothing"), None);
  }

  #[test]
  fn families() {
    assert_eq!(ConversationState::AwaitingTaskImage.family(), Family::Admin);
    assert_eq!(ConversationState::AwaitingCreatorSyncTime.family(), Family::Create);
    assert_eq!(ConversationState::AwaitingNewEmoji.family(), Family::Settings);
    assert!(ConversationState::default().is_idle());
  }
}
