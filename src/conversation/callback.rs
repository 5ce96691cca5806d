//! Callback payloads: `action|arg|...`, optionally prefixed by a form feed.

use crate::domain::UserId;

/// Every button action the bot understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  // root
  MainMenu,
  CreateChallenge,
  JoinChallenge,
  MyChallenges,
  OpenChallenge(String),
  FromTemplate,
  UseTemplate(i64),
  Help,

  // in-flow (state preserving)
  SelectEmoji(String),
  Skip,
  SkipDailyLimit,
  SkipCreatorSyncTime,
  SkipSyncTime,
  HideFutureYes,
  HideFutureNo,
  Cancel,

  // participant
  CurrentTask,
  TaskList,
  ShowTask(i64),
  CompleteTask(i64),
  UncompleteTask(i64),
  Progress,
  ShareId,
  Settings,
  ChangeName,
  ChangeEmoji,
  ChangeSyncTime,
  ToggleNotifications,
  LeaveChallenge,
  ConfirmLeave,

  // challenge admin
  AdminPanel,
  AddTask,
  EditTasks,
  EditTask(i64),
  EditTaskTitle(i64),
  EditTaskDescription(i64),
  EditTaskImage(i64),
  DeleteTask(i64),
  ConfirmDeleteTask(i64),
  ReorderTasks,
  ReorderSelect(i64),
  /// task id, 1-based target position
  ReorderPosition(i64, i64),
  RandomizeTasks,
  ConfirmRandomize,
  EditChallengeName,
  EditChallengeDescription,
  EditDailyLimit,
  ToggleHideFuture,
  DeleteChallenge,
  ConfirmDeleteChallenge,

  // super admin
  SuperAdminPanel,
  AllChallenges,
  ObserveChallenge(String),
  ListSuperAdmins,
  GrantSuperAdmin,
  RevokeSuperAdmin(UserId),
  SaveAsTemplate,
  ManageTemplates,
  DeleteTemplate(i64),
}

/// A raw callback split into its action tag and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackData<'a> {
  pub action: &'a str,
  pub args: Vec<&'a str>,
}

/// Strip the optional leading form feed and split on `|`.
pub fn split(data: &str) -> CallbackData<'_> {
  let data = data.strip_prefix('\u{000C}').unwrap_or(data);
  let mut parts = data.split('|');
  let action = parts.next().unwrap_or_default().trim();
  CallbackData { action, args: parts.collect() }
}

impl Action {
  /// Parse a callback payload; unknown actions and malformed arguments give `None`.
  pub fn parse(data: &str) -> Option<Action> {
    use Action::*;
    let cb = split(data);
    let text = |i: usize| cb.args.get(i).filter(|s| !s.is_empty()).map(|s| s.to_string());
    let num = |i: usize| cb.args.get(i).and_then(|s| s.parse::<i64>().ok());

    Some(match cb.action {
      "main_menu" => MainMenu,
      "create_challenge" => CreateChallenge,
      "join_challenge" => JoinChallenge,
      "my_challenges" => MyChallenges,
      "open_challenge" => OpenChallenge(text(0)?),
      "from_template" => FromTemplate,
      "use_template" => UseTemplate(num(0)?),
      "help" => Help,

      "select_emoji" => SelectEmoji(text(0)?),
      "skip" => Skip,
      "skip_daily_limit" => SkipDailyLimit,
      "skip_creator_sync_time" => SkipCreatorSyncTime,
      "skip_sync_time" => SkipSyncTime,
      "hide_future_yes" => HideFutureYes,
      "hide_future_no" => HideFutureNo,
      "cancel" => Cancel,

      "current_task" => CurrentTask,
      "task_list" => TaskList,
      "show_task" => ShowTask(num(0)?),
      "complete_task" => CompleteTask(num(0)?),
      "uncomplete_task" => UncompleteTask(num(0)?),
      "progress" | "participants" => Progress,
      "share_id" => ShareId,
      "settings" => Settings,
      "change_name" => ChangeName,
      "change_emoji" => ChangeEmoji,
      "change_sync_time" => ChangeSyncTime,
      "toggle_notifications" => ToggleNotifications,
      "leave_challenge" => LeaveChallenge,
      "confirm_leave" => ConfirmLeave,

      "admin_panel" => AdminPanel,
      "add_task" => AddTask,
      "edit_tasks" => EditTasks,
      "edit_task" => EditTask(num(0)?),
      "edit_task_title" => EditTaskTitle(num(0)?),
      "edit_task_description" => EditTaskDescription(num(0)?),
      "edit_task_image" => EditTaskImage(num(0)?),
      "delete_task" => DeleteTask(num(0)?),
      "confirm_delete_task" => ConfirmDeleteTask(num(0)?),
      "reorder_tasks" => ReorderTasks,
      "reorder_select" => ReorderSelect(num(0)?),
      "reorder_position" => ReorderPosition(num(0)?, num(1)?),
      "randomize_tasks" => RandomizeTasks,
      "confirm_randomize" => ConfirmRandomize,
      "edit_challenge_name" => EditChallengeName,
      "edit_challenge_description" => EditChallengeDescription,
      "edit_daily_limit" => EditDailyLimit,
      "toggle_hide_future" => ToggleHideFuture,
      "delete_challenge" => DeleteChallenge,
      "confirm_delete_challenge" => ConfirmDeleteChallenge,

      "super_admin_panel" => SuperAdminPanel,
      "all_challenges" => AllChallenges,
      "observe_challenge" => ObserveChallenge(text(0)?),
      "list_super_admins" => ListSuperAdmins,
      "grant_super_admin" => GrantSuperAdmin,
      "revoke_super_admin" => RevokeSuperAdmin(num(0)?),
      "save_as_template" => SaveAsTemplate,
      "manage_templates" => ManageTemplates,
      "delete_template" => DeleteTemplate(num(0)?),
      _ => return None,
    })
  }

  /// Action tag as it appears on the wire.
  pub fn tag(&self) -> &'static str {
    use Action::*;
    match self {
      MainMenu => "main_menu",
      CreateChallenge => "create_challenge",
      JoinChallenge => "join_challenge",
      MyChallenges => "my_challenges",
      OpenChallenge(_) => "open_challenge",
      FromTemplate => "from_template",
      UseTemplate(_) => "use_template",
      Help => "help",
      SelectEmoji(_) => "select_emoji",
      Skip => "skip",
      SkipDailyLimit => "skip_daily_limit",
      SkipCreatorSyncTime => "skip_creator_sync_time",
      SkipSyncTime => "skip_sync_time",
      HideFutureYes => "hide_future_yes",
      HideFutureNo => "hide_future_no",
      Cancel => "cancel",
      CurrentTask => "current_task",
      TaskList => "task_list",
      ShowTask(_) => "show_task",
      CompleteTask(_) => "complete_task",
      UncompleteTask(_) => "uncomplete_task",
      Progress => "progress",
      ShareId => "share_id",
      Settings => "settings",
      ChangeName => "change_name",
      ChangeEmoji => "change_emoji",
      ChangeSyncTime => "change_sync_time",
      ToggleNotifications => "toggle_notifications",
      LeaveChallenge => "leave_challenge",
      ConfirmLeave => "confirm_leave",
      AdminPanel => "admin_panel",
      AddTask => "add_task",
      EditTasks => "edit_tasks",
      EditTask(_) => "edit_task",
      EditTaskTitle(_) => "edit_task_title",
      EditTaskDescription(_) => "edit_task_description",
      EditTaskImage(_) => "edit_task_image",
      DeleteTask(_) => "delete_task",
      ConfirmDeleteTask(_) => "confirm_delete_task",
      ReorderTasks => "reorder_tasks",
      ReorderSelect(_) => "reorder_select",
      ReorderPosition(..) => "reorder_position",
      RandomizeTasks => "randomize_tasks",
      ConfirmRandomize => "confirm_randomize",
      EditChallengeName => "edit_challenge_name",
      EditChallengeDescription => "edit_challenge_description",
      EditDailyLimit => "edit_daily_limit",
      ToggleHideFuture => "toggle_hide_future",
      DeleteChallenge => "delete_challenge",
      ConfirmDeleteChallenge => "confirm_delete_challenge",
      SuperAdminPanel => "super_admin_panel",
      AllChallenges => "all_challenges",
      ObserveChallenge(_) => "observe_challenge",
      ListSuperAdmins => "list_super_admins",
      GrantSuperAdmin => "grant_super_admin",
      RevokeSuperAdmin(_) => "revoke_super_admin",
      SaveAsTemplate => "save_as_template",
      ManageTemplates => "manage_templates",
      DeleteTemplate(_) => "delete_template",
    }
  }

  pub fn encode(&self) -> String {
    use Action::*;
    let tag = self.tag();
    match self {
      OpenChallenge(s) | SelectEmoji(s) | ObserveChallenge(s) => format!("{tag}|{s}"),
      UseTemplate(n) | ShowTask(n) | CompleteTask(n) | UncompleteTask(n) | EditTask(n) | EditTaskTitle(n)
      | EditTaskDescription(n) | EditTaskImage(n) | DeleteTask(n) | ConfirmDeleteTask(n) | ReorderSelect(n)
      | RevokeSuperAdmin(n) | DeleteTemplate(n) => format!("{tag}|{n}"),
      ReorderPosition(id, pos) => format!("{tag}|{id}|{pos}"),
      _ => tag.to_string(),
    }
  }

  /// Actions that belong to the flow in progress and must not reset it.
  pub fn is_state_dependent(&self) -> bool {
    use Action::*;
    matches!(
      self,
      SelectEmoji(_) | Skip | SkipDailyLimit | SkipCreatorSyncTime | SkipSyncTime | HideFutureYes | HideFutureNo | Cancel
    )
  }

  /// Actions that mutate or manage a challenge and need admin rights on it.
  pub fn is_admin_protected(&self) -> bool {
    use Action::*;
    matches!(
      self,
      AdminPanel
        | AddTask
        | EditTasks
        | EditTask(_)
        | EditTaskTitle(_)
        | EditTaskDescription(_)
        | EditTaskImage(_)
        | DeleteTask(_)
        | ConfirmDeleteTask(_)
        | ReorderTasks
        | ReorderSelect(_)
        | ReorderPosition(..)
        | RandomizeTasks
        | ConfirmRandomize
        | EditChallengeName
        | EditChallengeDescription
        | EditDailyLimit
        | ToggleHideFuture
        | DeleteChallenge
        | ConfirmDeleteChallenge
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_form_feed_prefix() {
    let cb = split("\u{000C}complete_task|42");
    assert_eq!(cb.action, "complete_task");
    assert_eq!(cb.args, vec!["42"]);
    assert_eq!(Action::parse("\u{000C}complete_task|42"), Some(Action::CompleteTask(42)));
  }

  #[test]
  fn encode_parses_back() {
    let samples = [
      Action::MainMenu,
      Action::OpenChallenge("AB12CD34".into()),
      Action::SelectEmoji("🔥".into()),
      Action::ReorderPosition(12, 3),
      Action::RevokeSuperAdmin(777),
      Action::ConfirmDeleteChallenge,
    ];
    for a in samples {
      assert_eq!(Action::parse(&a.encode()), Some(a));
    }
  }

  #[test]
  fn rejects_unknown_and_malformed() {
    assert_eq!(Action::parse("bogus"), None);
    assert_eq!(Action::parse("show_task|abc"), None);
    assert_eq!(Action::parse("open_challenge"), None);
    assert_eq!(Action::parse(""), None);
  }

  #[test]
  fn participants_is_an_alias_for_progress() {
    assert_eq!(Action::parse("participants"), Some(Action::Progress));
  }

  #[test]
  fn classification() {
    assert!(Action::Cancel.is_state_dependent());
    assert!(!Action::Cancel.is_admin_protected());
    assert!(Action::DeleteTask(1).is_admin_protected());
    assert!(!Action::CompleteTask(1).is_admin_protected());
    assert!(!Action::SaveAsTemplate.is_admin_protected());
  }
}
