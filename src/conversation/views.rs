//! Screens: message text (HTML) plus an inline keyboard.
//!
//! Views are pure functions of already-loaded data so the flows can be tested
//! by looking at text and callbacks only.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::conversation::callback::Action;
use crate::conversation::keyboard::{Button, Keyboard};
use crate::domain::{
  Challenge, Participant, SuperAdmin, Task, Template, UserId, MAX_CHALLENGES_PER_USER,
  MAX_PARTICIPANTS_PER_CHALLENGE, MAX_TASKS_PER_CHALLENGE,
};
use crate::error::ServiceError;
use crate::services::{DailyLimitStatus, ParticipantProgress};
use crate::util::{escape_html, human_duration, progress_bar, truncate_chars};

/// Emojis offered on the quick-pick keyboard, minus those already taken.
pub const POPULAR_EMOJIS: [&str; 20] = [
  "💪", "🔥", "🚀", "⭐", "🎯", "🏆", "🌟", "⚡", "🦄", "🐱", "🐶", "🦊", "🐼", "🌈", "🍀", "🎸", "📚", "🧠", "❤️", "🌻",
];

const PICKER_SIZE: usize = 15;
const BAR_CELLS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
  pub text: String,
  pub keyboard: Keyboard,
}

impl View {
  pub fn new(text: impl Into<String>, keyboard: Keyboard) -> Self {
    Self { text: text.into(), keyboard }
  }

  /// Put a line (e.g. a confirmation or an error) above the screen.
  pub fn with_notice(mut self, notice: &str) -> Self {
    self.text = format!("{notice}\n\n{}", self.text);
    self
  }
}

fn back(label: &str, action: Action) -> Button {
  Button::new(label, action)
}

fn cancel_row() -> Vec<Button> {
  vec![Button::new("❌ Cancel", Action::Cancel)]
}

/// A free-text prompt with optional extra buttons above Cancel.
pub fn prompt(text: impl Into<String>, extra: Vec<Button>) -> View {
  View::new(text, Keyboard::new().row(extra).row(cancel_row()))
}

pub fn root_menu(is_super_admin: bool) -> View {
  let mut kb = Keyboard::new()
    .row(vec![
      Button::new("➕ Create challenge", Action::CreateChallenge),
      Button::new("🤝 Join challenge", Action::JoinChallenge),
    ])
    .row(vec![
      Button::new("📋 My challenges", Action::MyChallenges),
      Button::new("📦 From template", Action::FromTemplate),
    ])
    .button("❓ Help", Action::Help);
  if is_super_admin {
    kb = kb.button("🛡 Super admin", Action::SuperAdminPanel);
  }
  View::new(
    "👋 <b>Welcome to Challenge Bot!</b>\n\nCreate a challenge with a list of tasks, invite friends with its ID and track everyone's progress.",
    kb,
  )
}

pub fn help() -> View {
  let text = format!(
    "<b>How it works</b>\n\n\
     • <b>Create</b> a challenge and add tasks in the admin panel.\n\
     • <b>Share</b> the 8-character challenge ID so friends can join.\n\
     • Every participant picks a name and a unique emoji.\n\
     • Complete tasks one by one and watch the progress board.\n\n\
     Limits: {MAX_CHALLENGES_PER_USER} challenges per user, {MAX_TASKS_PER_CHALLENGE} tasks and \
     {MAX_PARTICIPANTS_PER_CHALLENGE} participants per challenge.\n\n\
     Commands: /start, /menu, /challenges, /help, /cancel"
  );
  View::new(text, Keyboard::new().button("🏠 Main menu", Action::MainMenu))
}

pub fn my_challenges(challenges: &[Challenge], user: UserId) -> View {
  if challenges.is_empty() {
    return View::new(
      "You are not in any challenge yet. Create one or join with an ID.",
      Keyboard::new()
        .row(vec![
          Button::new("➕ Create challenge", Action::CreateChallenge),
          Button::new("🤝 Join challenge", Action::JoinChallenge),
        ])
        .button("🏠 Main menu", Action::MainMenu),
    );
  }
  let buttons = challenges
    .iter()
    .map(|c| {
      let crown = if c.is_creator(user) { "👑 " } else { "" };
      Button::new(format!("{crown}{}", truncate_chars(&c.name, 40)), Action::OpenChallenge(c.id.clone()))
    })
    .collect();
  View::new(
    format!("📋 <b>Your challenges</b> ({}/{MAX_CHALLENGES_PER_USER})", challenges.len()),
    Keyboard::new().grid(buttons, 1).button("🏠 Main menu", Action::MainMenu),
  )
}

pub fn template_picker(templates: &[Template]) -> View {
  if templates.is_empty() {
    return View::new("No templates available yet.", Keyboard::new().button("🏠 Main menu", Action::MainMenu));
  }
  let mut text = String::from("📦 <b>Templates</b>\n");
  for t in templates {
    text.push_str(&format!("\n• <b>{}</b>", escape_html(&t.name)));
    if !t.description.is_empty() {
      text.push_str(&format!(" – {}", escape_html(&truncate_chars(&t.description, 80))));
    }
  }
  let buttons = templates.iter().map(|t| Button::new(truncate_chars(&t.name, 40), Action::UseTemplate(t.id))).collect();
  View::new(text, Keyboard::new().grid(buttons, 1).button("🏠 Main menu", Action::MainMenu))
}

/// Data behind the challenge home screen.
#[derive(Debug, Clone)]
pub struct Overview<'a> {
  pub challenge: &'a Challenge,
  /// `None` for a super admin observing without membership.
  pub me: Option<&'a Participant>,
  pub done: usize,
  pub total: usize,
  pub current_task: i64,
  pub participants: usize,
  pub is_admin: bool,
  pub is_super_admin: bool,
}

fn limit_label(limit: u32) -> String {
  if limit == 0 { "unlimited".into() } else { format!("{limit} per day") }
}

pub fn challenge_main(o: &Overview<'_>) -> View {
  let c = o.challenge;
  let mut text = String::new();
  if o.me.is_none() {
    text.push_str("👁 <i>Observer mode</i>\n\n");
  }
  text.push_str(&format!("🏁 <b>{}</b>\n", escape_html(&c.name)));
  if !c.description.is_empty() {
    text.push_str(&format!("{}\n", escape_html(&c.description)));
  }
  text.push_str(&format!(
    "\n👥 Participants: {}/{MAX_PARTICIPANTS_PER_CHALLENGE}\n📌 Tasks: {}\n⏱ Daily limit: {}\n",
    o.participants,
    o.total,
    limit_label(c.daily_task_limit)
  ));
  if let Some(p) = o.me {
    text.push_str(&format!(
      "\n{} <b>{}</b>: {}/{} {}",
      p.emoji,
      escape_html(&p.display_name),
      o.done,
      o.total,
      progress_bar(o.done, o.total, BAR_CELLS)
    ));
    if o.current_task > 0 {
      text.push_str(&format!("\n➡️ Next up: task #{}", o.current_task));
    } else if o.total > 0 {
      text.push_str("\n🎉 All tasks completed!");
    }
  }

  let mut kb = Keyboard::new()
    .row(vec![
      Button::new("🎯 Current task", Action::CurrentTask),
      Button::new("📜 All tasks", Action::TaskList),
    ])
    .row(vec![Button::new("📊 Progress", Action::Progress), Button::new("🔗 Share ID", Action::ShareId)]);
  if o.me.is_some() {
    kb = kb.button("⚙️ Settings", Action::Settings);
  }
  if o.is_admin {
    kb = kb.button("🛠 Admin panel", Action::AdminPanel);
  }
  if o.is_super_admin {
    kb = kb.button("💾 Save as template", Action::SaveAsTemplate);
  }
  View::new(text, kb.row(vec![back("📋 My challenges", Action::MyChallenges), back("🏠 Main menu", Action::MainMenu)]))
}

/// Data behind the single-task screen.
#[derive(Debug, Clone)]
pub struct TaskScreen<'a> {
  pub task: &'a Task,
  pub total: usize,
  pub completed: bool,
  /// False for observers.
  pub can_complete: bool,
  pub prev: Option<i64>,
  pub next: Option<i64>,
}

pub fn task_view(s: &TaskScreen<'_>) -> View {
  let t = s.task;
  let mark = if s.completed { "✅" } else { "⬜️" };
  let mut text = format!("{mark} <b>Task {}/{}</b>\n\n<b>{}</b>", t.order_num, s.total, escape_html(&t.title));
  if !t.description.is_empty() {
    text.push_str(&format!("\n\n{}", escape_html(&t.description)));
  }

  let mut kb = Keyboard::new();
  if s.can_complete {
    kb = if s.completed {
      kb.button("↩️ Mark as not done", Action::UncompleteTask(t.id))
    } else {
      kb.button("✅ Done!", Action::CompleteTask(t.id))
    };
  }
  let mut nav = Vec::new();
  if let Some(id) = s.prev {
    nav.push(Button::new("⬅️ Previous", Action::ShowTask(id)));
  }
  if let Some(id) = s.next {
    nav.push(Button::new("Next ➡️", Action::ShowTask(id)));
  }
  View::new(text, kb.row(nav).row(vec![
      back("📜 All tasks", Action::TaskList),
      back("🏠 Challenge", Action::OpenChallenge(t.challenge_id.clone())),
    ]))
}

/// `locked_after`: open tasks numbered above it are hidden from this viewer.
pub fn task_list(c: &Challenge, tasks: &[Task], completed: &HashSet<i64>, locked_after: Option<i64>) -> View {
  if tasks.is_empty() {
    return View::new(
      format!("📜 <b>{}</b>\n\nNo tasks yet.", escape_html(&c.name)),
      Keyboard::new().button("🏠 Challenge", Action::OpenChallenge(c.id.clone())),
    );
  }
  let mut text = format!("📜 <b>{}</b> – tasks\n", escape_html(&c.name));
  let mut buttons = Vec::new();
  for t in tasks {
    let locked = locked_after.is_some_and(|n| t.order_num > n) && !completed.contains(&t.id);
    if locked {
      text.push_str(&format!("\n🔒 {}. <i>hidden</i>", t.order_num));
      continue;
    }
    let mark = if completed.contains(&t.id) { "✅" } else { "⬜️" };
    text.push_str(&format!("\n{mark} {}. {}", t.order_num, escape_html(&truncate_chars(&t.title, 40))));
    buttons.push(Button::new(t.order_num.to_string(), Action::ShowTask(t.id)));
  }
  View::new(text, Keyboard::new().grid(buttons, 5).button("🏠 Challenge", Action::OpenChallenge(c.id.clone())))
}

pub fn no_tasks(c: &Challenge, is_admin: bool) -> View {
  let mut kb = Keyboard::new();
  if is_admin {
    kb = kb.button("➕ Add task", Action::AddTask);
  }
  View::new(
    format!("<b>{}</b> has no tasks yet.", escape_html(&c.name)),
    kb.button("🏠 Challenge", Action::OpenChallenge(c.id.clone())),
  )
}

pub fn all_done(c: &Challenge) -> View {
  View::new(
    format!("🎉 You have completed every task in <b>{}</b>!", escape_html(&c.name)),
    Keyboard::new()
      .row(vec![Button::new("📊 Progress", Action::Progress), Button::new("📜 All tasks", Action::TaskList)])
      .button("🏠 Challenge", Action::OpenChallenge(c.id.clone())),
  )
}

pub fn task_locked(c: &Challenge) -> View {
  View::new(
    "🔒 This task unlocks once you reach it.",
    Keyboard::new()
      .button("🎯 Current task", Action::CurrentTask)
      .button("🏠 Challenge", Action::OpenChallenge(c.id.clone())),
  )
}

pub fn daily_limit_reached(c: &Challenge, status: &DailyLimitStatus) -> View {
  View::new(
    format!(
      "⏳ You have completed {}/{} tasks today.\nNew tasks unlock in {} (your time now: {}).",
      status.completed,
      status.limit,
      human_duration(status.time_to_reset),
      status.user_local_time.format("%H:%M")
    ),
    Keyboard::new().button("🏠 Challenge", Action::OpenChallenge(c.id.clone())),
  )
}

/// Rows arrive sorted by completed count.
pub fn progress(c: &Challenge, rows: &[ParticipantProgress]) -> View {
  let mut text = format!("📊 <b>{}</b> – progress\n", escape_html(&c.name));
  for r in rows {
    text.push_str(&format!(
      "\n{} {}  {}/{}\n{}",
      r.participant.emoji,
      escape_html(&r.participant.display_name),
      r.completed,
      r.total,
      progress_bar(r.completed, r.total, BAR_CELLS)
    ));
  }
  View::new(text, Keyboard::new().button("🏠 Challenge", Action::OpenChallenge(c.id.clone())))
}

pub fn share(c: &Challenge, bot_username: Option<&str>) -> View {
  let mut text = format!(
    "🔗 <b>{}</b>\n\nChallenge ID: <code>{}</code>\n\nFriends can join with this ID from the main menu.",
    escape_html(&c.name),
    c.id
  );
  let mut kb = Keyboard::new().row(vec![Button::copy("📋 Copy ID", c.id.clone())]);
  if let Some(bot) = bot_username.filter(|b| !b.is_empty()) {
    let link = format!("https://t.me/{bot}?start={}", c.id);
    text.push_str(&format!("\nOr send them this link: {link}"));
    kb = kb.row(vec![Button::url("📨 Invite link", link)]);
  }
  View::new(text, kb.button("🏠 Challenge", Action::OpenChallenge(c.id.clone())))
}

fn format_offset(minutes: i32) -> String {
  let sign = if minutes < 0 { '-' } else { '+' };
  let m = minutes.unsigned_abs();
  format!("UTC{sign}{:02}:{:02}", m / 60, m % 60)
}

pub fn settings(p: &Participant) -> View {
  let notif = if p.notifications_enabled { "on" } else { "off" };
  let text = format!(
    "⚙️ <b>Settings</b>\n\nName: {}\nEmoji: {}\nTime zone: {}\nNotifications: {notif}",
    escape_html(&p.display_name),
    p.emoji,
    format_offset(p.time_offset_minutes)
  );
  let toggle = if p.notifications_enabled { "🔕 Mute notifications" } else { "🔔 Enable notifications" };
  View::new(
    text,
    Keyboard::new()
      .row(vec![Button::new("✏️ Name", Action::ChangeName), Button::new("😀 Emoji", Action::ChangeEmoji)])
      .row(vec![Button::new("🕒 Sync time", Action::ChangeSyncTime), Button::new(toggle, Action::ToggleNotifications)])
      .button("🚪 Leave challenge", Action::LeaveChallenge)
      .button("🏠 Challenge", Action::OpenChallenge(p.challenge_id.clone())),
  )
}

pub fn confirm_leave(c: &Challenge) -> View {
  View::new(
    format!("Leave <b>{}</b>? Your progress will be deleted.", escape_html(&c.name)),
    Keyboard::new().row(vec![
      Button::new("🚪 Yes, leave", Action::ConfirmLeave),
      Button::new("↩️ No", Action::Settings),
    ]),
  )
}

pub fn settings_creator_cannot_leave(c: &Challenge) -> View {
  View::new(
    "👑 You created this challenge, so you cannot leave it. You can delete it from the admin panel instead.",
    Keyboard::new()
      .button("🛠 Admin panel", Action::AdminPanel)
      .button("🏠 Challenge", Action::OpenChallenge(c.id.clone())),
  )
}

pub fn admin_panel(c: &Challenge, task_count: usize) -> View {
  let hide = if c.hide_future_tasks { "on" } else { "off" };
  let text = format!(
    "🛠 <b>Admin: {}</b>\n\nTasks: {task_count}/{MAX_TASKS_PER_CHALLENGE}\nDaily limit: {}\nHide future tasks: {hide}",
    escape_html(&c.name),
    limit_label(c.daily_task_limit)
  );
  View::new(
    text,
    Keyboard::new()
      .row(vec![Button::new("➕ Add task", Action::AddTask), Button::new("✏️ Edit tasks", Action::EditTasks)])
      .row(vec![
        Button::new("🔀 Reorder", Action::ReorderTasks),
        Button::new("🎲 Shuffle", Action::RandomizeTasks),
      ])
      .row(vec![
        Button::new("📝 Name", Action::EditChallengeName),
        Button::new("📄 Description", Action::EditChallengeDescription),
      ])
      .row(vec![
        Button::new("⏱ Daily limit", Action::EditDailyLimit),
        Button::new("🙈 Hide future tasks", Action::ToggleHideFuture),
      ])
      .button("🗑 Delete challenge", Action::DeleteChallenge)
      .button("🏠 Challenge", Action::OpenChallenge(c.id.clone())),
  )
}

pub fn edit_tasks(tasks: &[Task]) -> View {
  if tasks.is_empty() {
    return View::new(
      "No tasks yet.",
      Keyboard::new().button("➕ Add task", Action::AddTask).button("🛠 Admin panel", Action::AdminPanel),
    );
  }
  let buttons = tasks
    .iter()
    .map(|t| Button::new(format!("{}. {}", t.order_num, truncate_chars(&t.title, 40)), Action::EditTask(t.id)))
    .collect();
  View::new(
    "✏️ Pick a task to edit:",
    Keyboard::new().grid(buttons, 1).button("🛠 Admin panel", Action::AdminPanel),
  )
}

pub fn edit_task(t: &Task) -> View {
  let mut text = format!("✏️ <b>Task #{}</b>\n\n<b>{}</b>", t.order_num, escape_html(&t.title));
  if !t.description.is_empty() {
    text.push_str(&format!("\n\n{}", escape_html(&t.description)));
  }
  if t.has_image() {
    text.push_str("\n\n🖼 Has an image");
  }
  View::new(
    text,
    Keyboard::new()
      .row(vec![
        Button::new("📝 Title", Action::EditTaskTitle(t.id)),
        Button::new("📄 Description", Action::EditTaskDescription(t.id)),
        Button::new("🖼 Image", Action::EditTaskImage(t.id)),
      ])
      .button("🗑 Delete task", Action::DeleteTask(t.id))
      .button("⬅️ Back", Action::EditTasks),
  )
}

pub fn confirm_delete_task(t: &Task) -> View {
  View::new(
    format!("Delete task #{} <b>{}</b>? Completions of it are removed too.", t.order_num, escape_html(&t.title)),
    Keyboard::new().row(vec![
      Button::new("🗑 Delete", Action::ConfirmDeleteTask(t.id)),
      Button::new("↩️ Keep", Action::EditTask(t.id)),
    ]),
  )
}

pub fn reorder_select(tasks: &[Task]) -> View {
  let buttons = tasks
    .iter()
    .map(|t| Button::new(format!("{}. {}", t.order_num, truncate_chars(&t.title, 40)), Action::ReorderSelect(t.id)))
    .collect();
  View::new(
    "🔀 Which task do you want to move? Tap it or send its number.",
    Keyboard::new().grid(buttons, 1).row(cancel_row()),
  )
}

pub fn reorder_position(t: &Task, total: usize) -> View {
  let buttons = (1..=total as i64)
    .map(|pos| {
      let label = if pos == t.order_num { format!("·{pos}·") } else { pos.to_string() };
      Button::new(label, Action::ReorderPosition(t.id, pos))
    })
    .collect();
  View::new(
    format!("Move <b>{}</b> (now #{}) to which position?", escape_html(&t.title), t.order_num),
    Keyboard::new().grid(buttons, 5).row(cancel_row()),
  )
}

pub fn confirm_randomize() -> View {
  View::new(
    "🎲 Shuffle all tasks into a random order?",
    Keyboard::new().row(vec![
      Button::new("🎲 Shuffle", Action::ConfirmRandomize),
      Button::new("↩️ No", Action::AdminPanel),
    ]),
  )
}

pub fn confirm_delete_challenge(c: &Challenge) -> View {
  View::new(
    format!(
      "⚠️ Delete <b>{}</b> with all its tasks, participants and progress? This cannot be undone.",
      escape_html(&c.name)
    ),
    Keyboard::new().row(vec![
      Button::new("🗑 Delete forever", Action::ConfirmDeleteChallenge),
      Button::new("↩️ No", Action::AdminPanel),
    ]),
  )
}

pub fn super_admin_panel() -> View {
  View::new(
    "🛡 <b>Super admin</b>",
    Keyboard::new()
      .button("🌍 All challenges", Action::AllChallenges)
      .row(vec![
        Button::new("👮 Super admins", Action::ListSuperAdmins),
        Button::new("➕ Grant", Action::GrantSuperAdmin),
      ])
      .button("📦 Templates", Action::ManageTemplates)
      .button("🏠 Main menu", Action::MainMenu),
  )
}

pub fn all_challenges(challenges: &[Challenge]) -> View {
  let buttons = challenges
    .iter()
    .map(|c| Button::new(format!("{} ({})", truncate_chars(&c.name, 32), c.id), Action::ObserveChallenge(c.id.clone())))
    .collect();
  View::new(
    format!("🌍 <b>All challenges</b> ({})", challenges.len()),
    Keyboard::new().grid(buttons, 1).button("🛡 Super admin", Action::SuperAdminPanel),
  )
}

pub fn super_admins(admins: &[SuperAdmin], me: UserId) -> View {
  let mut text = String::from("👮 <b>Super admins</b>\n");
  let mut buttons = Vec::new();
  for a in admins {
    let you = if a.telegram_id == me { " (you)" } else { "" };
    text.push_str(&format!("\n• <code>{}</code>{you} since {}", a.telegram_id, date(a.created_at)));
    if a.telegram_id != me {
      buttons.push(Button::new(format!("➖ {}", a.telegram_id), Action::RevokeSuperAdmin(a.telegram_id)));
    }
  }
  View::new(
    text,
    Keyboard::new()
      .grid(buttons, 2)
      .button("➕ Grant", Action::GrantSuperAdmin)
      .button("🛡 Super admin", Action::SuperAdminPanel),
  )
}

pub fn manage_templates(templates: &[Template]) -> View {
  let mut text = format!("📦 <b>Templates</b> ({})\n", templates.len());
  for t in templates {
    text.push_str(&format!("\n• {}", escape_html(&t.name)));
  }
  if templates.is_empty() {
    text.push_str("\nOpen a challenge and use “Save as template” to add one.");
  }
  let buttons =
    templates.iter().map(|t| Button::new(format!("🗑 {}", truncate_chars(&t.name, 36)), Action::DeleteTemplate(t.id))).collect();
  View::new(text, Keyboard::new().grid(buttons, 1).button("🛡 Super admin", Action::SuperAdminPanel))
}

fn date(dt: DateTime<Utc>) -> String {
  dt.format("%Y-%m-%d").to_string()
}

/// Emoji prompt with a quick-pick grid of free popular emojis.
pub fn emoji_picker(text: impl Into<String>, used: &[String]) -> View {
  let free: Vec<Button> = POPULAR_EMOJIS
    .iter()
    .filter(|e| !used.iter().any(|u| u == *e))
    .take(PICKER_SIZE)
    .map(|e| Button::new(*e, Action::SelectEmoji((*e).to_string())))
    .collect();
  View::new(text, Keyboard::new().grid(free, 5).row(cancel_row()))
}

/// What the user reads for a failed operation.
pub fn error_text(err: &ServiceError) -> String {
  use ServiceError::*;
  match err {
    ChallengeNotFound => "❌ Challenge not found. Check the ID and try again.".into(),
    TaskNotFound => "❌ Task not found. It may have been deleted.".into(),
    ParticipantNotFound => "❌ You are not a participant of this challenge.".into(),
    TemplateNotFound => "❌ Template not found.".into(),
    SuperAdminNotFound => "❌ That user is not a super admin.".into(),
    Validation(v) => format!("❌ {v}"),
    MaxChallengesReached => format!("❌ You can take part in at most {MAX_CHALLENGES_PER_USER} challenges."),
    MaxTasksReached => format!("❌ A challenge can have at most {MAX_TASKS_PER_CHALLENGE} tasks."),
    ChallengeFull => format!("❌ This challenge is full ({MAX_PARTICIPANTS_PER_CHALLENGE} participants)."),
    AlreadyMember => "ℹ️ You are already a member of this challenge.".into(),
    EmojiTaken => "❌ This emoji is already taken in this challenge. Pick another one.".into(),
    AlreadySuperAdmin => "ℹ️ This user is already a super admin.".into(),
    TemplateNameExists => "❌ A template with this name already exists.".into(),
    NotAdmin | NotSuperAdmin => "⛔ You don't have permission to do that.".into(),
    CannotRemoveSelf => "⛔ You cannot remove yourself.".into(),
    IdGenerationExhausted(_) | Database(_) => "⚠️ Something went wrong. Please try again.".into(),
  }
}

pub const STALE_BUTTON: &str = "This button is no longer active.";
