//! Per-user conversation controller.
//!
//! `Controller::handle` loads the user's persisted state, routes one inbound
//! event through the flow handlers and persists the resulting state. Handlers
//! perform domain writes through the services and collect outbound messages
//! and notices on a `Turn`; the async driver sends them after `handle`
//! returns, so every write is committed before the reply goes out.
//!
//! The flows live in sibling modules as further `impl Controller` blocks.

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::conversation::callback::Action;
use crate::conversation::keyboard::{Button, Keyboard};
use crate::conversation::scratch::Scratch;
use crate::conversation::state::{ConversationState, Family};
use crate::conversation::views::{self, View};
use crate::domain::{Challenge, Participant, UserId};
use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::notifier::Notice;
use crate::services::completion::current_task_num;
use crate::services::Services;
use crate::storage::StoredUserState;
use crate::util::trunc_for_log;

/// One inbound event from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
  /// `/start`, optionally with a deep-link payload.
  Start { payload: String },
  Text(String),
  Photo { file_id: String },
  Callback { id: String, data: String, message_id: Option<i64> },
  /// Slash command other than `/start`, without the slash or bot suffix.
  Command(String),
}

impl Incoming {
  pub fn kind(&self) -> &'static str {
    match self {
      Incoming::Start { .. } => "start",
      Incoming::Text(_) => "text",
      Incoming::Photo { .. } => "photo",
      Incoming::Callback { .. } => "callback",
      Incoming::Command(_) => "command",
    }
  }
}

/// One outbound platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
  Text { text: String, keyboard: Option<Keyboard> },
  Photo { file_id: String, caption: String, keyboard: Option<Keyboard> },
  Edit { message_id: i64, text: String, keyboard: Option<Keyboard> },
  AnswerCallback { id: String, text: Option<String> },
}

impl Outbound {
  /// Message text or photo caption.
  pub fn text(&self) -> Option<&str> {
    match self {
      Outbound::Text { text, .. } | Outbound::Edit { text, .. } => Some(text),
      Outbound::Photo { caption, .. } => Some(caption),
      Outbound::AnswerCallback { .. } => None,
    }
  }

  pub fn keyboard(&self) -> Option<&Keyboard> {
    match self {
      Outbound::Text { keyboard, .. } | Outbound::Photo { keyboard, .. } | Outbound::Edit { keyboard, .. } => {
        keyboard.as_ref()
      }
      Outbound::AnswerCallback { .. } => None,
    }
  }
}

/// Everything one event produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
  pub outbound: Vec<Outbound>,
  pub notices: Vec<Notice>,
}

impl Reply {
  /// Texts of all messages, in order. Handy in tests.
  pub fn texts(&self) -> Vec<&str> {
    self.outbound.iter().filter_map(Outbound::text).collect()
  }

  /// Text of the last message.
  pub fn last_text(&self) -> &str {
    self.outbound.iter().rev().find_map(Outbound::text).unwrap_or_default()
  }

  /// Callback payloads of the last keyboard.
  pub fn last_callbacks(&self) -> Vec<&str> {
    self.outbound.iter().rev().find_map(Outbound::keyboard).map(|k| k.callbacks()).unwrap_or_default()
  }
}

fn keyboard_of(view: &View) -> Option<Keyboard> {
  (!view.keyboard.is_empty()).then(|| view.keyboard.clone())
}

/// Mutable working copy of one user's conversation for the duration of an event.
pub(crate) struct Turn {
  pub user: UserId,
  pub state: ConversationState,
  pub scratch: Scratch,
  /// Current challenge id; empty when none is selected.
  pub current: String,
  /// Message the first screen of a callback replaces.
  edit_target: Option<i64>,
  out: Vec<Outbound>,
  notices: Vec<Notice>,
  checkpoint: (ConversationState, Scratch),
}

impl Turn {
  fn load(stored: StoredUserState) -> Self {
    let state = ConversationState::from_tag(&stored.state).unwrap_or_else(|| {
      warn!(target: "conversation", user = stored.telegram_id, tag = %stored.state, "Unknown state tag; treating as idle");
      ConversationState::Idle
    });
    let scratch = Scratch::decode(&stored.temp_data);
    Self {
      user: stored.telegram_id,
      checkpoint: (state, scratch.clone()),
      state,
      scratch,
      current: stored.current_challenge,
      edit_target: None,
      out: Vec::new(),
      notices: Vec::new(),
    }
  }

  fn stored(&self) -> StoredUserState {
    StoredUserState {
      telegram_id: self.user,
      state: self.state.tag().to_string(),
      temp_data: if self.state.is_idle() { String::new() } else { self.scratch.encode() },
      current_challenge: self.current.clone(),
    }
  }

  /// Show a screen, replacing the tapped message when there is one.
  pub fn show(&mut self, view: View) {
    let keyboard = keyboard_of(&view);
    match self.edit_target.take() {
      Some(message_id) => self.out.push(Outbound::Edit { message_id, text: view.text, keyboard }),
      None => self.out.push(Outbound::Text { text: view.text, keyboard }),
    }
  }

  /// Always a new message.
  pub fn send(&mut self, view: View) {
    self.edit_target = None;
    let keyboard = keyboard_of(&view);
    self.out.push(Outbound::Text { text: view.text, keyboard });
  }

  pub fn photo(&mut self, file_id: &str, view: View) {
    self.edit_target = None;
    let keyboard = keyboard_of(&view);
    self.out.push(Outbound::Photo { file_id: file_id.to_string(), caption: view.text, keyboard });
  }

  pub fn goto(&mut self, state: ConversationState, scratch: Scratch) {
    self.state = state;
    self.scratch = scratch;
  }

  /// Back to idle, keeping the current challenge.
  pub fn reset(&mut self) {
    self.goto(ConversationState::Idle, Scratch::Empty);
  }

  /// Back to idle with no challenge selected.
  pub fn reset_all(&mut self) {
    self.reset();
    self.current.clear();
  }

  pub fn notify(&mut self, notice: Notice) {
    self.notices.push(notice);
  }

  fn checkpoint(&mut self) {
    self.checkpoint = (self.state, self.scratch.clone());
  }

  fn restore(&mut self) {
    let (state, scratch) = self.checkpoint.clone();
    self.goto(state, scratch);
  }

  fn into_reply(self) -> Reply {
    Reply { outbound: self.out, notices: self.notices }
  }
}

/// The conversation state machine. Cheap to clone; all state lives in the database.
#[derive(Clone)]
pub struct Controller {
  pub(crate) svc: Services,
  pub(crate) bot_username: Option<String>,
}

impl Controller {
  pub fn new(svc: Services, bot_username: Option<String>) -> Self {
    Self { svc, bot_username }
  }

  pub fn services(&self) -> &Services {
    &self.svc
  }

  /// Process one event for `user`. Never fails: errors become user-facing messages.
  #[instrument(level = "info", skip(self, incoming), fields(kind = incoming.kind()))]
  pub fn handle(&self, user: UserId, incoming: Incoming) -> Reply {
    let stored = match self.svc.db.get_user_state(user) {
      Ok(s) => s,
      Err(e) => {
        error!(target: "conversation", user, error = %e, "Could not load user state");
        let err = ServiceError::from(e);
        return Reply {
          outbound: vec![Outbound::Text { text: views::error_text(&err), keyboard: None }],
          notices: Vec::new(),
        };
      }
    };

    let mut t = Turn::load(stored);
    let before = t.state;
    if let Err(e) = self.dispatch(&mut t, incoming) {
      self.recover(&mut t, e);
    }
    if t.state != before {
      debug!(target: "conversation", user, from = %before, to = %t.state, "State changed");
    }
    if let Err(e) = self.svc.db.upsert_user_state(&t.stored(), Utc::now()) {
      error!(target: "conversation", user, error = %e, "Could not persist user state");
    }
    t.into_reply()
  }

  fn dispatch(&self, t: &mut Turn, incoming: Incoming) -> ServiceResult<()> {
    match incoming {
      Incoming::Start { payload } => {
        t.reset_all();
        t.checkpoint();
        let payload = payload.trim();
        if payload.is_empty() {
          self.main_menu(t)
        } else {
          self.deep_link(t, payload)
        }
      }
      Incoming::Text(text) => self.on_text(t, &text),
      Incoming::Photo { file_id } => self.on_photo(t, &file_id),
      Incoming::Callback { id, data, message_id } => {
        t.out.push(Outbound::AnswerCallback { id, text: None });
        t.edit_target = message_id;
        match Action::parse(&data) {
          Some(action) => self.run(t, action),
          None => {
            warn!(target: "conversation", user = t.user, data = %trunc_for_log(&data, 64), "Unrecognised callback");
            self.stale(t)
          }
        }
      }
      Incoming::Command(name) => match name.as_str() {
        "help" => self.run(t, Action::Help),
        "cancel" => self.run(t, Action::Cancel),
        "menu" => self.run(t, Action::MainMenu),
        "challenges" => self.run(t, Action::MyChallenges),
        _ => {
          debug!(target: "conversation", user = t.user, command = %name, "Unknown command");
          self.run(t, Action::MainMenu)
        }
      },
    }
  }

  /// Callbacks and commands. Anything outside the flow vocabulary resets the flow first.
  fn run(&self, t: &mut Turn, action: Action) -> ServiceResult<()> {
    if !action.is_state_dependent() {
      t.reset();
    }
    t.checkpoint();
    if action.is_admin_protected() {
      self.managed(t)?;
    }
    debug!(target: "conversation", user = t.user, action = action.tag(), state = %t.state, "Action");
    self.on_action(t, action)
  }

  fn on_action(&self, t: &mut Turn, action: Action) -> ServiceResult<()> {
    use Action::*;
    use ConversationState as S;
    match action {
      MainMenu => self.main_menu(t),
      CreateChallenge => self.start_create(t),
      JoinChallenge => self.start_join(t),
      MyChallenges => self.my_challenges(t),
      OpenChallenge(id) => self.switch_to(t, id),
      FromTemplate => self.template_picker(t),
      UseTemplate(id) => self.use_template(t, id),
      Help => {
        t.show(views::help());
        Ok(())
      }

      SelectEmoji(emoji) => match t.state {
        S::AwaitingCreatorEmoji => self.creator_emoji(t, &emoji),
        S::AwaitingParticipantEmoji => self.participant_emoji(t, &emoji),
        S::AwaitingNewEmoji => self.new_emoji(t, &emoji),
        _ => self.stale(t),
      },
      Skip => match t.state {
        S::AwaitingChallengeDescription => self.challenge_description(t, ""),
        S::AwaitingTaskImage => self.task_image(t, ""),
        S::AwaitingTaskDescription => self.task_description(t, ""),
        S::AwaitingEditDescription => self.edit_description(t, ""),
        S::AwaitingEditImage => self.edit_image(t, ""),
        S::AwaitingNewChallengeDescription => self.new_challenge_description(t, ""),
        _ => self.stale(t),
      },
      SkipDailyLimit if t.state == S::AwaitingDailyLimit => self.daily_limit(t, 0),
      SkipCreatorSyncTime if t.state == S::AwaitingCreatorSyncTime => self.finish_create(t, 0),
      SkipSyncTime if t.state == S::AwaitingSyncTime => self.sync_time(t, 0),
      HideFutureYes if t.state == S::AwaitingHideFutureTasks => self.hide_future(t, true),
      HideFutureNo if t.state == S::AwaitingHideFutureTasks => self.hide_future(t, false),
      SkipDailyLimit | SkipCreatorSyncTime | SkipSyncTime | HideFutureYes | HideFutureNo => self.stale(t),
      Cancel => self.cancel(t),

      CurrentTask => self.current_task(t),
      TaskList => self.task_list(t),
      ShowTask(id) => self.show_task(t, id),
      CompleteTask(id) => self.complete_task(t, id),
      UncompleteTask(id) => self.uncomplete_task(t, id),
      Progress => self.progress(t),
      ShareId => self.share_id(t),
      Settings => self.settings(t),
      ChangeName => self.change_name(t),
      ChangeEmoji => self.change_emoji(t),
      ChangeSyncTime => self.change_sync_time(t),
      ToggleNotifications => self.toggle_notifications(t),
      LeaveChallenge => self.leave(t),
      ConfirmLeave => self.confirm_leave(t),

      AdminPanel => self.admin_panel(t),
      AddTask => self.add_task(t),
      EditTasks => self.edit_tasks(t),
      EditTask(id) => self.edit_task(t, id),
      EditTaskTitle(id) => self.start_task_edit(t, id, S::AwaitingEditTitle),
      EditTaskDescription(id) => self.start_task_edit(t, id, S::AwaitingEditDescription),
      EditTaskImage(id) => self.start_task_edit(t, id, S::AwaitingEditImage),
      DeleteTask(id) => self.delete_task(t, id),
      ConfirmDeleteTask(id) => self.confirm_delete_task(t, id),
      ReorderTasks => self.reorder_tasks(t),
      ReorderSelect(id) => self.reorder_select(t, id),
      ReorderPosition(id, pos) => self.reorder_position(t, id, pos),
      RandomizeTasks => {
        t.show(views::confirm_randomize());
        Ok(())
      }
      ConfirmRandomize => self.randomize(t),
      EditChallengeName => self.enter(t, S::AwaitingNewChallengeName, Scratch::Empty),
      EditChallengeDescription => self.enter(t, S::AwaitingNewChallengeDescription, Scratch::Empty),
      EditDailyLimit => self.enter(t, S::AwaitingNewDailyLimit, Scratch::Empty),
      ToggleHideFuture => self.toggle_hide_future(t),
      DeleteChallenge => self.delete_challenge(t),
      ConfirmDeleteChallenge => self.confirm_delete_challenge(t),

      SuperAdminPanel => self.super_admin_panel(t),
      AllChallenges => self.all_challenges(t),
      ObserveChallenge(id) => self.observe(t, id),
      ListSuperAdmins => self.list_super_admins(t),
      GrantSuperAdmin => self.grant_super_admin(t),
      RevokeSuperAdmin(target) => self.revoke_super_admin(t, target),
      SaveAsTemplate => self.save_as_template(t),
      ManageTemplates => self.manage_templates(t),
      DeleteTemplate(id) => self.delete_template(t, id),
    }
  }

  fn on_text(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    use ConversationState as S;
    match t.state {
      S::Idle => {
        debug!(target: "conversation", user = t.user, "Ignoring text while idle");
        Ok(())
      }
      S::AwaitingChallengeName => self.challenge_name(t, text),
      S::AwaitingChallengeDescription => self.challenge_description(t, text),
      S::AwaitingCreatorName => self.creator_name(t, text),
      S::AwaitingCreatorEmoji => self.creator_emoji(t, text),
      S::AwaitingDailyLimit => {
        let limit = crate::validate::daily_limit(text)?;
        self.daily_limit(t, limit)
      }
      S::AwaitingCreatorSyncTime => {
        let offset = crate::validate::sync_time_offset(text, Utc::now())?;
        self.finish_create(t, offset)
      }
      S::AwaitingChallengeId => self.challenge_id(t, text),
      S::AwaitingParticipantName => self.participant_name(t, text),
      S::AwaitingParticipantEmoji => self.participant_emoji(t, text),
      S::AwaitingSyncTime => {
        let offset = crate::validate::sync_time_offset(text, Utc::now())?;
        self.sync_time(t, offset)
      }
      S::AwaitingTaskTitle => self.task_title(t, text),
      S::AwaitingTaskDescription => self.task_description(t, text),
      S::AwaitingEditTitle => self.edit_title(t, text),
      S::AwaitingEditDescription => self.edit_description(t, text),
      S::ReorderSelectTask => self.reorder_select_text(t, text),
      S::ReorderSelectPosition => self.reorder_position_text(t, text),
      S::AwaitingNewChallengeName => self.new_challenge_name(t, text),
      S::AwaitingNewChallengeDescription => self.new_challenge_description(t, text),
      S::AwaitingNewDailyLimit => self.new_daily_limit(t, text),
      S::AwaitingNewName => self.new_name(t, text),
      S::AwaitingNewEmoji => self.new_emoji(t, text),
      S::AwaitingSuperAdminId => self.super_admin_id(t, text),
      // button-only and photo states
      S::AwaitingHideFutureTasks | S::AwaitingTaskImage | S::AwaitingEditImage => self.reprompt(t),
    }
  }

  fn on_photo(&self, t: &mut Turn, file_id: &str) -> ServiceResult<()> {
    use ConversationState as S;
    match t.state {
      S::AwaitingTaskImage => self.task_image(t, file_id),
      S::AwaitingEditImage => self.edit_image(t, file_id),
      S::Idle => {
        debug!(target: "conversation", user = t.user, "Ignoring photo while idle");
        Ok(())
      }
      _ => self.reprompt(t),
    }
  }

  /// Switch state and show that state's prompt.
  pub(crate) fn enter(&self, t: &mut Turn, state: ConversationState, scratch: Scratch) -> ServiceResult<()> {
    t.goto(state, scratch);
    if let Some(view) = self.prompt(t)? {
      t.show(view);
    }
    Ok(())
  }

  fn reprompt(&self, t: &mut Turn) -> ServiceResult<()> {
    if let Some(view) = self.prompt(t)? {
      t.send(view);
    }
    Ok(())
  }

  /// Prompt for the current state; `None` while idle.
  fn prompt(&self, t: &Turn) -> ServiceResult<Option<View>> {
    use ConversationState as S;
    let skip = |label: &str, action: Action| vec![Button::new(label, action)];
    let sync_prompt = |action: Action| {
      views::prompt(
        format!(
          "🕒 What time is it on your clock right now? Send it as HH:MM so daily limits follow your day.\n\
           (Server time is {} UTC.)",
          Utc::now().format("%H:%M")
        ),
        skip("⏭ Skip (use UTC)", action),
      )
    };

    let view = match t.state {
      S::Idle => return Ok(None),
      S::AwaitingChallengeName => views::prompt("✏️ What is the name of your challenge?", Vec::new()),
      S::AwaitingChallengeDescription => {
        views::prompt("📄 Send a short description, or skip.", skip("⏭ Skip", Action::Skip))
      }
      S::AwaitingCreatorName => {
        let draft = t.scratch.create();
        let intro = match draft.template_id {
          Some(_) => format!("📦 Creating <b>{}</b> from a template.\n\n", crate::util::escape_html(&draft.name)),
          None => String::new(),
        };
        views::prompt(format!("{intro}👤 How should others see you? Send your display name."), Vec::new())
      }
      S::AwaitingCreatorEmoji => views::emoji_picker("😀 Pick your emoji: tap one or send any single emoji.", &[]),
      S::AwaitingDailyLimit => views::prompt(
        "⏱ How many tasks may a participant complete per day? Send a number from 0 to 50 (0 = unlimited).",
        skip("♾ No limit", Action::SkipDailyLimit),
      ),
      S::AwaitingHideFutureTasks => views::prompt(
        "🙈 Hide tasks until a participant reaches them?",
        vec![Button::new("🙈 Yes, hide", Action::HideFutureYes), Button::new("👀 No, show all", Action::HideFutureNo)],
      ),
      S::AwaitingCreatorSyncTime => sync_prompt(Action::SkipCreatorSyncTime),
      S::AwaitingSyncTime => sync_prompt(Action::SkipSyncTime),

      S::AwaitingTaskTitle => views::prompt("📝 Send the task title.", Vec::new()),
      S::AwaitingTaskImage => views::prompt("🖼 Send a picture for this task, or skip.", skip("⏭ Skip", Action::Skip)),
      S::AwaitingTaskDescription => {
        views::prompt("📄 Send the task description, or skip.", skip("⏭ Skip", Action::Skip))
      }
      S::AwaitingEditTitle => views::prompt("📝 Send the new title.", Vec::new()),
      S::AwaitingEditDescription => {
        views::prompt("📄 Send the new description.", skip("🧹 Remove description", Action::Skip))
      }
      S::AwaitingEditImage => views::prompt("🖼 Send the new picture.", skip("🧹 Remove image", Action::Skip)),
      S::ReorderSelectTask => views::reorder_select(&self.svc.tasks.list(&t.current)?),
      S::ReorderSelectPosition => {
        let id = t.scratch.reorder_task_id().ok_or(ServiceError::TaskNotFound)?;
        let task = self.svc.tasks.get_in(id, &t.current)?;
        views::reorder_position(&task, self.svc.tasks.count(&t.current)?)
      }

      S::AwaitingChallengeId => views::prompt("🔑 Send the 8-character challenge ID.", Vec::new()),
      S::AwaitingParticipantName => {
        let draft = t.scratch.join();
        let name = self.svc.challenges.get(&draft.challenge_id).map(|c| c.name).unwrap_or(draft.challenge_id);
        views::prompt(
          format!("🤝 Joining <b>{}</b>.\n\n👤 Send your display name.", crate::util::escape_html(&name)),
          Vec::new(),
        )
      }
      S::AwaitingParticipantEmoji => {
        let used = self.svc.participants.used_emojis(&t.scratch.join().challenge_id)?;
        views::emoji_picker("😀 Pick your emoji: tap one or send any single emoji. It must be unique in this challenge.", &used)
      }

      S::AwaitingNewChallengeName => views::prompt("📝 Send the new challenge name.", Vec::new()),
      S::AwaitingNewChallengeDescription => {
        views::prompt("📄 Send the new description.", skip("🧹 Clear description", Action::Skip))
      }
      S::AwaitingNewDailyLimit => views::prompt("⏱ Send the new daily limit (0 to 50, 0 = unlimited).", Vec::new()),
      S::AwaitingNewName => views::prompt("👤 Send your new display name.", Vec::new()),
      S::AwaitingNewEmoji => {
        let used = self.svc.participants.used_emojis(&t.current)?;
        views::emoji_picker("😀 Pick your new emoji.", &used)
      }
      S::AwaitingSuperAdminId => {
        views::prompt("👮 Send the numeric Telegram user ID of the new super admin.", Vec::new())
      }
    };
    Ok(Some(view))
  }

  /// Map a failed step onto a state change and a message.
  fn recover(&self, t: &mut Turn, err: ServiceError) {
    let kind = err.kind();
    if kind == ErrorKind::Transient {
      error!(target: "conversation", user = t.user, state = %t.state, error = %err, "Request failed");
    } else {
      info!(target: "conversation", user = t.user, state = %t.state, error = %err, "Request rejected");
    }

    let reset = kind == ErrorKind::QuotaExceeded
      || matches!(err, ServiceError::AlreadyMember | ServiceError::AlreadySuperAdmin | ServiceError::TemplateNameExists);
    if reset {
      t.reset();
    } else {
      t.restore();
    }

    let msg = views::error_text(&err);
    let view = match self.prompt(t) {
      Ok(Some(prompt)) => prompt.with_notice(&msg),
      Ok(None) => View::new(msg, self.nav(t)),
      Err(e) => {
        warn!(target: "conversation", user = t.user, error = %e, "Could not rebuild prompt; resetting");
        t.reset();
        View::new(msg, self.nav(t))
      }
    };
    t.send(view);
  }

  /// Way out after an error while idle.
  fn nav(&self, t: &Turn) -> Keyboard {
    let mut kb = Keyboard::new();
    if !t.current.is_empty() {
      kb = kb.button("🏠 Challenge", Action::OpenChallenge(t.current.clone()));
    }
    kb.button("🏠 Main menu", Action::MainMenu)
  }

  fn stale(&self, t: &mut Turn) -> ServiceResult<()> {
    t.send(View::new(views::STALE_BUTTON, self.nav(t)));
    Ok(())
  }

  pub(crate) fn main_menu(&self, t: &mut Turn) -> ServiceResult<()> {
    let is_super = self.svc.super_admins.is_super_admin(t.user)?;
    t.show(views::root_menu(is_super));
    Ok(())
  }

  fn my_challenges(&self, t: &mut Turn) -> ServiceResult<()> {
    let list = self.svc.challenges.for_user(t.user)?;
    t.show(views::my_challenges(&list, t.user));
    Ok(())
  }

  /// Where `cancel` lands depends on the flow being left.
  fn cancel(&self, t: &mut Turn) -> ServiceResult<()> {
    let family = t.state.family();
    let settings_sync = t.state == ConversationState::AwaitingSyncTime && t.scratch == Scratch::Settings;
    debug!(target: "conversation", user = t.user, state = %t.state, "Flow cancelled");
    t.reset();
    match family {
      _ if settings_sync => self.settings(t),
      Family::Admin => self.admin_panel(t),
      Family::Settings => self.settings(t),
      Family::SuperAdmin => self.super_admin_panel(t),
      Family::Create | Family::Join | Family::None => {
        if !t.current.is_empty() && self.viewer(t).is_ok() {
          self.show_challenge(t)
        } else {
          self.main_menu(t)
        }
      }
    }
  }

  /// The current challenge plus the caller's membership; super admins may observe without one.
  pub(crate) fn viewer(&self, t: &Turn) -> ServiceResult<(Challenge, Option<Participant>)> {
    if t.current.is_empty() {
      return Err(ServiceError::ChallengeNotFound);
    }
    let c = self.svc.challenges.get(&t.current)?;
    match self.svc.participants.find(&c.id, t.user)? {
      Some(p) => Ok((c, Some(p))),
      None if self.svc.super_admins.is_super_admin(t.user)? => Ok((c, None)),
      None => Err(ServiceError::ParticipantNotFound),
    }
  }

  /// The current challenge and the caller's membership in it.
  pub(crate) fn member(&self, t: &Turn) -> ServiceResult<(Challenge, Participant)> {
    if t.current.is_empty() {
      return Err(ServiceError::ChallengeNotFound);
    }
    let c = self.svc.challenges.get(&t.current)?;
    let p = self.svc.participants.get(&c.id, t.user)?;
    Ok((c, p))
  }

  /// The current challenge, if the caller may manage it.
  pub(crate) fn managed(&self, t: &Turn) -> ServiceResult<Challenge> {
    if t.current.is_empty() {
      return Err(ServiceError::ChallengeNotFound);
    }
    let c = self.svc.challenges.get(&t.current)?;
    self.svc.challenges.ensure_can_manage(&c, t.user)?;
    Ok(c)
  }

  pub(crate) fn challenge_view(&self, t: &Turn) -> ServiceResult<View> {
    let (c, me) = self.viewer(t)?;
    let tasks = self.svc.tasks.list(&c.id)?;
    let (done, current_task) = match &me {
      Some(p) => {
        let ids = self.svc.completions.completed_task_ids(p.id)?;
        (ids.len(), current_task_num(&ids, &tasks))
      }
      None => (0, 0),
    };
    let participants = self.svc.participants.list(&c.id)?.len();
    let is_super_admin = self.svc.super_admins.is_super_admin(t.user)?;
    Ok(views::challenge_main(&views::Overview {
      challenge: &c,
      me: me.as_ref(),
      done,
      total: tasks.len(),
      current_task,
      participants,
      is_admin: self.svc.challenges.is_admin(&c, t.user),
      is_super_admin,
    }))
  }

  /// Makes `id` the current challenge, keeping the old one if its screen is off limits.
  pub(crate) fn switch_to(&self, t: &mut Turn, id: String) -> ServiceResult<()> {
    let previous = std::mem::replace(&mut t.current, id);
    match self.challenge_view(t) {
      Ok(view) => {
        t.show(view);
        Ok(())
      }
      Err(e) => {
        t.current = previous;
        Err(e)
      }
    }
  }

  pub(crate) fn show_challenge(&self, t: &mut Turn) -> ServiceResult<()> {
    let view = self.challenge_view(t)?;
    t.show(view);
    Ok(())
  }
}
