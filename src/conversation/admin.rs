//! Challenge administration: task authoring, reordering and challenge settings.
//! Entry actions are gated in the controller; text steps re-check rights.

use chrono::Utc;
use tracing::info;

use crate::conversation::controller::{Controller, Turn};
use crate::conversation::scratch::{Scratch, TaskDraft};
use crate::conversation::state::ConversationState as S;
use crate::conversation::views;
use crate::domain::{TaskContent, MAX_TASKS_PER_CHALLENGE};
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::notifier::Notice;
use crate::util::escape_html;
use crate::validate;

fn parse_position(text: &str, max: usize) -> ServiceResult<i64> {
  match text.trim().parse::<i64>() {
    Ok(n) if n >= 1 && n as usize <= max => Ok(n),
    _ => Err(ValidationError::BadPosition { max }.into()),
  }
}

impl Controller {
  pub(crate) fn admin_panel(&self, t: &mut Turn) -> ServiceResult<()> {
    let c = self.managed(t)?;
    let count = self.svc.tasks.count(&c.id)?;
    t.show(views::admin_panel(&c, count));
    Ok(())
  }

  fn admin_panel_with(&self, t: &mut Turn, notice: &str) -> ServiceResult<()> {
    t.reset();
    let c = self.managed(t)?;
    let count = self.svc.tasks.count(&c.id)?;
    t.show(views::admin_panel(&c, count).with_notice(notice));
    Ok(())
  }

  fn edit_tasks_with(&self, t: &mut Turn, notice: &str) -> ServiceResult<()> {
    t.reset();
    let tasks = self.svc.tasks.list(&t.current)?;
    t.show(views::edit_tasks(&tasks).with_notice(notice));
    Ok(())
  }

  // --- adding tasks

  pub(crate) fn add_task(&self, t: &mut Turn) -> ServiceResult<()> {
    let c = self.managed(t)?;
    if self.svc.tasks.count(&c.id)? >= MAX_TASKS_PER_CHALLENGE {
      return Err(ServiceError::MaxTasksReached);
    }
    self.enter(t, S::AwaitingTaskTitle, Scratch::AddTask(TaskDraft::default()))
  }

  pub(crate) fn task_title(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    self.managed(t)?;
    let mut draft = t.scratch.task();
    draft.title = validate::task_title(text)?;
    self.enter(t, S::AwaitingTaskImage, Scratch::AddTask(draft))
  }

  /// Empty `file_id` means the image was skipped.
  pub(crate) fn task_image(&self, t: &mut Turn, file_id: &str) -> ServiceResult<()> {
    let mut draft = t.scratch.task();
    draft.image_file_id = file_id.to_string();
    self.enter(t, S::AwaitingTaskDescription, Scratch::AddTask(draft))
  }

  pub(crate) fn task_description(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let c = self.managed(t)?;
    let draft = t.scratch.task();
    let content = TaskContent {
      title: draft.title,
      description: validate::task_description(text)?,
      image_file_id: draft.image_file_id,
    };
    let task = self.svc.tasks.create(&c.id, &content)?;
    info!(target: "conversation", user = t.user, id = %c.id, task_id = task.id, "Task added");
    t.reset();
    let count = self.svc.tasks.count(&c.id)?;
    let view = views::admin_panel(&c, count)
      .with_notice(&format!("✅ Task #{} <b>{}</b> added.", task.order_num, escape_html(&task.title)));
    t.show(view);
    Ok(())
  }

  // --- editing tasks

  pub(crate) fn edit_tasks(&self, t: &mut Turn) -> ServiceResult<()> {
    let tasks = self.svc.tasks.list(&t.current)?;
    t.show(views::edit_tasks(&tasks));
    Ok(())
  }

  pub(crate) fn edit_task(&self, t: &mut Turn, task_id: i64) -> ServiceResult<()> {
    let task = self.svc.tasks.get_in(task_id, &t.current)?;
    t.show(views::edit_task(&task));
    Ok(())
  }

  pub(crate) fn start_task_edit(&self, t: &mut Turn, task_id: i64, state: S) -> ServiceResult<()> {
    self.svc.tasks.get_in(task_id, &t.current)?;
    self.enter(t, state, Scratch::EditTask { task_id })
  }

  /// Apply `change` to the task being edited and return to its edit screen.
  fn update_task(&self, t: &mut Turn, change: impl FnOnce(&mut TaskContent)) -> ServiceResult<()> {
    self.managed(t)?;
    let task_id = t.scratch.edit_task_id().ok_or(ServiceError::TaskNotFound)?;
    let task = self.svc.tasks.get_in(task_id, &t.current)?;
    let mut content = TaskContent::from(&task);
    change(&mut content);
    let updated = self.svc.tasks.update(task_id, &content)?;
    info!(target: "conversation", user = t.user, task_id, "Task updated");
    t.reset();
    t.show(views::edit_task(&updated).with_notice("✅ Task updated."));
    Ok(())
  }

  pub(crate) fn edit_title(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let title = validate::task_title(text)?;
    self.update_task(t, |c| c.title = title)
  }

  /// Empty text clears the description.
  pub(crate) fn edit_description(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let description = validate::task_description(text)?;
    self.update_task(t, |c| c.description = description)
  }

  /// Empty `file_id` removes the image.
  pub(crate) fn edit_image(&self, t: &mut Turn, file_id: &str) -> ServiceResult<()> {
    self.update_task(t, |c| c.image_file_id = file_id.to_string())
  }

  pub(crate) fn delete_task(&self, t: &mut Turn, task_id: i64) -> ServiceResult<()> {
    let task = self.svc.tasks.get_in(task_id, &t.current)?;
    t.show(views::confirm_delete_task(&task));
    Ok(())
  }

  /// Delete and compact; participants who are all done only because the task
  /// disappeared get their congratulations now.
  pub(crate) fn confirm_delete_task(&self, t: &mut Turn, task_id: i64) -> ServiceResult<()> {
    let c = self.managed(t)?;
    let before = self.svc.completions.finished_participants(&c.id)?;
    let task = self.svc.tasks.delete(task_id, &c.id)?;
    for p in self.svc.completions.newly_finished(&c.id, &before)? {
      t.notify(Notice::UserChallengeCompleted { user: p.telegram_id, challenge_name: c.name.clone() });
      t.notify(Notice::ChallengeCompleted {
        challenge_id: c.id.clone(),
        actor: p.telegram_id,
        name: p.display_name,
        emoji: p.emoji,
      });
    }
    self.edit_tasks_with(t, &format!("🗑 Task <b>{}</b> deleted.", escape_html(&task.title)))
  }

  // --- ordering

  pub(crate) fn reorder_tasks(&self, t: &mut Turn) -> ServiceResult<()> {
    if self.svc.tasks.count(&t.current)? < 2 {
      return self.admin_panel_with(t, "ℹ️ Add at least two tasks to reorder them.");
    }
    self.enter(t, S::ReorderSelectTask, Scratch::Reorder { task_id: None })
  }

  pub(crate) fn reorder_select(&self, t: &mut Turn, task_id: i64) -> ServiceResult<()> {
    self.svc.tasks.get_in(task_id, &t.current)?;
    self.enter(t, S::ReorderSelectPosition, Scratch::Reorder { task_id: Some(task_id) })
  }

  pub(crate) fn reorder_select_text(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    self.managed(t)?;
    let tasks = self.svc.tasks.list(&t.current)?;
    let n = parse_position(text, tasks.len())?;
    let task = tasks.iter().find(|x| x.order_num == n).ok_or(ServiceError::TaskNotFound)?;
    self.reorder_select(t, task.id)
  }

  pub(crate) fn reorder_position(&self, t: &mut Turn, task_id: i64, pos: i64) -> ServiceResult<()> {
    let c = self.managed(t)?;
    self.svc.tasks.move_task(task_id, &c.id, pos)?;
    info!(target: "conversation", user = t.user, task_id, pos, "Task moved");
    self.edit_tasks_with(t, &format!("✅ Moved to position {pos}."))
  }

  pub(crate) fn reorder_position_text(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let task_id = t.scratch.reorder_task_id().ok_or(ServiceError::TaskNotFound)?;
    let pos = parse_position(text, self.svc.tasks.count(&t.current)?)?;
    self.reorder_position(t, task_id, pos)
  }

  pub(crate) fn randomize(&self, t: &mut Turn) -> ServiceResult<()> {
    let c = self.managed(t)?;
    self.svc.tasks.randomize_order(&c.id)?;
    self.edit_tasks_with(t, "🎲 Tasks shuffled.")
  }

  // --- challenge settings

  pub(crate) fn new_challenge_name(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    self.svc.challenges.update_name(&t.current, t.user, text)?;
    self.admin_panel_with(t, "✅ Name updated.")
  }

  pub(crate) fn new_challenge_description(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    self.svc.challenges.update_description(&t.current, t.user, text)?;
    self.admin_panel_with(t, "✅ Description updated.")
  }

  pub(crate) fn new_daily_limit(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let limit = validate::daily_limit(text)?;
    self.svc.challenges.update_daily_limit(&t.current, t.user, limit)?;
    self.admin_panel_with(t, "✅ Daily limit updated.")
  }

  pub(crate) fn toggle_hide_future(&self, t: &mut Turn) -> ServiceResult<()> {
    let hide = self.svc.challenges.toggle_hide_future_tasks(&t.current, t.user)?;
    self.admin_panel_with(t, if hide { "🙈 Future tasks are now hidden." } else { "👀 All tasks are now visible." })
  }

  pub(crate) fn delete_challenge(&self, t: &mut Turn) -> ServiceResult<()> {
    let c = self.managed(t)?;
    t.show(views::confirm_delete_challenge(&c));
    Ok(())
  }

  /// Delete, then clear every user's pointer to the challenge and tell the members.
  pub(crate) fn confirm_delete_challenge(&self, t: &mut Turn) -> ServiceResult<()> {
    let c = self.managed(t)?;
    let recipients = self.svc.participants.list(&c.id)?.into_iter().map(|p| p.telegram_id).collect();
    let deleted = self.svc.challenges.delete(&c.id, t.user)?;
    let cleared = self.svc.db.reset_user_states_by_challenge(&deleted.id, Utc::now())?;
    info!(target: "conversation", user = t.user, id = %deleted.id, cleared, "Challenge deleted");

    t.notify(Notice::ChallengeDeleted { challenge_name: deleted.name.clone(), actor: t.user, recipients });
    t.reset_all();
    let is_super = self.svc.super_admins.is_super_admin(t.user)?;
    t.show(
      views::root_menu(is_super)
        .with_notice(&format!("🗑 Challenge <b>{}</b> deleted.", escape_html(&deleted.name))),
    );
    Ok(())
  }
}
