//! Participant task screens: current task, list, navigation, completion, progress and sharing.

use std::collections::HashSet;

use tracing::info;

use crate::conversation::controller::{Controller, Turn};
use crate::conversation::views::{self, TaskScreen};
use crate::domain::{Challenge, Participant, Task};
use crate::error::{ServiceError, ServiceResult};
use crate::notifier::Notice;
use crate::services::completion::{current_task_num, is_all_completed};

/// What one viewer may see of a challenge's tasks.
struct TaskContext {
  challenge: Challenge,
  me: Option<Participant>,
  tasks: Vec<Task>,
  done: HashSet<i64>,
  /// With hidden future tasks: open tasks numbered above this are locked.
  lock: Option<i64>,
}

impl TaskContext {
  fn is_locked(&self, task: &Task) -> bool {
    self.lock.is_some_and(|n| task.order_num > n) && !self.done.contains(&task.id)
  }

  fn find(&self, task_id: i64) -> ServiceResult<&Task> {
    self.tasks.iter().find(|x| x.id == task_id).ok_or(ServiceError::TaskNotFound)
  }
}

impl Controller {
  fn task_context(&self, t: &Turn) -> ServiceResult<TaskContext> {
    let (challenge, me) = self.viewer(t)?;
    let tasks = self.svc.tasks.list(&challenge.id)?;
    let done = match &me {
      Some(p) => self.svc.completions.completed_task_ids(p.id)?,
      None => HashSet::new(),
    };
    // admins and observers see everything
    let hides = challenge.hide_future_tasks && me.is_some() && !self.svc.challenges.is_admin(&challenge, t.user);
    let lock = match current_task_num(&done, &tasks) {
      n if hides && n > 0 => Some(n),
      _ => None,
    };
    Ok(TaskContext { challenge, me, tasks, done, lock })
  }

  fn render_task(&self, t: &mut Turn, ctx: &TaskContext, task: &Task, notice: Option<&str>) {
    let prev = ctx
      .tasks
      .iter()
      .filter(|x| x.order_num < task.order_num && !ctx.is_locked(x))
      .max_by_key(|x| x.order_num)
      .map(|x| x.id);
    let next = ctx
      .tasks
      .iter()
      .filter(|x| x.order_num > task.order_num && !ctx.is_locked(x))
      .min_by_key(|x| x.order_num)
      .map(|x| x.id);
    let mut view = views::task_view(&TaskScreen {
      task,
      total: ctx.tasks.len(),
      completed: ctx.done.contains(&task.id),
      can_complete: ctx.me.is_some(),
      prev,
      next,
    });
    if let Some(n) = notice {
      view = view.with_notice(n);
    }
    if task.has_image() {
      t.photo(&task.image_file_id, view);
    } else {
      t.show(view);
    }
  }

  pub(crate) fn current_task(&self, t: &mut Turn) -> ServiceResult<()> {
    let ctx = self.task_context(t)?;
    self.show_current(t, &ctx, None)
  }

  fn show_current(&self, t: &mut Turn, ctx: &TaskContext, notice: Option<&str>) -> ServiceResult<()> {
    if ctx.tasks.is_empty() {
      let is_admin = self.svc.challenges.is_admin(&ctx.challenge, t.user);
      t.show(views::no_tasks(&ctx.challenge, is_admin));
      return Ok(());
    }
    let target = match ctx.me {
      Some(_) => current_task_num(&ctx.done, &ctx.tasks),
      None => 1,
    };
    if target == 0 {
      let mut view = views::all_done(&ctx.challenge);
      if let Some(n) = notice {
        view = view.with_notice(n);
      }
      t.show(view);
      return Ok(());
    }
    let task = ctx.tasks.iter().find(|x| x.order_num == target).ok_or(ServiceError::TaskNotFound)?;
    self.render_task(t, ctx, task, notice);
    Ok(())
  }

  pub(crate) fn task_list(&self, t: &mut Turn) -> ServiceResult<()> {
    let ctx = self.task_context(t)?;
    t.show(views::task_list(&ctx.challenge, &ctx.tasks, &ctx.done, ctx.lock));
    Ok(())
  }

  pub(crate) fn show_task(&self, t: &mut Turn, task_id: i64) -> ServiceResult<()> {
    let ctx = self.task_context(t)?;
    let task = ctx.find(task_id)?;
    if ctx.is_locked(task) {
      t.show(views::task_locked(&ctx.challenge));
      return Ok(());
    }
    self.render_task(t, &ctx, task, None);
    Ok(())
  }

  /// Mark a task done, honouring hidden future tasks and the daily limit.
  pub(crate) fn complete_task(&self, t: &mut Turn, task_id: i64) -> ServiceResult<()> {
    let mut ctx = self.task_context(t)?;
    let p = ctx.me.clone().ok_or(ServiceError::ParticipantNotFound)?;
    let task = ctx.find(task_id)?.clone();

    if ctx.done.contains(&task_id) {
      self.render_task(t, &ctx, &task, None);
      return Ok(());
    }
    if ctx.is_locked(&task) {
      t.show(views::task_locked(&ctx.challenge));
      return Ok(());
    }
    let status = self.svc.completions.check_daily_limit(&p, ctx.challenge.daily_task_limit)?;
    if !status.allowed {
      info!(target: "conversation", user = t.user, participant_id = p.id, completed = status.completed, "Daily limit reached");
      t.show(views::daily_limit_reached(&ctx.challenge, &status));
      return Ok(());
    }

    self.svc.completions.complete(task_id, p.id)?;
    ctx.done.insert(task_id);
    t.notify(Notice::TaskCompleted {
      challenge_id: ctx.challenge.id.clone(),
      actor: t.user,
      name: p.display_name.clone(),
      emoji: p.emoji.clone(),
      task_num: task.order_num,
      task_title: task.title.clone(),
    });

    if is_all_completed(ctx.done.len(), ctx.tasks.len()) {
      info!(target: "conversation", user = t.user, id = %ctx.challenge.id, "Participant finished the challenge");
      t.notify(Notice::UserChallengeCompleted { user: t.user, challenge_name: ctx.challenge.name.clone() });
      t.notify(Notice::ChallengeCompleted {
        challenge_id: ctx.challenge.id.clone(),
        actor: t.user,
        name: p.display_name,
        emoji: p.emoji,
      });
    }

    // the next task may have just unlocked
    ctx = self.task_context(t)?;
    self.show_current(t, &ctx, Some(&format!("✅ Task #{} done!", task.order_num)))
  }

  pub(crate) fn uncomplete_task(&self, t: &mut Turn, task_id: i64) -> ServiceResult<()> {
    let ctx = self.task_context(t)?;
    let p = ctx.me.as_ref().ok_or(ServiceError::ParticipantNotFound)?;
    ctx.find(task_id)?;
    self.svc.completions.uncomplete(task_id, p.id)?;
    let ctx = self.task_context(t)?;
    let task = ctx.find(task_id)?;
    self.render_task(t, &ctx, task, Some("↩️ Marked as not done."));
    Ok(())
  }

  pub(crate) fn progress(&self, t: &mut Turn) -> ServiceResult<()> {
    let (c, _) = self.viewer(t)?;
    let rows = self.svc.completions.progress(&c.id)?;
    t.show(views::progress(&c, &rows));
    Ok(())
  }

  pub(crate) fn share_id(&self, t: &mut Turn) -> ServiceResult<()> {
    let (c, _) = self.viewer(t)?;
    t.show(views::share(&c, self.bot_username.as_deref()));
    Ok(())
  }
}
