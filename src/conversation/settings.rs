//! Participant settings and leaving a challenge.

use tracing::info;

use crate::conversation::controller::{Controller, Turn};
use crate::conversation::scratch::Scratch;
use crate::conversation::state::ConversationState as S;
use crate::conversation::views;
use crate::error::ServiceResult;
use crate::notifier::Notice;

impl Controller {
  pub(crate) fn settings(&self, t: &mut Turn) -> ServiceResult<()> {
    let (_, p) = self.member(t)?;
    t.show(views::settings(&p));
    Ok(())
  }

  fn settings_updated(&self, t: &mut Turn, notice: &str) -> ServiceResult<()> {
    t.reset();
    let (_, p) = self.member(t)?;
    t.show(views::settings(&p).with_notice(notice));
    Ok(())
  }

  pub(crate) fn change_name(&self, t: &mut Turn) -> ServiceResult<()> {
    self.member(t)?;
    self.enter(t, S::AwaitingNewName, Scratch::Settings)
  }

  pub(crate) fn change_emoji(&self, t: &mut Turn) -> ServiceResult<()> {
    self.member(t)?;
    self.enter(t, S::AwaitingNewEmoji, Scratch::Settings)
  }

  pub(crate) fn change_sync_time(&self, t: &mut Turn) -> ServiceResult<()> {
    self.member(t)?;
    self.enter(t, S::AwaitingSyncTime, Scratch::Settings)
  }

  pub(crate) fn new_name(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let (_, p) = self.member(t)?;
    self.svc.participants.update_name(p.id, text)?;
    self.settings_updated(t, "✅ Name updated.")
  }

  pub(crate) fn new_emoji(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let (c, p) = self.member(t)?;
    self.svc.participants.update_emoji(p.id, &c.id, text)?;
    self.settings_updated(t, "✅ Emoji updated.")
  }

  pub(crate) fn toggle_notifications(&self, t: &mut Turn) -> ServiceResult<()> {
    let (_, p) = self.member(t)?;
    let on = self.svc.participants.toggle_notifications(p.id)?;
    self.settings_updated(t, if on { "🔔 Notifications on." } else { "🔕 Notifications off." })
  }

  pub(crate) fn leave(&self, t: &mut Turn) -> ServiceResult<()> {
    let (c, _) = self.member(t)?;
    if c.is_creator(t.user) {
      t.show(views::settings_creator_cannot_leave(&c));
      return Ok(());
    }
    t.show(views::confirm_leave(&c));
    Ok(())
  }

  pub(crate) fn confirm_leave(&self, t: &mut Turn) -> ServiceResult<()> {
    let (c, p) = self.member(t)?;
    if c.is_creator(t.user) {
      t.show(views::settings_creator_cannot_leave(&c));
      return Ok(());
    }
    self.svc.participants.leave(p.id)?;
    info!(target: "conversation", user = t.user, id = %c.id, "Left challenge");
    t.notify(Notice::Left { challenge_id: c.id.clone(), actor: t.user, name: p.display_name, emoji: p.emoji });
    t.reset_all();
    let is_super = self.svc.super_admins.is_super_admin(t.user)?;
    t.show(views::root_menu(is_super).with_notice(&format!("🚪 You left <b>{}</b>.", crate::util::escape_html(&c.name))));
    Ok(())
  }
}
