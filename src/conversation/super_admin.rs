//! Super-admin panel: observing any challenge, managing super admins and templates.

use tracing::info;

use crate::conversation::controller::{Controller, Turn};
use crate::conversation::scratch::Scratch;
use crate::conversation::state::ConversationState as S;
use crate::conversation::views;
use crate::domain::UserId;
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::util::escape_html;

impl Controller {
  fn ensure_super_admin(&self, t: &Turn) -> ServiceResult<()> {
    if self.svc.super_admins.is_super_admin(t.user)? {
      Ok(())
    } else {
      Err(ServiceError::NotSuperAdmin)
    }
  }

  pub(crate) fn super_admin_panel(&self, t: &mut Turn) -> ServiceResult<()> {
    self.ensure_super_admin(t)?;
    t.show(views::super_admin_panel());
    Ok(())
  }

  pub(crate) fn all_challenges(&self, t: &mut Turn) -> ServiceResult<()> {
    let all = self.svc.super_admins.all_challenges(t.user)?;
    t.show(views::all_challenges(&all));
    Ok(())
  }

  /// Open any challenge; without a membership the view is read-only.
  pub(crate) fn observe(&self, t: &mut Turn, challenge_id: String) -> ServiceResult<()> {
    self.ensure_super_admin(t)?;
    self.svc.challenges.get(&challenge_id)?;
    self.switch_to(t, challenge_id)
  }

  pub(crate) fn list_super_admins(&self, t: &mut Turn) -> ServiceResult<()> {
    let admins = self.svc.super_admins.list(t.user)?;
    t.show(views::super_admins(&admins, t.user));
    Ok(())
  }

  pub(crate) fn grant_super_admin(&self, t: &mut Turn) -> ServiceResult<()> {
    self.ensure_super_admin(t)?;
    self.enter(t, S::AwaitingSuperAdminId, Scratch::Empty)
  }

  pub(crate) fn super_admin_id(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let target: UserId = match text.trim().parse() {
      Ok(id) if id > 0 => id,
      _ => return Err(ValidationError::BadUserId.into()),
    };
    self.svc.super_admins.grant(t.user, target)?;
    info!(target: "conversation", user = t.user, target, "Super admin granted");
    t.reset();
    let admins = self.svc.super_admins.list(t.user)?;
    t.show(views::super_admins(&admins, t.user).with_notice(&format!("✅ <code>{target}</code> is now a super admin.")));
    Ok(())
  }

  pub(crate) fn revoke_super_admin(&self, t: &mut Turn, target: UserId) -> ServiceResult<()> {
    self.svc.super_admins.revoke(t.user, target)?;
    info!(target: "conversation", user = t.user, target, "Super admin revoked");
    let admins = self.svc.super_admins.list(t.user)?;
    t.show(views::super_admins(&admins, t.user).with_notice(&format!("➖ <code>{target}</code> removed.")));
    Ok(())
  }

  pub(crate) fn save_as_template(&self, t: &mut Turn) -> ServiceResult<()> {
    let template = self.svc.templates.save_from_challenge(&t.current, t.user)?;
    let view = self.challenge_view(t)?;
    t.show(view.with_notice(&format!("💾 Saved as template <b>{}</b>.", escape_html(&template.name))));
    Ok(())
  }

  pub(crate) fn manage_templates(&self, t: &mut Turn) -> ServiceResult<()> {
    self.ensure_super_admin(t)?;
    let templates = self.svc.templates.list()?;
    t.show(views::manage_templates(&templates));
    Ok(())
  }

  pub(crate) fn delete_template(&self, t: &mut Turn, template_id: i64) -> ServiceResult<()> {
    self.svc.templates.delete(template_id, t.user)?;
    let templates = self.svc.templates.list()?;
    t.show(views::manage_templates(&templates).with_notice("🗑 Template deleted."));
    Ok(())
  }
}
