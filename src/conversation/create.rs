//! Challenge creation, from scratch or from a template.

use tracing::{info, warn};

use crate::conversation::controller::{Controller, Turn};
use crate::conversation::scratch::{CreateDraft, Scratch};
use crate::conversation::state::ConversationState as S;
use crate::conversation::views;
use crate::domain::MAX_CHALLENGES_PER_USER;
use crate::error::{ServiceError, ServiceResult};
use crate::notifier::Notice;
use crate::services::NewChallenge;
use crate::validate;

impl Controller {
  fn ensure_room_for_challenge(&self, t: &Turn) -> ServiceResult<()> {
    if self.svc.db.count_challenges_for_user(t.user)? >= MAX_CHALLENGES_PER_USER {
      return Err(ServiceError::MaxChallengesReached);
    }
    Ok(())
  }

  pub(crate) fn start_create(&self, t: &mut Turn) -> ServiceResult<()> {
    self.ensure_room_for_challenge(t)?;
    self.enter(t, S::AwaitingChallengeName, Scratch::Create(CreateDraft::default()))
  }

  pub(crate) fn template_picker(&self, t: &mut Turn) -> ServiceResult<()> {
    let templates = self.svc.templates.list()?;
    t.show(views::template_picker(&templates));
    Ok(())
  }

  /// Template settings are copied up front; the flow only asks for the creator's profile.
  pub(crate) fn use_template(&self, t: &mut Turn, template_id: i64) -> ServiceResult<()> {
    self.ensure_room_for_challenge(t)?;
    let (template, _) = self.svc.templates.get(template_id)?;
    let draft = CreateDraft {
      name: template.name,
      description: template.description,
      daily_limit: template.daily_task_limit,
      hide_future: template.hide_future_tasks,
      template_id: Some(template_id),
      ..CreateDraft::default()
    };
    self.enter(t, S::AwaitingCreatorName, Scratch::Create(draft))
  }

  pub(crate) fn challenge_name(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let mut draft = t.scratch.create();
    draft.name = validate::challenge_name(text)?;
    self.enter(t, S::AwaitingChallengeDescription, Scratch::Create(draft))
  }

  pub(crate) fn challenge_description(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let mut draft = t.scratch.create();
    draft.description = validate::challenge_description(text)?;
    self.enter(t, S::AwaitingCreatorName, Scratch::Create(draft))
  }

  pub(crate) fn creator_name(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let mut draft = t.scratch.create();
    draft.display_name = validate::display_name(text)?;
    self.enter(t, S::AwaitingCreatorEmoji, Scratch::Create(draft))
  }

  pub(crate) fn creator_emoji(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let mut draft = t.scratch.create();
    draft.emoji = validate::emoji(text)?;
    let next = if draft.template_id.is_some() { S::AwaitingCreatorSyncTime } else { S::AwaitingDailyLimit };
    self.enter(t, next, Scratch::Create(draft))
  }

  pub(crate) fn daily_limit(&self, t: &mut Turn, limit: u32) -> ServiceResult<()> {
    let mut draft = t.scratch.create();
    draft.daily_limit = limit;
    self.enter(t, S::AwaitingHideFutureTasks, Scratch::Create(draft))
  }

  pub(crate) fn hide_future(&self, t: &mut Turn, hide: bool) -> ServiceResult<()> {
    let mut draft = t.scratch.create();
    draft.hide_future = hide;
    self.enter(t, S::AwaitingCreatorSyncTime, Scratch::Create(draft))
  }

  /// Persist the challenge and enrol the creator. A failed enrolment deletes the
  /// fresh challenge again so no creator-less challenge is left behind.
  pub(crate) fn finish_create(&self, t: &mut Turn, offset_minutes: i32) -> ServiceResult<()> {
    let draft = t.scratch.create();
    let challenge = match draft.template_id {
      Some(template_id) => self.svc.challenges.create_from_template(template_id, &draft.name, t.user)?,
      None => self.svc.challenges.create(NewChallenge {
        name: draft.name.clone(),
        description: draft.description.clone(),
        creator_id: t.user,
        daily_task_limit: draft.daily_limit,
        hide_future_tasks: draft.hide_future,
      })?,
    };

    let participant =
      match self.svc.participants.join(&challenge.id, t.user, &draft.display_name, &draft.emoji, offset_minutes) {
        Ok(p) => p,
        Err(e) => {
          warn!(target: "conversation", user = t.user, id = %challenge.id, error = %e, "Creator could not join; removing challenge");
          if let Err(cleanup) = self.svc.db.delete_challenge(&challenge.id) {
            warn!(target: "conversation", id = %challenge.id, error = %cleanup, "Cleanup delete failed");
          }
          return Err(e);
        }
      };

    info!(target: "conversation", user = t.user, id = %challenge.id, template = ?draft.template_id, "Challenge created");
    t.notify(Notice::Joined {
      challenge_id: challenge.id.clone(),
      actor: t.user,
      name: participant.display_name,
      emoji: participant.emoji,
    });
    t.reset();
    t.current = challenge.id.clone();

    let view = self.challenge_view(t)?;
    t.show(view.with_notice(&format!(
      "🎉 Challenge created! Share the ID <code>{}</code> so friends can join.",
      challenge.id
    )));
    Ok(())
  }
}
