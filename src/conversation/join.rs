//! Joining a challenge by ID or deep link, and the sync-time step it shares with settings.

use tracing::info;

use crate::conversation::controller::{Controller, Turn};
use crate::conversation::scratch::{JoinDraft, Scratch};
use crate::conversation::state::ConversationState as S;
use crate::conversation::views;
use crate::error::{ServiceError, ServiceResult};
use crate::notifier::Notice;
use crate::validate;

impl Controller {
  pub(crate) fn start_join(&self, t: &mut Turn) -> ServiceResult<()> {
    self.enter(t, S::AwaitingChallengeId, Scratch::Join(JoinDraft::default()))
  }

  pub(crate) fn challenge_id(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let id = validate::challenge_id(text)?;
    self.svc.challenges.can_join(&id, t.user)?;
    self.enter(t, S::AwaitingParticipantName, Scratch::Join(JoinDraft { challenge_id: id, ..JoinDraft::default() }))
  }

  /// `/start <ID>`: members land on the challenge, everyone else goes straight to the name step.
  pub(crate) fn deep_link(&self, t: &mut Turn, payload: &str) -> ServiceResult<()> {
    let id = match validate::challenge_id(payload) {
      Ok(id) => id,
      Err(_) => {
        info!(target: "conversation", user = t.user, "Ignoring malformed start payload");
        return self.main_menu(t);
      }
    };
    match self.svc.challenges.can_join(&id, t.user) {
      Ok(_) => self.enter(t, S::AwaitingParticipantName, Scratch::Join(JoinDraft { challenge_id: id, ..JoinDraft::default() })),
      Err(ServiceError::AlreadyMember) => {
        t.current = id;
        let view = self.challenge_view(t)?;
        t.show(view.with_notice(&views::error_text(&ServiceError::AlreadyMember)));
        Ok(())
      }
      Err(e) => Err(e),
    }
  }

  pub(crate) fn participant_name(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let mut draft = t.scratch.join();
    draft.display_name = validate::display_name(text)?;
    self.enter(t, S::AwaitingParticipantEmoji, Scratch::Join(draft))
  }

  pub(crate) fn participant_emoji(&self, t: &mut Turn, text: &str) -> ServiceResult<()> {
    let mut draft = t.scratch.join();
    let emoji = validate::emoji(text)?;
    if self.svc.participants.used_emojis(&draft.challenge_id)?.contains(&emoji) {
      return Err(ServiceError::EmojiTaken);
    }
    draft.emoji = emoji;
    self.enter(t, S::AwaitingSyncTime, Scratch::Join(draft))
  }

  /// Final join step, or a settings change when entered from the settings screen.
  pub(crate) fn sync_time(&self, t: &mut Turn, offset_minutes: i32) -> ServiceResult<()> {
    match &t.scratch {
      Scratch::Settings => {
        let (_, p) = self.member(t)?;
        self.svc.participants.update_time_offset(p.id, offset_minutes)?;
        t.reset();
        let (_, p) = self.member(t)?;
        t.show(views::settings(&p).with_notice("✅ Time zone updated."));
        Ok(())
      }
      _ => self.finish_join(t, offset_minutes),
    }
  }

  fn finish_join(&self, t: &mut Turn, offset_minutes: i32) -> ServiceResult<()> {
    let draft = t.scratch.join();
    let p = self.svc.participants.join(&draft.challenge_id, t.user, &draft.display_name, &draft.emoji, offset_minutes)?;
    info!(target: "conversation", user = t.user, id = %draft.challenge_id, "Joined challenge");
    t.notify(Notice::Joined {
      challenge_id: p.challenge_id.clone(),
      actor: t.user,
      name: p.display_name.clone(),
      emoji: p.emoji.clone(),
    });
    t.reset();
    t.current = p.challenge_id;
    let view = self.challenge_view(t)?;
    t.show(view.with_notice("🎉 Welcome aboard!"));
    Ok(())
  }
}
