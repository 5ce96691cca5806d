//! Challenge membership and per-member settings.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::domain::{Participant, UserId, MAX_PARTICIPANTS_PER_CHALLENGE};
use crate::error::{DatabaseError, ServiceError, ServiceResult};
use crate::storage::{Database, NewParticipant};
use crate::validate;

#[derive(Clone)]
pub struct ParticipantService {
  db: Arc<Database>,
}

impl ParticipantService {
  pub fn new(db: Arc<Database>) -> Self { Self { db } }

  /// Add `user` to the challenge. The unique indexes back up the pre-checks,
  /// so a racing join with the same emoji still reports `EmojiTaken`.
  #[instrument(level = "info", skip(self, name, emoji))]
  pub fn join(
    &self,
    challenge_id: &str,
    user: UserId,
    name: &str,
    emoji: &str,
    offset_minutes: i32,
  ) -> ServiceResult<Participant> {
    let name = validate::display_name(name)?;
    let emoji = validate::emoji(emoji)?;
    if self.db.get_challenge(challenge_id)?.is_none() {
      return Err(ServiceError::ChallengeNotFound);
    }
    if self.db.get_participant(challenge_id, user)?.is_some() {
      return Err(ServiceError::AlreadyMember);
    }
    if self.db.count_participants(challenge_id)? >= MAX_PARTICIPANTS_PER_CHALLENGE {
      return Err(ServiceError::ChallengeFull);
    }
    if self.db.used_emojis(challenge_id)?.iter().any(|e| *e == emoji) {
      return Err(ServiceError::EmojiTaken);
    }

    let new = NewParticipant {
      challenge_id,
      telegram_id: user,
      display_name: &name,
      emoji: &emoji,
      time_offset_minutes: offset_minutes,
    };
    match self.db.insert_participant(&new, Utc::now()) {
      Ok(p) => {
        info!(target: "challenge", %challenge_id, user, participant_id = p.id, "Participant joined");
        Ok(p)
      }
      Err(DatabaseError::ConstraintViolation(msg)) => {
        warn!(target: "challenge", %challenge_id, user, %msg, "Join lost a race");
        if self.db.get_participant(challenge_id, user)?.is_some() {
          Err(ServiceError::AlreadyMember)
        } else {
          Err(ServiceError::EmojiTaken)
        }
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Membership of `user` in the challenge, or `ParticipantNotFound`.
  pub fn get(&self, challenge_id: &str, user: UserId) -> ServiceResult<Participant> {
    self.db.get_participant(challenge_id, user)?.ok_or(ServiceError::ParticipantNotFound)
  }

  pub fn find(&self, challenge_id: &str, user: UserId) -> ServiceResult<Option<Participant>> {
    Ok(self.db.get_participant(challenge_id, user)?)
  }

  pub fn list(&self, challenge_id: &str) -> ServiceResult<Vec<Participant>> {
    Ok(self.db.participants_for_challenge(challenge_id)?)
  }

  pub fn used_emojis(&self, challenge_id: &str) -> ServiceResult<Vec<String>> {
    Ok(self.db.used_emojis(challenge_id)?)
  }

  #[instrument(level = "info", skip(self, name))]
  pub fn update_name(&self, participant_id: i64, name: &str) -> ServiceResult<()> {
    let name = validate::display_name(name)?;
    if !self.db.update_participant_name(participant_id, &name)? {
      return Err(ServiceError::ParticipantNotFound);
    }
    Ok(())
  }

  /// Change emoji; taken by anyone other than this participant is a conflict.
  #[instrument(level = "info", skip(self, emoji))]
  pub fn update_emoji(&self, participant_id: i64, challenge_id: &str, emoji: &str) -> ServiceResult<()> {
    let emoji = validate::emoji(emoji)?;
    let me = self.db.get_participant_by_id(participant_id)?.ok_or(ServiceError::ParticipantNotFound)?;
    if me.emoji == emoji {
      return Ok(());
    }
    let taken = self
      .db
      .participants_for_challenge(challenge_id)?
      .iter()
      .any(|p| p.id != participant_id && p.emoji == emoji);
    if taken {
      return Err(ServiceError::EmojiTaken);
    }
    match self.db.update_participant_emoji(participant_id, &emoji) {
      Ok(_) => Ok(()),
      Err(DatabaseError::ConstraintViolation(_)) => Err(ServiceError::EmojiTaken),
      Err(e) => Err(e.into()),
    }
  }

  pub fn update_time_offset(&self, participant_id: i64, offset_minutes: i32) -> ServiceResult<()> {
    if !self.db.update_participant_offset(participant_id, offset_minutes)? {
      return Err(ServiceError::ParticipantNotFound);
    }
    Ok(())
  }

  /// Flip notifications; returns the new value.
  pub fn toggle_notifications(&self, participant_id: i64) -> ServiceResult<bool> {
    let p = self.db.get_participant_by_id(participant_id)?.ok_or(ServiceError::ParticipantNotFound)?;
    let enabled = !p.notifications_enabled;
    self.db.set_participant_notifications(participant_id, enabled)?;
    Ok(enabled)
  }

  /// Remove the membership and its completions.
  #[instrument(level = "info", skip(self))]
  pub fn leave(&self, participant_id: i64) -> ServiceResult<()> {
    if !self.db.delete_participant(participant_id)? {
      return Err(ServiceError::ParticipantNotFound);
    }
    info!(target: "challenge", participant_id, "Participant left");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::challenge::{ChallengeService, NewChallenge};

  fn setup() -> (ParticipantService, String) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let c = ChallengeService::new(db.clone())
      .create(NewChallenge {
        name: "Reading".into(),
        description: String::new(),
        creator_id: 1,
        daily_task_limit: 0,
        hide_future_tasks: false,
      })
      .unwrap();
    (ParticipantService::new(db), c.id)
  }

  #[test]
  fn emoji_must_be_unique_until_released() {
    let (s, cid) = setup();
    let p1 = s.join(&cid, 1, "John", "💪", 0).unwrap();
    assert!(matches!(s.join(&cid, 2, "Sarah", "💪", 0), Err(ServiceError::EmojiTaken)));

    s.update_emoji(p1.id, &cid, "🔥").unwrap();
    let p2 = s.join(&cid, 2, "Sarah", "💪", 0).unwrap();
    assert_eq!(p2.emoji, "💪");
    assert!(matches!(s.update_emoji(p2.id, &cid, "🔥"), Err(ServiceError::EmojiTaken)));
    // keeping your own emoji is fine
    s.update_emoji(p2.id, &cid, "💪").unwrap();
  }

  #[test]
  fn join_rejects_bad_input_and_duplicates() {
    let (s, cid) = setup();
    assert!(matches!(s.join(&cid, 1, "", "💪", 0), Err(ServiceError::Validation(_))));
    assert!(matches!(s.join(&cid, 1, &"x".repeat(31), "💪", 0), Err(ServiceError::Validation(_))));
    assert!(matches!(s.join(&cid, 1, "John", "abc", 0), Err(ServiceError::Validation(_))));
    assert!(matches!(s.join("NOPE0000", 1, "John", "💪", 0), Err(ServiceError::ChallengeNotFound)));

    s.join(&cid, 1, "John", "💪", 0).unwrap();
    assert!(matches!(s.join(&cid, 1, "John", "🔥", 0), Err(ServiceError::AlreadyMember)));
  }

  #[test]
  fn settings_round_trip() {
    let (s, cid) = setup();
    let p = s.join(&cid, 1, "John", "💪", 60).unwrap();
    assert!(p.notifications_enabled);

    assert!(!s.toggle_notifications(p.id).unwrap());
    assert!(s.toggle_notifications(p.id).unwrap());
    s.update_name(p.id, "Johnny").unwrap();
    s.update_time_offset(p.id, -300).unwrap();

    let got = s.get(&cid, 1).unwrap();
    assert_eq!(got.display_name, "Johnny");
    assert_eq!(got.time_offset_minutes, -300);

    s.leave(p.id).unwrap();
    assert!(matches!(s.get(&cid, 1), Err(ServiceError::ParticipantNotFound)));
    assert!(matches!(s.leave(p.id), Err(ServiceError::ParticipantNotFound)));
  }
}
