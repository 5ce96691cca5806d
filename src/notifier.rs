//! Fan-out of challenge events to co-participants.
//!
//! Recipients are resolved against the database right after the triggering
//! mutation commits, then queued on a bounded channel. A single worker drains
//! the queue through the bot client, so messages to one recipient keep their
//! order. A full queue drops the message with a warning.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::domain::UserId;
use crate::storage::Database;
use crate::telegram::client::TelegramClient;
use crate::util::escape_html;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Something co-participants should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
  Joined { challenge_id: String, actor: UserId, name: String, emoji: String },
  TaskCompleted { challenge_id: String, actor: UserId, name: String, emoji: String, task_num: i64, task_title: String },
  /// Told to everyone else when `actor` finishes the last task.
  ChallengeCompleted { challenge_id: String, actor: UserId, name: String, emoji: String },
  /// Told to the finisher directly.
  UserChallengeCompleted { user: UserId, challenge_name: String },
  Left { challenge_id: String, actor: UserId, name: String, emoji: String },
  /// Recipients are captured before the delete, since memberships cascade away.
  ChallengeDeleted { challenge_name: String, actor: UserId, recipients: Vec<UserId> },
}

/// One queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
  pub chat_id: UserId,
  pub text: String,
}

#[derive(Clone)]
pub struct Notifier {
  db: Arc<Database>,
  tx: mpsc::Sender<Delivery>,
}

impl Notifier {
  /// Build the notifier and the receiving end the worker drains.
  pub fn new(db: Arc<Database>, capacity: usize) -> (Self, mpsc::Receiver<Delivery>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Self { db, tx }, rx)
  }

  /// Participants with notifications on, minus the actor.
  fn co_participants(&self, challenge_id: &str, actor: UserId) -> Vec<UserId> {
    match self.db.participants_for_challenge(challenge_id) {
      Ok(ps) => ps
        .into_iter()
        .filter(|p| p.notifications_enabled && p.telegram_id != actor)
        .map(|p| p.telegram_id)
        .collect(),
      Err(e) => {
        warn!(target: "notifier", %challenge_id, error = %e, "Could not resolve recipients");
        Vec::new()
      }
    }
  }

  fn challenge_name(&self, challenge_id: &str) -> String {
    match self.db.get_challenge(challenge_id) {
      Ok(Some(c)) => c.name,
      _ => challenge_id.to_string(),
    }
  }

  /// Resolve recipients and message text for a notice.
  pub fn resolve(&self, notice: &Notice) -> Vec<Delivery> {
    let (recipients, text) = match notice {
      Notice::Joined { challenge_id, actor, name, emoji } => (
        self.co_participants(challenge_id, *actor),
        format!(
          "👋 {emoji} <b>{}</b> joined <b>{}</b>!",
          escape_html(name),
          escape_html(&self.challenge_name(challenge_id))
        ),
      ),
      Notice::TaskCompleted { challenge_id, actor, name, emoji, task_num, task_title } => (
        self.co_participants(challenge_id, *actor),
        format!(
          "✅ {emoji} <b>{}</b> completed task #{task_num}: {}",
          escape_html(name),
          escape_html(task_title)
        ),
      ),
      Notice::ChallengeCompleted { challenge_id, actor, name, emoji } => (
        self.co_participants(challenge_id, *actor),
        format!(
          "🏆 {emoji} <b>{}</b> finished every task in <b>{}</b>!",
          escape_html(name),
          escape_html(&self.challenge_name(challenge_id))
        ),
      ),
      Notice::UserChallengeCompleted { user, challenge_name } => (
        vec![*user],
        format!("🎉 Congratulations! You completed all tasks in <b>{}</b>!", escape_html(challenge_name)),
      ),
      Notice::Left { challenge_id, actor, name, emoji } => (
        self.co_participants(challenge_id, *actor),
        format!(
          "🚪 {emoji} <b>{}</b> left <b>{}</b>.",
          escape_html(name),
          escape_html(&self.challenge_name(challenge_id))
        ),
      ),
      // ignores the notifications flag: members need to know their challenge is gone
      Notice::ChallengeDeleted { challenge_name, actor, recipients } => (
        recipients.iter().copied().filter(|u| u != actor).collect(),
        format!("🗑 The challenge <b>{}</b> was deleted by its admin.", escape_html(challenge_name)),
      ),
    };
    recipients.into_iter().map(|chat_id| Delivery { chat_id, text: text.clone() }).collect()
  }

  /// Queue a notice for delivery. Returns how many messages were queued.
  #[instrument(level = "debug", skip(self, notice))]
  pub fn notify(&self, notice: &Notice) -> usize {
    let mut queued = 0;
    for d in self.resolve(notice) {
      let chat_id = d.chat_id;
      match self.tx.try_send(d) {
        Ok(()) => queued += 1,
        Err(mpsc::error::TrySendError::Full(_)) => {
          warn!(target: "notifier", chat_id, "Notification queue full; dropping message");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
          warn!(target: "notifier", chat_id, "Notification worker gone; dropping message");
        }
      }
    }
    debug!(target: "notifier", queued, "Notice queued");
    queued
  }

  pub fn notify_all(&self, notices: &[Notice]) -> usize {
    notices.iter().map(|n| self.notify(n)).sum()
  }
}

/// Drain the queue until every sender is dropped. Send failures are logged and skipped.
pub async fn run_worker(mut rx: mpsc::Receiver<Delivery>, bot: TelegramClient) {
  info!(target: "notifier", "Notification worker started");
  while let Some(d) = rx.recv().await {
    if let Err(e) = bot.send_message(d.chat_id, &d.text, None).await {
      warn!(target: "notifier", chat_id = d.chat_id, error = %e, "Notification send failed");
    }
  }
  info!(target: "notifier", "Notification worker stopped");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::challenges::tests::sample_challenge;
  use crate::storage::participants::tests::join;

  fn setup() -> (Arc<Database>, String) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let c = sample_challenge("CHAL0001", 1);
    db.insert_challenge(&c).unwrap();
    join(&db, "CHAL0001", 1, "Ann", "💪");
    join(&db, "CHAL0001", 2, "Bob", "🔥");
    let muted = join(&db, "CHAL0001", 3, "Cid", "🌟");
    db.set_participant_notifications(muted.id, false).unwrap();
    (db, c.id)
  }

  fn completed(cid: &str, actor: UserId) -> Notice {
    Notice::TaskCompleted {
      challenge_id: cid.into(),
      actor,
      name: "Ann".into(),
      emoji: "💪".into(),
      task_num: 2,
      task_title: "Push <ups>".into(),
    }
  }

  #[tokio::test]
  async fn skips_actor_and_muted_members() {
    let (db, cid) = setup();
    let (n, mut rx) = Notifier::new(db, 8);
    assert_eq!(n.notify(&completed(&cid, 1)), 1);

    let d = rx.recv().await.unwrap();
    assert_eq!(d.chat_id, 2);
    assert!(d.text.contains("Push &lt;ups&gt;"));
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn deletion_ignores_mute_flag() {
    let (db, _) = setup();
    let (n, mut rx) = Notifier::new(db, 8);
    let notice = Notice::ChallengeDeleted { challenge_name: "Steps".into(), actor: 1, recipients: vec![1, 2, 3] };
    assert_eq!(n.notify(&notice), 2);
    let got: Vec<UserId> = vec![rx.recv().await.unwrap().chat_id, rx.recv().await.unwrap().chat_id];
    assert_eq!(got, vec![2, 3]);
  }

  #[tokio::test]
  async fn full_queue_drops() {
    let (db, cid) = setup();
    let (n, mut rx) = Notifier::new(db, 1);
    assert_eq!(n.notify(&completed(&cid, 1)), 1);
    assert_eq!(n.notify(&completed(&cid, 1)), 0);
    assert!(rx.recv().await.is_some());
  }

  #[test]
  fn direct_congratulation_goes_to_finisher() {
    let (db, _) = setup();
    let (n, _rx) = Notifier::new(db, 8);
    let out = n.resolve(&Notice::UserChallengeCompleted { user: 1, challenge_name: "Steps".into() });
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].chat_id, 1);
  }
}
