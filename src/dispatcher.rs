//! Long-poll loop: turns Bot API updates into controller events and delivers
//! the replies.
//!
//! Updates of one user run strictly in arrival order: every handler task first
//! awaits the previous handler task of the same user. Different users are
//! handled concurrently. The controller itself is synchronous (SQLite), so it
//! runs on the blocking pool.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::conversation::{Controller, Incoming};
use crate::domain::UserId;
use crate::notifier::Notifier;
use crate::telegram::types::{Message, Update};
use crate::telegram::TelegramClient;

/// Pause after a failed `getUpdates` before polling again.
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// One update, resolved to who sent it and where the answer goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
  pub user: UserId,
  pub chat_id: i64,
  pub incoming: Incoming,
}

/// Split `/cmd@bot rest` into `("cmd", "rest")`.
fn parse_command(text: &str) -> Option<(&str, &str)> {
  let rest = text.strip_prefix('/')?;
  let (head, arg) = match rest.split_once(char::is_whitespace) {
    Some((head, arg)) => (head, arg.trim()),
    None => (rest, ""),
  };
  let name = head.split('@').next().unwrap_or(head);
  if name.is_empty() {
    return None;
  }
  Some((name, arg))
}

fn from_message(msg: &Message) -> Option<Routed> {
  let from = msg.from.as_ref()?;
  if from.is_bot {
    return None;
  }
  let incoming = if let Some(file_id) = msg.largest_photo() {
    Incoming::Photo { file_id: file_id.to_string() }
  } else {
    let text = msg.text.as_deref()?;
    match parse_command(text) {
      Some(("start", payload)) => Incoming::Start { payload: payload.to_string() },
      Some((name, _)) => Incoming::Command(name.to_lowercase()),
      None => Incoming::Text(text.to_string()),
    }
  };
  Some(Routed { user: from.id, chat_id: msg.chat.id, incoming })
}

/// Map an update onto a controller event. Updates the bot does not handle
/// (stickers, edits, messages from bots) map to `None`.
pub fn route(update: &Update) -> Option<Routed> {
  if let Some(q) = &update.callback_query {
    let message = q.message.as_ref();
    return Some(Routed {
      user: q.from.id,
      chat_id: message.map(|m| m.chat.id).unwrap_or(q.from.id),
      incoming: Incoming::Callback {
        id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message_id: message.map(|m| m.message_id),
      },
    });
  }
  from_message(update.message.as_ref()?)
}

/// Everything a handler task needs; cheap to clone.
#[derive(Clone)]
struct Worker {
  controller: Controller,
  notifier: Notifier,
  bot: TelegramClient,
}

impl Worker {
  async fn process(self, routed: Routed) {
    let Routed { user, chat_id, incoming } = routed;
    let kind = incoming.kind();
    let controller = self.controller.clone();
    let notifier = self.notifier.clone();

    let handled = tokio::task::spawn_blocking(move || {
      let reply = controller.handle(user, incoming);
      notifier.notify_all(&reply.notices);
      reply
    })
    .await;

    let reply = match handled {
      Ok(reply) => reply,
      Err(e) => {
        error!(target: "challenge_bot", user, kind, error = %e, "Handler panicked");
        return;
      }
    };

    for out in &reply.outbound {
      if let Err(e) = self.bot.deliver(chat_id, out).await {
        warn!(target: "challenge_bot", user, chat_id, error = %e, "Delivery failed");
      }
    }
    debug!(target: "challenge_bot", user, kind, sent = reply.outbound.len(), "Update handled");
  }
}

pub struct Dispatcher {
  worker: Worker,
  /// Last handler task per user.
  tails: HashMap<UserId, JoinHandle<()>>,
}

impl Dispatcher {
  pub fn new(controller: Controller, notifier: Notifier, bot: TelegramClient) -> Self {
    Self { worker: Worker { controller, notifier, bot }, tails: HashMap::new() }
  }

  fn spawn(&mut self, routed: Routed) {
    let previous = self.tails.remove(&routed.user);
    let user = routed.user;
    let worker = self.worker.clone();
    let handle = tokio::spawn(async move {
      if let Some(previous) = previous {
        // a failed predecessor was already logged
        let _ = previous.await;
      }
      worker.process(routed).await;
    });
    self.tails.insert(user, handle);
  }

  /// Poll until `shutdown` flips (or its sender goes away), then wait for
  /// in-flight handlers.
  pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
    info!(target: "challenge_bot", "Polling for updates");
    let mut offset = 0i64;

    loop {
      let polled = tokio::select! {
        _ = shutdown.changed() => break,
        polled = self.worker.bot.get_updates(offset) => polled,
      };

      match polled {
        Ok(updates) => {
          for update in updates {
            offset = offset.max(update.update_id + 1);
            match route(&update) {
              Some(routed) => self.spawn(routed),
              None => debug!(target: "challenge_bot", update_id = update.update_id, "Ignoring update"),
            }
          }
        }
        Err(e) => {
          warn!(target: "challenge_bot", error = %e, "getUpdates failed; retrying");
          tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(RETRY_DELAY) => {}
          }
        }
      }

      self.tails.retain(|_, handle| !handle.is_finished());
    }

    let pending = self.tails.len();
    info!(target: "challenge_bot", pending, "Stopping; waiting for in-flight handlers");
    for (user, handle) in self.tails.drain() {
      if let Err(e) = handle.await {
        error!(target: "challenge_bot", user, error = %e, "Handler task failed");
      }
    }
    info!(target: "challenge_bot", "Dispatcher stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn update(value: serde_json::Value) -> Update {
    serde_json::from_value(value).unwrap()
  }

  fn text_update(text: &str) -> Update {
    update(json!({
      "update_id": 7,
      "message": {
        "message_id": 1,
        "from": { "id": 42, "is_bot": false, "first_name": "Ann" },
        "chat": { "id": 42 },
        "text": text
      }
    }))
  }

  fn incoming(u: &Update) -> Incoming {
    route(u).unwrap().incoming
  }

  #[test]
  fn start_with_and_without_payload() {
    assert_eq!(incoming(&text_update("/start")), Incoming::Start { payload: String::new() });
    assert_eq!(
      incoming(&text_update("/start AB12CD34")),
      Incoming::Start { payload: "AB12CD34".into() }
    );
    assert_eq!(
      incoming(&text_update("/start@ChallengeBot AB12CD34")),
      Incoming::Start { payload: "AB12CD34".into() }
    );
  }

  #[test]
  fn other_commands_keep_their_name() {
    assert_eq!(incoming(&text_update("/help")), Incoming::Command("help".into()));
    assert_eq!(incoming(&text_update("/Cancel@ChallengeBot")), Incoming::Command("cancel".into()));
  }

  #[test]
  fn plain_text_passes_through() {
    let routed = route(&text_update("Morning run")).unwrap();
    assert_eq!(routed.user, 42);
    assert_eq!(routed.chat_id, 42);
    assert_eq!(routed.incoming, Incoming::Text("Morning run".into()));
    assert_eq!(incoming(&text_update("/")), Incoming::Text("/".into()));
  }

  #[test]
  fn photo_uses_the_largest_size() {
    let u = update(json!({
      "update_id": 8,
      "message": {
        "message_id": 2,
        "from": { "id": 42, "first_name": "Ann" },
        "chat": { "id": 42 },
        "caption": "proof",
        "photo": [
          { "file_id": "small", "width": 90, "height": 90 },
          { "file_id": "big", "width": 1280, "height": 960 },
          { "file_id": "mid", "width": 320, "height": 240 }
        ]
      }
    }));
    assert_eq!(incoming(&u), Incoming::Photo { file_id: "big".into() });
  }

  #[test]
  fn callback_carries_data_and_message() {
    let u = update(json!({
      "update_id": 9,
      "callback_query": {
        "id": "cb-1",
        "from": { "id": 42, "first_name": "Ann" },
        "message": { "message_id": 55, "chat": { "id": 42 } },
        "data": "\u{c}complete_task|3"
      }
    }));
    assert_eq!(
      incoming(&u),
      Incoming::Callback { id: "cb-1".into(), data: "\u{c}complete_task|3".into(), message_id: Some(55) }
    );
  }

  #[test]
  fn unsupported_updates_are_ignored() {
    let sticker = update(json!({
      "update_id": 10,
      "message": { "message_id": 3, "from": { "id": 42 }, "chat": { "id": 42 } }
    }));
    assert!(route(&sticker).is_none());

    let from_bot = update(json!({
      "update_id": 11,
      "message": {
        "message_id": 4,
        "from": { "id": 99, "is_bot": true },
        "chat": { "id": 42 },
        "text": "hi"
      }
    }));
    assert!(route(&from_bot).is_none());
    assert!(route(&update(json!({ "update_id": 12 }))).is_none());
  }
}
