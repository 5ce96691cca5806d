//! Minimal Telegram Bot API client.
//!
//! Only the handful of methods the bot needs. Calls are instrumented with the
//! method name and chat id; message bodies are logged as lengths only and the
//! token never leaves this module.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};

use crate::conversation::keyboard::Keyboard;
use crate::conversation::Outbound;
use crate::error::TelegramError;
use crate::telegram::types::*;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Server-side long-poll timeout for `getUpdates`, in seconds.
pub const POLL_TIMEOUT_SECS: u64 = 10;

const ALLOWED_UPDATES: &[&str] = &["message", "callback_query"];

#[derive(Clone)]
pub struct TelegramClient {
  client: reqwest::Client,
  /// `{api_url}/bot{token}`
  endpoint: String,
}

impl TelegramClient {
  pub fn new(api_url: &str, token: &str) -> Result<Self, TelegramError> {
    let client = reqwest::Client::builder()
      // must outlive the long poll
      .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 20))
      .build()?;
    let endpoint = format!("{}/bot{}", api_url.trim_end_matches('/'), token);
    Ok(Self { client, endpoint })
  }

  async fn call<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: &P) -> Result<R, TelegramError> {
    let url = format!("{}/{}", self.endpoint, method);
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "challenge-bot/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(params)
      .send()
      .await?;

    let status = res.status();
    let body: ApiResponse<R> = res
      .json()
      .await
      .map_err(|e| TelegramError::Decode(format!("{method} (HTTP {status}): {}", e.without_url())))?;

    if !body.ok {
      return Err(TelegramError::Api {
        code: body.error_code.unwrap_or(status.as_u16() as i64),
        description: body.description.unwrap_or_default(),
      });
    }
    body.result.ok_or_else(|| TelegramError::Decode(format!("{method}: missing result")))
  }

  #[instrument(level = "info", skip(self))]
  pub async fn get_me(&self) -> Result<User, TelegramError> {
    self.call("getMe", &Empty {}).await
  }

  #[instrument(level = "debug", skip(self))]
  pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
    let params = GetUpdates { offset, timeout: POLL_TIMEOUT_SECS, allowed_updates: ALLOWED_UPDATES };
    self.call("getUpdates", &params).await
  }

  #[instrument(level = "debug", skip(self, text, keyboard), fields(text_len = text.len()))]
  pub async fn send_message(&self, chat_id: i64, text: &str, keyboard: Option<&Keyboard>) -> Result<Message, TelegramError> {
    let params = SendMessage { chat_id, text, parse_mode: PARSE_MODE_HTML, reply_markup: keyboard.map(Into::into) };
    self.call("sendMessage", &params).await
  }

  #[instrument(level = "debug", skip(self, file_id, caption, keyboard), fields(caption_len = caption.len()))]
  pub async fn send_photo(
    &self,
    chat_id: i64,
    file_id: &str,
    caption: &str,
    keyboard: Option<&Keyboard>,
  ) -> Result<Message, TelegramError> {
    let params = SendPhoto {
      chat_id,
      photo: file_id,
      caption,
      parse_mode: PARSE_MODE_HTML,
      reply_markup: keyboard.map(Into::into),
    };
    self.call("sendPhoto", &params).await
  }

  #[instrument(level = "debug", skip(self, text, keyboard), fields(text_len = text.len()))]
  pub async fn edit_message_text(
    &self,
    chat_id: i64,
    message_id: i64,
    text: &str,
    keyboard: Option<&Keyboard>,
  ) -> Result<serde_json::Value, TelegramError> {
    let params = EditMessageText {
      chat_id,
      message_id,
      text,
      parse_mode: PARSE_MODE_HTML,
      reply_markup: keyboard.map(Into::into),
    };
    // result is a Message, or `true` for inline messages
    self.call("editMessageText", &params).await
  }

  #[instrument(level = "debug", skip(self, text))]
  pub async fn answer_callback(&self, callback_query_id: &str, text: Option<&str>) -> Result<bool, TelegramError> {
    self.call("answerCallbackQuery", &AnswerCallbackQuery { callback_query_id, text }).await
  }

  /// Send one controller output. A failed edit falls back to a fresh message
  /// (photo messages cannot be edited into text).
  pub async fn deliver(&self, chat_id: i64, out: &Outbound) -> Result<(), TelegramError> {
    match out {
      Outbound::Text { text, keyboard } => {
        self.send_message(chat_id, text, keyboard.as_ref()).await?;
      }
      Outbound::Photo { file_id, caption, keyboard } => {
        self.send_photo(chat_id, file_id, caption, keyboard.as_ref()).await?;
      }
      Outbound::Edit { message_id, text, keyboard } => {
        if let Err(e) = self.edit_message_text(chat_id, *message_id, text, keyboard.as_ref()).await {
          debug!(target: "challenge_bot", chat_id, message_id, error = %e, "Edit failed; sending a new message");
          self.send_message(chat_id, text, keyboard.as_ref()).await?;
        }
      }
      Outbound::AnswerCallback { id, text } => {
        if let Err(e) = self.answer_callback(id, text.as_deref()).await {
          // expired queries are harmless
          warn!(target: "challenge_bot", chat_id, error = %e, "answerCallbackQuery failed");
        }
      }
    }
    Ok(())
  }
}
