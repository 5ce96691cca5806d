//! Telegram transport: Bot API DTOs and the HTTP client.

pub mod client;
pub mod types;

pub use client::TelegramClient;
