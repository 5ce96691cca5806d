//! Telegram bot for small group challenges: members work through an ordered
//! task list, see each other's progress and get notified as others advance.

pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod domain;
pub mod emoji;
pub mod error;
pub mod ids;
pub mod notifier;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
pub mod telegram;
pub mod telemetry;
pub mod util;
pub mod validate;
