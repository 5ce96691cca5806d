//! The per-user conversation state machine and everything it renders.

pub mod callback;
pub mod controller;
pub mod keyboard;
pub mod scratch;
pub mod state;
pub mod views;

mod admin;
mod create;
mod join;
mod settings;
mod super_admin;
mod tasks;

pub use controller::{Controller, Incoming, Outbound, Reply};
pub use state::ConversationState;
