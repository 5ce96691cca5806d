//! SQLite persistence: schema, connection and per-aggregate operations.

pub mod challenges;
pub mod completions;
pub mod database;
pub mod participants;
pub mod schema;
pub mod super_admins;
pub mod tasks;
pub mod templates;
pub mod user_states;

pub use database::{stored_precision, Database};
pub use participants::NewParticipant;
pub use user_states::StoredUserState;
