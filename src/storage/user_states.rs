//! Per-user conversation state store.
//!
//! Rows hold the raw state tag, the serialized scratch blob and the user's
//! current challenge. A missing row reads as `("idle", "", "")`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::domain::UserId;
use crate::error::DatabaseError;
use crate::storage::database::{ts, Database};

pub const IDLE_TAG: &str = "idle";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUserState {
    pub telegram_id: UserId,
    pub state: String,
    pub temp_data: String,
    pub current_challenge: String,
}

impl StoredUserState {
    pub fn idle(telegram_id: UserId) -> Self {
        Self { telegram_id, state: IDLE_TAG.into(), temp_data: String::new(), current_challenge: String::new() }
    }
}

impl Database {
    pub fn get_user_state(&self, user: UserId) -> Result<StoredUserState, DatabaseError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT state, COALESCE(temp_data, ''), COALESCE(current_challenge, '')
                     FROM user_states WHERE telegram_id = ?1",
                    params![user],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)),
                )
                .optional()?;
            Ok(match row {
                Some((state, temp_data, current_challenge)) => {
                    StoredUserState { telegram_id: user, state, temp_data, current_challenge }
                }
                None => StoredUserState::idle(user),
            })
        })
    }

    /// Atomic per-user upsert.
    pub fn upsert_user_state(&self, s: &StoredUserState, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        let temp = (!s.temp_data.is_empty()).then_some(s.temp_data.as_str());
        let current = (!s.current_challenge.is_empty()).then_some(s.current_challenge.as_str());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_states (telegram_id, state, temp_data, current_challenge, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(telegram_id) DO UPDATE SET
                    state = excluded.state,
                    temp_data = excluded.temp_data,
                    current_challenge = excluded.current_challenge,
                    updated_at = excluded.updated_at",
                params![s.telegram_id, s.state, temp, current, ts(now)],
            )?;
            Ok(())
        })
    }

    /// Back to idle with no scratch and no current challenge.
    pub fn reset_user_state(&self, user: UserId, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.upsert_user_state(&StoredUserState::idle(user), now)
    }

    /// Back to idle with no scratch, keeping the current challenge.
    pub fn reset_user_state_keep_challenge(&self, user: UserId, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        let current = self.get_user_state(user)?.current_challenge;
        self.upsert_user_state(&StoredUserState { current_challenge: current, ..StoredUserState::idle(user) }, now)
    }

    /// Reset every user whose current challenge is `challenge_id`. Returns affected user count.
    pub fn reset_user_states_by_challenge(&self, challenge_id: &str, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE user_states SET state = ?2, temp_data = NULL, current_challenge = NULL, updated_at = ?3
                 WHERE current_challenge = ?1",
                params![challenge_id, IDLE_TAG, ts(now)],
            )?)
        })
    }
}
