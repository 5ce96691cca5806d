//! Participant rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Participant, UserId};
use crate::error::DatabaseError;
use crate::storage::database::{col_bool, col_ts, stored_precision, ts, Database};

const PARTICIPANT_COLUMNS: &str =
    "id, challenge_id, telegram_id, display_name, emoji, notifications_enabled, time_offset_minutes, joined_at";

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        challenge_id: row.get(1)?,
        telegram_id: row.get(2)?,
        display_name: row.get(3)?,
        emoji: row.get(4)?,
        notifications_enabled: col_bool(row, 5)?,
        time_offset_minutes: row.get(6)?,
        joined_at: col_ts(row, 7)?,
    })
}

/// Fields needed to create a participant.
#[derive(Debug, Clone)]
pub struct NewParticipant<'a> {
    pub challenge_id: &'a str,
    pub telegram_id: UserId,
    pub display_name: &'a str,
    pub emoji: &'a str,
    pub time_offset_minutes: i32,
}

impl Database {
    pub fn insert_participant(&self, p: &NewParticipant<'_>, now: DateTime<Utc>) -> Result<Participant, DatabaseError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO participants (challenge_id, telegram_id, display_name, emoji,
                 notifications_enabled, time_offset_minutes, joined_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
                params![p.challenge_id, p.telegram_id, p.display_name, p.emoji, p.time_offset_minutes, ts(now)],
            )?;
            Ok(Participant {
                id: conn.last_insert_rowid(),
                challenge_id: p.challenge_id.to_string(),
                telegram_id: p.telegram_id,
                display_name: p.display_name.to_string(),
                emoji: p.emoji.to_string(),
                notifications_enabled: true,
                time_offset_minutes: p.time_offset_minutes,
                joined_at: stored_precision(now),
            })
        })
    }

    pub fn get_participant(&self, challenge_id: &str, user: UserId) -> Result<Option<Participant>, DatabaseError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE challenge_id = ?1 AND telegram_id = ?2");
            Ok(conn.query_row(&sql, params![challenge_id, user], participant_from_row).optional()?)
        })
    }

    pub fn get_participant_by_id(&self, id: i64) -> Result<Option<Participant>, DatabaseError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], participant_from_row).optional()?)
        })
    }

    /// Participants in join order.
    pub fn participants_for_challenge(&self, challenge_id: &str) -> Result<Vec<Participant>, DatabaseError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE challenge_id = ?1 ORDER BY joined_at, id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![challenge_id], participant_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn count_participants(&self, challenge_id: &str) -> Result<usize, DatabaseError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM participants WHERE challenge_id = ?1",
                params![challenge_id],
                |r| r.get(0),
            )?;
            Ok(n as usize)
        })
    }

    pub fn used_emojis(&self, challenge_id: &str) -> Result<Vec<String>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT emoji FROM participants WHERE challenge_id = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![challenge_id], |r| r.get(0))?;
            Ok(rows.collect::<Result<Vec<String>, _>>()?)
        })
    }

    pub fn update_participant_name(&self, id: i64, name: &str) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE participants SET display_name = ?2 WHERE id = ?1", params![id, name])? > 0)
        })
    }

    pub fn update_participant_emoji(&self, id: i64, emoji: &str) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| Ok(conn.execute("UPDATE participants SET emoji = ?2 WHERE id = ?1", params![id, emoji])? > 0))
    }

    pub fn update_participant_offset(&self, id: i64, offset_minutes: i32) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE participants SET time_offset_minutes = ?2 WHERE id = ?1",
                params![id, offset_minutes],
            )? > 0)
        })
    }

    pub fn set_participant_notifications(&self, id: i64, enabled: bool) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE participants SET notifications_enabled = ?2 WHERE id = ?1",
                params![id, enabled as i64],
            )? > 0)
        })
    }

    /// Remove a participant; their completions cascade.
    pub fn delete_participant(&self, id: i64) -> Result<bool, DatabaseError> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM participants WHERE id = ?1", params![id])? > 0))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::challenges::tests::sample_challenge;

    pub(crate) fn join(db: &Database, cid: &str, user: UserId, name: &str, emoji: &str) -> Participant {
        db.insert_participant(
            &NewParticipant { challenge_id: cid, telegram_id: user, display_name: name, emoji, time_offset_minutes: 0 },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        db.insert_challenge(&sample_challenge("CHAL0001", 1)).unwrap();
        let p = join(&db, "CHAL0001", 1, "John", "💪");

        assert_eq!(db.get_participant("CHAL0001", 1).unwrap(), Some(p.clone()));
        assert_eq!(db.get_participant_by_id(p.id).unwrap(), Some(p));
        assert_eq!(db.count_participants("CHAL0001").unwrap(), 1);
        assert_eq!(db.used_emojis("CHAL0001").unwrap(), vec!["💪".to_string()]);
    }

    #[test]
    fn test_unique_constraints() {
        let db = Database::open_in_memory().unwrap();
        db.insert_challenge(&sample_challenge("CHAL0001", 1)).unwrap();
        join(&db, "CHAL0001", 1, "John", "💪");

        let same_user = NewParticipant { challenge_id: "CHAL0001", telegram_id: 1, display_name: "J", emoji: "🔥", time_offset_minutes: 0 };
        assert!(matches!(db.insert_participant(&same_user, Utc::now()), Err(DatabaseError::ConstraintViolation(_))));

        let same_emoji = NewParticipant { challenge_id: "CHAL0001", telegram_id: 2, display_name: "S", emoji: "💪", time_offset_minutes: 0 };
        assert!(matches!(db.insert_participant(&same_emoji, Utc::now()), Err(DatabaseError::ConstraintViolation(_))));
    }

    #[test]
    fn test_settings_updates() {
        let db = Database::open_in_memory().unwrap();
        db.insert_challenge(&sample_challenge("CHAL0001", 1)).unwrap();
        let p = join(&db, "CHAL0001", 1, "John", "💪");

        db.update_participant_name(p.id, "Johnny").unwrap();
        db.update_participant_emoji(p.id, "🔥").unwrap();
        db.update_participant_offset(p.id, -180).unwrap();
        db.set_participant_notifications(p.id, false).unwrap();

        let got = db.get_participant_by_id(p.id).unwrap().unwrap();
        assert_eq!(got.display_name, "Johnny");
        assert_eq!(got.emoji, "🔥");
        assert_eq!(got.time_offset_minutes, -180);
        assert!(!got.notifications_enabled);

        assert!(db.delete_participant(p.id).unwrap());
        assert_eq!(db.get_participant("CHAL0001", 1).unwrap(), None);
    }
}
