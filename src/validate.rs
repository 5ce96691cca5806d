//! Input validators shared by the conversation flows and the services.
//!
//! Every validator trims its input and returns the cleaned value or a
//! `ValidationError` whose text can be shown to the user directly.

use chrono::{DateTime, Timelike, Utc};

use crate::emoji::is_single_emoji;
use crate::error::ValidationError;
use crate::ids::{is_valid_challenge_id, normalize_challenge_id};

pub const CHALLENGE_NAME_MAX: usize = 50;
pub const CHALLENGE_DESCRIPTION_MAX: usize = 500;
pub const DISPLAY_NAME_MAX: usize = 30;
pub const TASK_TITLE_MAX: usize = 100;
pub const TASK_DESCRIPTION_MAX: usize = 800;
/// Absolute ceiling for stored task descriptions (template imports included).
pub const TASK_DESCRIPTION_HARD_CAP: usize = 1200;
pub const DAILY_LIMIT_MAX: u32 = 50;

fn bounded(field: &'static str, s: &str, min: usize, max: usize) -> Result<String, ValidationError> {
  let t = s.trim();
  let n = t.chars().count();
  if n < min {
    return Err(ValidationError::Empty { field });
  }
  if n > max {
    return Err(ValidationError::TooLong { field, max });
  }
  Ok(t.to_string())
}

pub fn challenge_name(s: &str) -> Result<String, ValidationError> {
  bounded("Challenge name", s, 1, CHALLENGE_NAME_MAX)
}

pub fn challenge_description(s: &str) -> Result<String, ValidationError> {
  bounded("Description", s, 0, CHALLENGE_DESCRIPTION_MAX)
}

pub fn display_name(s: &str) -> Result<String, ValidationError> {
  bounded("Name", s, 1, DISPLAY_NAME_MAX)
}

pub fn task_title(s: &str) -> Result<String, ValidationError> {
  bounded("Task title", s, 1, TASK_TITLE_MAX)
}

pub fn task_description(s: &str) -> Result<String, ValidationError> {
  bounded("Task description", s, 0, TASK_DESCRIPTION_MAX)
}

pub fn challenge_id(s: &str) -> Result<String, ValidationError> {
  let id = normalize_challenge_id(s);
  if is_valid_challenge_id(&id) { Ok(id) } else { Err(ValidationError::BadChallengeId) }
}

pub fn emoji(s: &str) -> Result<String, ValidationError> {
  if is_single_emoji(s) { Ok(s.trim().to_string()) } else { Err(ValidationError::NotAnEmoji) }
}

pub fn daily_limit(s: &str) -> Result<u32, ValidationError> {
  match s.trim().parse::<u32>() {
    Ok(n) if n <= DAILY_LIMIT_MAX => Ok(n),
    _ => Err(ValidationError::OutOfRange { max: DAILY_LIMIT_MAX }),
  }
}

/// Parse a 24-hour `HH:MM` clock reading.
pub fn clock_time(s: &str) -> Result<(u32, u32), ValidationError> {
  let (h, m) = s.trim().split_once(':').ok_or(ValidationError::BadTime)?;
  if h.is_empty() || h.len() > 2 || m.len() != 2 {
    return Err(ValidationError::BadTime);
  }
  let h: u32 = h.parse().map_err(|_| ValidationError::BadTime)?;
  let m: u32 = m.parse().map_err(|_| ValidationError::BadTime)?;
  if h > 23 || m > 59 {
    return Err(ValidationError::BadTime);
  }
  Ok((h, m))
}

/// Offset from UTC implied by "my clock currently reads `hour:minute`".
/// The result is folded into the real-world range UTC-12:00..=UTC+14:00.
pub fn offset_from_clock(hour: u32, minute: u32, now: DateTime<Utc>) -> i32 {
  let user = (hour * 60 + minute) as i32;
  let server = (now.hour() * 60 + now.minute()) as i32;
  let mut diff = user - server;
  if diff > 14 * 60 {
    diff -= 24 * 60;
  }
  if diff < -12 * 60 {
    diff += 24 * 60;
  }
  diff
}

/// Convenience: validate `HH:MM` and turn it into an offset relative to `now`.
pub fn sync_time_offset(s: &str, now: DateTime<Utc>) -> Result<i32, ValidationError> {
  let (h, m) = clock_time(s)?;
  Ok(offset_from_clock(h, m, now))
}
