//! Error types for storage, input validation and domain services.

use thiserror::Error;

/// Repository errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
  #[error("Failed to connect to database: {0}")]
  ConnectionFailed(String),

  #[error("IO error: {0}")]
  IoError(String),

  #[error("Migration failed: {0}")]
  MigrationFailed(String),

  #[error("Query failed: {0}")]
  QueryFailed(String),

  #[error("Transaction failed: {0}")]
  TransactionFailed(String),

  #[error("Constraint violation: {0}")]
  ConstraintViolation(String),

  #[error("Serialization error: {0}")]
  SerializationError(String),

  #[error("Deserialization error: {0}")]
  DeserializationError(String),
}

impl From<rusqlite::Error> for DatabaseError {
  fn from(e: rusqlite::Error) -> Self {
    match &e {
      rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
        DatabaseError::ConstraintViolation(e.to_string())
      }
      _ => DatabaseError::QueryFailed(e.to_string()),
    }
  }
}

/// Rejected user input. The message is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("{field} cannot be empty")]
  Empty { field: &'static str },

  #[error("{field} is too long (max {max} characters)")]
  TooLong { field: &'static str, max: usize },

  #[error("Challenge ID must be 8 characters (A-Z, 0-9)")]
  BadChallengeId,

  #[error("Please send a single emoji")]
  NotAnEmoji,

  #[error("Please send a number from 0 to {max}")]
  OutOfRange { max: u32 },

  #[error("Please send the time as HH:MM, e.g. 14:30")]
  BadTime,

  #[error("Position must be between 1 and {max}")]
  BadPosition { max: usize },

  #[error("Please send a numeric Telegram user ID")]
  BadUserId,
}

/// Error categories the controller maps to replies and state handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  ValidationFailed,
  QuotaExceeded,
  Conflict,
  Authorization,
  Transient,
}

/// Domain service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("challenge not found")]
  ChallengeNotFound,
  #[error("task not found")]
  TaskNotFound,
  #[error("participant not found")]
  ParticipantNotFound,
  #[error("template not found")]
  TemplateNotFound,
  #[error("user is not a super admin")]
  SuperAdminNotFound,

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("maximum number of challenges reached")]
  MaxChallengesReached,
  #[error("maximum number of tasks reached")]
  MaxTasksReached,
  #[error("challenge is full")]
  ChallengeFull,

  #[error("already a member of this challenge")]
  AlreadyMember,
  #[error("emoji already taken")]
  EmojiTaken,
  #[error("user is already a super admin")]
  AlreadySuperAdmin,
  #[error("template name already exists")]
  TemplateNameExists,

  #[error("not a challenge admin")]
  NotAdmin,
  #[error("not a super admin")]
  NotSuperAdmin,
  #[error("cannot remove yourself")]
  CannotRemoveSelf,

  #[error("could not generate a unique challenge id after {0} attempts")]
  IdGenerationExhausted(usize),

  #[error(transparent)]
  Database(#[from] DatabaseError),
}

impl ServiceError {
  pub fn kind(&self) -> ErrorKind {
    use ServiceError::*;
    match self {
      ChallengeNotFound | TaskNotFound | ParticipantNotFound | TemplateNotFound | SuperAdminNotFound => ErrorKind::NotFound,
      Validation(_) => ErrorKind::ValidationFailed,
      MaxChallengesReached | MaxTasksReached | ChallengeFull => ErrorKind::QuotaExceeded,
      AlreadyMember | EmojiTaken | AlreadySuperAdmin | TemplateNameExists => ErrorKind::Conflict,
      NotAdmin | NotSuperAdmin | CannotRemoveSelf => ErrorKind::Authorization,
      IdGenerationExhausted(_) | Database(_) => ErrorKind::Transient,
    }
  }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Startup configuration problems. These end the process.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("TELEGRAM_BOT_TOKEN is required")]
  MissingToken,

  #[error("invalid value for {key}: {value:?}")]
  Invalid { key: &'static str, value: String },
}

/// Bot API transport errors.
#[derive(Debug, Error)]
pub enum TelegramError {
  #[error("HTTP error: {0}")]
  Http(String),

  #[error("Telegram API error {code}: {description}")]
  Api { code: i64, description: String },

  #[error("Malformed response: {0}")]
  Decode(String),
}

impl From<reqwest::Error> for TelegramError {
  fn from(e: reqwest::Error) -> Self {
    // the request URL embeds the bot token
    TelegramError::Http(e.without_url().to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kinds_follow_taxonomy() {
    assert_eq!(ServiceError::TaskNotFound.kind(), ErrorKind::NotFound);
    assert_eq!(ServiceError::from(ValidationError::BadTime).kind(), ErrorKind::ValidationFailed);
    assert_eq!(ServiceError::ChallengeFull.kind(), ErrorKind::QuotaExceeded);
    assert_eq!(ServiceError::EmojiTaken.kind(), ErrorKind::Conflict);
    assert_eq!(ServiceError::CannotRemoveSelf.kind(), ErrorKind::Authorization);
    assert_eq!(
      ServiceError::from(DatabaseError::QueryFailed("boom".into())).kind(),
      ErrorKind::Transient
    );
  }

  #[test]
  fn validation_messages_are_user_readable() {
    let e = ValidationError::TooLong { field: "Name", max: 50 };
    assert_eq!(e.to_string(), "Name is too long (max 50 characters)");
  }
}
