//! Process configuration from environment variables, plus the optional TOML
//! template bank.
//!
//! Variables:
//!   TELEGRAM_BOT_TOKEN : required
//!   TELEGRAM_API_URL   : default "https://api.telegram.org"
//!   DATABASE_PATH      : default "./data/bot.db"
//!   LOG_LEVEL          : tracing filter (read by `telemetry`)
//!   HEALTH_PORT        : u16; enables `/health` and `/ready`
//!   SUPER_ADMIN_ID     : Telegram user id seeded as super admin
//!   TEMPLATES_PATH     : TOML template bank imported at startup

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{TemplateDraft, UserId};
use crate::error::ConfigError;
use crate::telegram::client::DEFAULT_API_URL;

pub const DEFAULT_DATABASE_PATH: &str = "./data/bot.db";

#[derive(Clone)]
pub struct Config {
  pub token: String,
  pub api_url: String,
  pub database_path: PathBuf,
  pub health_port: Option<u16>,
  pub super_admin_id: Option<UserId>,
  pub templates_path: Option<PathBuf>,
}

// keeps the token out of logs
impl std::fmt::Debug for Config {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Config")
      .field("api_url", &self.api_url)
      .field("database_path", &self.database_path)
      .field("health_port", &self.health_port)
      .field("super_admin_id", &self.super_admin_id)
      .field("templates_path", &self.templates_path)
      .finish_non_exhaustive()
  }
}

impl Config {
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Build from any key lookup. Blank values count as unset.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let token = get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::MissingToken)?;
    let health_port = match get("HEALTH_PORT") {
      Some(v) => Some(v.parse::<u16>().map_err(|_| ConfigError::Invalid { key: "HEALTH_PORT", value: v })?),
      None => None,
    };
    let super_admin_id = match get("SUPER_ADMIN_ID") {
      Some(v) => match v.parse::<UserId>() {
        Ok(id) if id > 0 => Some(id),
        _ => return Err(ConfigError::Invalid { key: "SUPER_ADMIN_ID", value: v }),
      },
      None => None,
    };

    Ok(Self {
      token,
      api_url: get("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
      database_path: PathBuf::from(get("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())),
      health_port,
      super_admin_id,
      templates_path: get("TEMPLATES_PATH").map(PathBuf::from),
    })
  }
}

/// Schema of the template bank file:
///
/// ```toml
/// [[templates]]
/// name = "30 days of push-ups"
/// daily_task_limit = 1
///
/// [[templates.tasks]]
/// title = "10 push-ups"
/// ```
#[derive(Clone, Debug, Deserialize, Default)]
pub struct TemplateBank {
  #[serde(default)]
  pub templates: Vec<TemplateDraft>,
}

pub fn parse_template_bank(text: &str) -> Result<TemplateBank, toml::de::Error> {
  toml::from_str(text)
}

/// Read the template bank. On any parsing/IO error, logs and returns None.
pub fn load_template_bank(path: &std::path::Path) -> Option<TemplateBank> {
  match std::fs::read_to_string(path) {
    Ok(s) => match parse_template_bank(&s) {
      Ok(bank) => {
        info!(target: "challenge_bot", path = %path.display(), templates = bank.templates.len(), "Loaded template bank (TOML)");
        Some(bank)
      }
      Err(e) => {
        error!(target: "challenge_bot", path = %path.display(), error = %e, "Failed to parse template bank");
        None
      }
    },
    Err(e) => {
      error!(target: "challenge_bot", path = %path.display(), error = %e, "Failed to read template bank");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::io::Write;

  fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Config::from_lookup(|k| env.get(k).cloned())
  }

  #[test]
  fn defaults_apply() {
    let c = config(&[("TELEGRAM_BOT_TOKEN", "123:abc")]).unwrap();
    assert_eq!(c.token, "123:abc");
    assert_eq!(c.api_url, DEFAULT_API_URL);
    assert_eq!(c.database_path, PathBuf::from("./data/bot.db"));
    assert_eq!(c.health_port, None);
    assert_eq!(c.super_admin_id, None);
    assert!(c.templates_path.is_none());
  }

  #[test]
  fn token_is_required() {
    assert!(matches!(config(&[]), Err(ConfigError::MissingToken)));
    assert!(matches!(config(&[("TELEGRAM_BOT_TOKEN", "  ")]), Err(ConfigError::MissingToken)));
  }

  #[test]
  fn optional_numbers_are_validated() {
    let c = config(&[("TELEGRAM_BOT_TOKEN", "t"), ("HEALTH_PORT", "8080"), ("SUPER_ADMIN_ID", "777")]).unwrap();
    assert_eq!(c.health_port, Some(8080));
    assert_eq!(c.super_admin_id, Some(777));

    let bad_port = config(&[("TELEGRAM_BOT_TOKEN", "t"), ("HEALTH_PORT", "http")]);
    assert!(matches!(bad_port, Err(ConfigError::Invalid { key: "HEALTH_PORT", .. })));
    let bad_admin = config(&[("TELEGRAM_BOT_TOKEN", "t"), ("SUPER_ADMIN_ID", "-4")]);
    assert!(matches!(bad_admin, Err(ConfigError::Invalid { key: "SUPER_ADMIN_ID", .. })));
  }

  #[test]
  fn debug_hides_token() {
    let c = config(&[("TELEGRAM_BOT_TOKEN", "123:secret")]).unwrap();
    assert!(!format!("{c:?}").contains("secret"));
  }

  const BANK: &str = r#"
[[templates]]
name = "Push-up month"
description = "Build up slowly"
daily_task_limit = 1

[[templates.tasks]]
title = "10 push-ups"

[[templates.tasks]]
title = "20 push-ups"
description = "Two sets"

[[templates]]
name = "Reading"
hide_future_tasks = true
"#;

  #[test]
  fn bank_parses_with_defaults() {
    let bank = parse_template_bank(BANK).unwrap();
    assert_eq!(bank.templates.len(), 2);
    let push = &bank.templates[0];
    assert_eq!(push.daily_task_limit, 1);
    assert_eq!(push.tasks.len(), 2);
    assert_eq!(push.tasks[1].description, "Two sets");
    let reading = &bank.templates[1];
    assert!(reading.hide_future_tasks);
    assert!(reading.tasks.is_empty());
    assert_eq!(reading.description, "");
  }

  #[test]
  fn bank_loading_is_forgiving() {
    let mut good = tempfile::NamedTempFile::new().unwrap();
    good.write_all(BANK.as_bytes()).unwrap();
    assert_eq!(load_template_bank(good.path()).unwrap().templates.len(), 2);

    let mut broken = tempfile::NamedTempFile::new().unwrap();
    broken.write_all(b"[[templates]]\nname = ").unwrap();
    assert!(load_template_bank(broken.path()).is_none());

    let dir = tempfile::tempdir().unwrap();
    assert!(load_template_bank(&dir.path().join("missing.toml")).is_none());
  }
}
