//! Domain services. Each one is a thin, cloneable handle over the shared database.

pub mod challenge;
pub mod completion;
pub mod ordering;
pub mod participant;
pub mod super_admin;
pub mod task;
pub mod template;

use std::sync::Arc;

use crate::storage::Database;

pub use challenge::{ChallengeService, NewChallenge};
pub use completion::{CompletionService, DailyLimitStatus, ParticipantProgress};
pub use participant::ParticipantService;
pub use super_admin::SuperAdminService;
pub use task::TaskService;
pub use template::TemplateService;

#[derive(Clone)]
pub struct Services {
  pub db: Arc<Database>,
  pub challenges: ChallengeService,
  pub tasks: TaskService,
  pub participants: ParticipantService,
  pub completions: CompletionService,
  pub super_admins: SuperAdminService,
  pub templates: TemplateService,
}

impl Services {
  pub fn new(db: Arc<Database>) -> Self {
    Self {
      challenges: ChallengeService::new(db.clone()),
      tasks: TaskService::new(db.clone()),
      participants: ParticipantService::new(db.clone()),
      completions: CompletionService::new(db.clone()),
      super_admins: SuperAdminService::new(db.clone()),
      templates: TemplateService::new(db.clone()),
      db,
    }
  }
}
