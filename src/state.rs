//! Application state: the repository, domain services, the conversation
//! controller, the notifier and the Bot API client, wired once at startup.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::config::{load_template_bank, Config};
use crate::conversation::Controller;
use crate::dispatcher::Dispatcher;
use crate::notifier::{Delivery, Notifier, DEFAULT_QUEUE_CAPACITY};
use crate::services::Services;
use crate::storage::Database;
use crate::telegram::TelegramClient;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub services: Services,
    pub controller: Controller,
    pub notifier: Notifier,
    pub bot: TelegramClient,
}

impl AppState {
    /// Open the database, run the startup seeding, and resolve the bot's username.
    /// Returns the state plus the notification queue the worker drains.
    #[instrument(level = "info", skip_all)]
    pub async fn new(
        config: &Config,
    ) -> Result<(Self, mpsc::Receiver<Delivery>), Box<dyn std::error::Error>> {
        let db = Arc::new(Database::open(&config.database_path)?);
        let services = Services::new(db.clone());

        if let Some(id) = config.super_admin_id {
            services.super_admins.seed(id)?;
        }
        if let Some(bank) = config.templates_path.as_deref().and_then(load_template_bank) {
            let added = services.templates.import_bank(&bank.templates)?;
            info!(target: "challenge_bot", added, "Template bank applied");
        }

        let bot = TelegramClient::new(&config.api_url, &config.token)?;
        // deep links need the username; the bot still works without it
        let bot_username = match bot.get_me().await {
            Ok(me) => me.username,
            Err(e) => {
                warn!(target: "challenge_bot", error = %e, "getMe failed; share links disabled");
                None
            }
        };
        if let Some(name) = &bot_username {
            info!(target: "challenge_bot", username = %name, "Bot identity resolved");
        }

        let (notifier, rx) = Notifier::new(db.clone(), DEFAULT_QUEUE_CAPACITY);
        let controller = Controller::new(services.clone(), bot_username);

        Ok((Self { db, services, controller, notifier, bot }, rx))
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.controller.clone(), self.notifier.clone(), self.bot.clone())
    }
}
