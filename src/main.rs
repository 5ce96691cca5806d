//! Challenge Bot · Telegram group-challenge backend
//!
//! - Telegram Bot API long polling
//! - SQLite persistence (./data/bot.db by default)
//! - Optional Axum health endpoint
//!
//! See `config` for the environment variables.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use challenge_bot::config::Config;
use challenge_bot::notifier::run_worker;
use challenge_bot::routes::build_router;
use challenge_bot::state::AppState;
use challenge_bot::telemetry;

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      error!(target: "challenge_bot", error = %e, "Cannot listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        error!(target: "challenge_bot", error = %e, "Cannot listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = Config::from_env()?;
  info!(target: "challenge_bot", ?config, "Starting");

  let (state, deliveries) = AppState::new(&config).await?;
  let worker = tokio::spawn(run_worker(deliveries, state.bot.clone()));

  let (stop_tx, stop_rx) = watch::channel(false);
  tokio::spawn(async move {
    shutdown_signal().await;
    info!(target: "challenge_bot", "Shutdown signal received");
    let _ = stop_tx.send(true);
  });

  let health = match config.health_port {
    Some(port) => {
      let addr = SocketAddr::from(([0, 0, 0, 0], port));
      let listener = TcpListener::bind(addr).await?;
      info!(target: "challenge_bot", %addr, "Health server listening");
      let mut stop = stop_rx.clone();
      Some(tokio::spawn(async move {
        let served = axum::serve(listener, build_router())
          .with_graceful_shutdown(async move {
            let _ = stop.changed().await;
          })
          .await;
        if let Err(e) = served {
          error!(target: "challenge_bot", error = %e, "Health server failed");
        }
      }))
    }
    None => None,
  };

  state.dispatcher().run(stop_rx).await;

  if let Some(health) = health {
    let _ = health.await;
  }
  // the worker stops once the last notifier handle is gone
  drop(state);
  if let Err(e) = worker.await {
    error!(target: "challenge_bot", error = %e, "Notification worker failed");
  }
  info!(target: "challenge_bot", "Bye");
  Ok(())
}
