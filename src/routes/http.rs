//! Probe handlers. The bot holds no request-path state worth checking here:
//! once the process serves HTTP, startup (database, migrations) is done.

use axum::{response::IntoResponse, Json};
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct StatusOut {
  pub status: &'static str,
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(StatusOut { status: "ok" }) }

#[instrument(level = "info")]
pub async fn http_ready() -> impl IntoResponse { Json(StatusOut { status: "ready" }) }
