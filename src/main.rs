//! QTI Converter · quiz text → QTI zip over HTTP
//!
//! - Axum HTTP server with an upload form and a single conversion endpoint
//! - Builtin converter, or an external command (e.g. `text2qti`) via TOML config
//! - Every request works in its own temporary directory, removed afterwards
//!
//! Important env variables:
//!   PORT             : u16 (default 3000)
//!   QTI_CONFIG_PATH  : path to TOML config (upload limits + converter)
//!   LOG_LEVEL        : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT       : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod parser;
mod qti;
mod config;
mod error;
mod protocol;
mod upload;
mod workdir;
mod convert;
mod state;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::config::load_config_from_env;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = load_config_from_env();
  let state = Arc::new(AppState::new(&cfg));

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "qti_converter", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "qti_converter", "HTTP server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "qti_converter", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}
