//! Axum Router Configuration
//!
//! The service exposes a single WebSocket endpoint; each upgraded connection
//! is one relay session.

use crate::{state::AppState, ws::ws_handler};
use axum::{Router, routing::get};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/media-stream", get(ws_handler))
        .with_state(app_state)
}
