//! Accepts browser connections and supervises one relay session per socket.

use super::client::{ClientReader, ClientWriter};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one session to completion. Nothing about the session outlives this call.
#[instrument(name = "relay_session", skip_all, fields(session_id = %Uuid::new_v4()))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("Client connected.");

    let (socket_tx, socket_rx) = socket.split();
    let outcome = state
        .relay
        .run(
            ClientReader::new(socket_rx),
            ClientWriter::new(socket_tx),
            state.connector.as_ref(),
        )
        .await;

    let stats = outcome.stats;
    match outcome.error {
        None => info!(
            audio_frames_appended = stats.audio_frames_appended,
            audio_chunks_delivered = stats.audio_chunks_delivered,
            transcripts_delivered = stats.transcripts_delivered,
            duration_ms = stats.duration.as_millis() as u64,
            "Session closed."
        ),
        Some(e) => error!(
            error = %e,
            audio_frames_appended = stats.audio_frames_appended,
            audio_chunks_delivered = stats.audio_chunks_delivered,
            transcripts_delivered = stats.transcripts_delivered,
            duration_ms = stats.duration.as_millis() as u64,
            "Session terminated with error."
        ),
    }
}
