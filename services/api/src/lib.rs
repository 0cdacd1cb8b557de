//! Interpreter API Library Crate
//!
//! This library binds the transport-agnostic relay in `interpreter-core` to
//! real sockets: an axum WebSocket facing the browser and a
//! `tokio-tungstenite` client facing the upstream realtime service. The
//! `api` binary is a thin wrapper around it.

pub mod config;
pub mod router;
pub mod state;
pub mod ws;
