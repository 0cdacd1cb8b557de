//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the deployment-wide
//! configuration every session is built from. Nothing here is mutated after
//! startup and no session is recorded in it.

use crate::{config::Config, ws::upstream::RealtimeConnector};
use interpreter_core::Relay;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub connector: Arc<RealtimeConnector>,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let relay = Relay::new(Arc::new(config.session.clone()))
            .with_ready_timeout(config.ready_timeout);
        let connector = Arc::new(RealtimeConnector::new(&config.upstream)?);
        Ok(Self { relay, connector })
    }
}
