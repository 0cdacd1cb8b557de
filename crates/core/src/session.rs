//! Per-session lifecycle and the upstream event filter.

use crate::{
    codec,
    error::Result,
    protocol::{ClientEvent, ServerEvent, SessionConfig},
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Lifecycle of one relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Upstream handshake in progress.
    Connecting,
    /// Upstream socket open, `session.created` not yet seen.
    AwaitingReady,
    /// Session configured; steady state.
    Active,
    Closed,
}

/// What to do with one upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Send a control message back to the upstream.
    SendUpstream(ClientEvent),
    /// Write a binary audio frame to the client.
    ClientAudio(Bytes),
    /// Write a transcript as a text frame to the client.
    ClientText(String),
    /// Nothing reaches either side.
    Drop,
}

/// The upstream half of a session: tracks readiness and turns each upstream
/// event into a [`Directive`].
#[derive(Debug)]
pub struct Session {
    config: Arc<SessionConfig>,
    state: SessionState,
    update_sent: bool,
}

impl Session {
    pub fn new(config: Arc<SessionConfig>) -> Self {
        Self {
            config,
            state: SessionState::Connecting,
            update_sent: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Marks the upstream handshake as complete.
    pub fn upstream_connected(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::AwaitingReady;
        }
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Applies the filter/transform table to one upstream event.
    ///
    /// The only failure is an audio delta whose payload is not valid base64.
    pub fn on_event(&mut self, event: ServerEvent) -> Result<Directive> {
        if self.state == SessionState::Closed {
            return Ok(Directive::Drop);
        }

        let directive = match event {
            ServerEvent::SessionCreated => {
                if self.update_sent {
                    debug!("Duplicate session.created ignored.");
                    Directive::Drop
                } else {
                    self.update_sent = true;
                    self.state = SessionState::Active;
                    info!(
                        voice = %self.config.voice,
                        temperature = self.config.temperature,
                        "Upstream ready. Sending session.update."
                    );
                    Directive::SendUpstream(ClientEvent::SessionUpdate {
                        session: (*self.config).clone(),
                    })
                }
            }
            ServerEvent::ResponseAudioDelta { delta } => match delta {
                Some(payload) if !payload.is_empty() => {
                    Directive::ClientAudio(Bytes::from(codec::decode(&payload)?))
                }
                _ => Directive::Drop,
            },
            ServerEvent::ResponseAudioTranscriptDone { transcript } => {
                debug!(%transcript, "Transcript completed.");
                Directive::ClientText(transcript)
            }
            ServerEvent::Error { error } => {
                warn!(
                    message = %error.message,
                    kind = ?error.kind,
                    code = ?error.code,
                    "Upstream reported an error."
                );
                Directive::Drop
            }
            ServerEvent::Unrecognized => {
                debug!("Unrecognized upstream event dropped.");
                Directive::Drop
            }
            ignored => {
                trace!(event = ?ignored, "Ignoring upstream lifecycle event.");
                Directive::Drop
            }
        };
        Ok(directive)
    }
}
