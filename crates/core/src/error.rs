use std::time::Duration;

/// Every way a relay session can fail. All variants are session-fatal.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Socket-level failure on either the client or the upstream side.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The upstream sent a message that is not a well-formed event.
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
    /// An audio payload could not be decoded.
    #[error("Malformed audio encoding: {0}")]
    MalformedEncoding(#[from] base64::DecodeError),
    /// A write was attempted after the peer went away.
    #[error("Channel closed")]
    ChannelClosed,
    /// The upstream never signalled readiness.
    #[error("Upstream did not send session.created within {0:?}")]
    ReadyTimeout(Duration),
}

impl RelayError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
