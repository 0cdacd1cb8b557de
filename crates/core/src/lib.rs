//! Core relay logic for the simultaneous interpretation gateway.
//!
//! This crate knows nothing about HTTP or a particular WebSocket library. It
//! defines the upstream event vocabulary, the per-session state machine, and
//! the two-pump relay that the service binds to real sockets through the
//! traits in [`relay`].

pub mod codec;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod stats;

pub use error::{RelayError, Result};
pub use protocol::{ClientEvent, Modality, ServerEvent, SessionConfig};
pub use relay::{
    ClientSink, ClientSource, Relay, SessionOutcome, UpstreamConnector, UpstreamSink,
    UpstreamSource,
};
pub use session::{Directive, Session, SessionState};
pub use stats::SessionStats;
