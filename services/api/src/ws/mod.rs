//! WebSocket Session Management
//!
//! - `session`: accepts browser connections and runs one relay per socket.
//! - `client`: adapts the browser WebSocket to the relay's client traits.
//! - `upstream`: opens and adapts the upstream realtime WebSocket.

pub mod client;
pub mod session;
pub mod upstream;

pub use session::ws_handler;
