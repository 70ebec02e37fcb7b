//! WebSocket Relay
//!
//! This module relays a browser's voice session to the upstream real-time
//! voice service. It is structured into submodules:
//!
//! - `protocol`: The few frames the relay reads or writes itself.
//! - `upstream`: Builds the upstream URL and session configuration, and connects.
//! - `forward`: Copies frames in both directions under a shared cancellation token.
//! - `session`: Owns both sockets for one connection, from handshake to close.

mod error;
pub mod forward;
pub mod protocol;
pub mod session;
pub mod upstream;

pub use error::RelayError;
pub use session::ws_handler;
