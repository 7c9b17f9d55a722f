//! WebSocket transport for the matchmaker.
//!
//! One socket per client; the socket's lifetime is the client's presence
//! in the matchmaker.

pub mod error;
pub mod server;

pub use error::WsError;
pub use server::{router, WebSocketServer, WsState};
