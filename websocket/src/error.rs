use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("WebSocket server error: {0}")]
    Io(#[from] std::io::Error),
}
