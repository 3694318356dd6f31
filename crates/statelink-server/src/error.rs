use std::net::SocketAddr;

/// Errors surfaced by the connection server.
///
/// Everything after a successful bind is handled internally (logged, peer
/// dropped, listening resumed); only startup can fail.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to configure the listener or spawn a worker thread.
    #[error("server startup I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
