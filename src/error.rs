//! Error types for sessionwire.

use thiserror::Error;

/// Main error type for all sessionwire operations.
#[derive(Debug, Error)]
pub enum SessionwireError {
    /// I/O error outside of an established connection (bind, connect, config file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Peer closed the transport (zero-length read or write).
    #[error("Transport closed by peer")]
    TransportClosed,

    /// OS-level transport failure on a live connection.
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// Protocol violation (bad header, oversized frame, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No installed handler serves the given protocol id.
    #[error("No handler for protocol id: {0}")]
    UnknownProtocol(u16),

    /// Receive would exceed the frame buffer's remaining capacity.
    #[error("Frame buffer overflow: received {received} bytes with {available} available")]
    Overflow { received: usize, available: usize },

    /// Handshake failure (malformed hello, unexpected message, bad session id).
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// The session bound to a connection has been dropped.
    #[error("Session released")]
    SessionReleased,

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),
}

impl SessionwireError {
    /// Whether this is a transport fault the peer caused by resetting or aborting.
    ///
    /// Graceful and unexpected faults both end the connection; only the log
    /// level differs.
    pub fn is_graceful(&self) -> bool {
        match self {
            SessionwireError::TransportClosed => true,
            SessionwireError::Transport(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Whether this error came from the peer's bytes rather than the transport.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            SessionwireError::Protocol(_)
                | SessionwireError::UnknownProtocol(_)
                | SessionwireError::Overflow { .. }
                | SessionwireError::Handshake(_)
                | SessionwireError::MsgPackDecode(_)
        )
    }
}

/// Result type alias using SessionwireError.
pub type Result<T> = std::result::Result<T, SessionwireError>;
