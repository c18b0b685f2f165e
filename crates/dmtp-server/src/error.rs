//! Listener-level errors.

use thiserror::Error;

/// Errors that can occur starting or running a [`crate::listener::Listener`].
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind the TCP accept socket.
    #[error("failed to bind TCP listener on port {port}: {source}")]
    TcpBind {
        /// The port that failed to bind.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to bind the UDP socket.
    #[error("failed to bind UDP socket on port {port}: {source}")]
    UdpBind {
        /// The port that failed to bind.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The listener configuration violated a spec-mandated bound, e.g.
    /// `maxPacketBytes < 3 + 255`.
    #[error("invalid listener configuration: {0}")]
    Configuration(String),
}
