//! Codec-layer errors.

use dmtp_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by [`crate::DmtpCodec`] while framing a byte stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying protocol layer rejected a frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A binary frame declared a length exceeding the configured maximum.
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Declared/actual size.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// An ASCII line exceeded the configured maximum before a terminator
    /// was found.
    #[error("ascii line too long: {size} bytes (max {max})")]
    LineTooLong {
        /// Bytes read so far without a terminator.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// Underlying transport I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
