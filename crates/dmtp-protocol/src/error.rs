//! Protocol-level decode/encode errors.

use thiserror::Error;

/// Errors raised while decoding or encoding an OpenDMTP packet.
///
/// This is the pure-protocol error set: it knows nothing about sessions,
/// NAK codes, or termination policy. `dmtp-session` maps these onto the
/// wire error taxonomy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The first bytes of a frame did not begin with a recognized sentinel.
    #[error("invalid packet header")]
    InvalidHeader,

    /// A declared or actual length was inconsistent with the frame.
    #[error("invalid packet length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Length implied by the header.
        expected: usize,
        /// Length actually available.
        actual: usize,
    },

    /// The encoding byte/sentinel did not match a supported encoding.
    #[error("unsupported encoding: {0:#04x}")]
    UnsupportedEncoding(u8),

    /// A payload accessor was asked to read past the declared payload length.
    #[error("invalid payload read")]
    InvalidPayload,

    /// An in-packet checksum (ASCII+CKSUM encodings) did not validate.
    #[error("invalid packet checksum")]
    InvalidChecksum,

    /// Fewer bytes are available than the frame requires; caller should wait
    /// for more data rather than treat this as malformed input.
    #[error("incomplete packet: need {needed} more byte(s)")]
    Incomplete {
        /// Additional bytes required before the frame can be decoded.
        needed: usize,
    },
}
