//! Session-level errors and their transience/termination semantics.

use thiserror::Error;

use dmtp_codec::CodecError;

/// Errors that can arise while driving a single session's transport loop.
///
/// Protocol-level violations (bad identification, rate-limit denial,
/// malformed event payloads) never reach this type: they are handled
/// entirely within [`crate::dispatch::Dispatcher`], which reports them as
/// NAK response packets via `DispatchResult` rather than as an `Err`. This
/// enum covers only the failures that abort the transport loop itself,
/// before or without a NAK ever being sent.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport-level I/O failure. Always transient to the protocol (no
    /// NAK is sent, the connection is simply dropped) but always
    /// terminates the session.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing/encoding failure from the codec layer.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No identification packet arrived before the identification
    /// timeout elapsed.
    #[error("identification timed out")]
    IdentificationTimeout,

    /// No further packets arrived before the in-block idle timeout
    /// elapsed.
    #[error("session idle timed out")]
    IdleTimeout,
}

impl SessionError {
    /// Whether this error reflects a transient transport condition: no
    /// packet can be sent back (the connection is already gone or about
    /// to be), and the caller should simply close out bookkeeping.
    #[must_use]
    pub fn is_transient_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::IdentificationTimeout | Self::IdleTimeout)
    }

    /// Whether this error should terminate the session outright. Every
    /// variant here does: there is no recoverable case once the transport
    /// loop itself has faulted.
    #[must_use]
    pub fn terminates_session(&self) -> bool {
        true
    }
}
