//! Client-visible error codes sent in `ERROR` server packets.
//!
//! Wire values are an internally consistent numbering (an implementation
//! may choose its own provided behavior round-trips); the variant names
//! mirror the functional roles the protocol distinguishes.

/// A code identifying why the server rejected a client packet, or why it
/// terminated the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NakCode {
    /// Malformed binary/ASCII frame header.
    PacketHeader = 0xF101,
    /// Unrecognized client packet type.
    PacketType = 0xF102,
    /// Payload failed to parse, or had an unexpected length for its type.
    PacketPayload = 0xF103,
    /// `UniqueId` did not resolve to any known device.
    IdInvalid = 0xF110,
    /// `AccountId` did not resolve to any known account.
    AccountInvalid = 0xF111,
    /// `DeviceId` did not resolve to any known device under the account.
    DeviceInvalid = 0xF112,
    /// The resolved account is administratively disabled.
    AccountInactive = 0xF113,
    /// The resolved device is administratively disabled.
    DeviceInactive = 0xF114,
    /// The device's connection-rate quota denied this connection.
    ExcessiveConnections = 0xF120,
    /// The device's per-window event quota was exceeded.
    ExcessiveEvents = 0xF121,
    /// An event was well-formed but the store rejected it for a reason
    /// other than a duplicate key.
    EventError = 0xF122,
    /// A `FORMAT_DEF` registration was invalid.
    FormatDefinitionInvalid = 0xF130,
    /// A duplex block's appended Fletcher checksum did not validate.
    BlockChecksum = 0xF140,
    /// A session-ending protocol violation not covered by a more specific
    /// code (reserved for conditions outside the session's own dispatch,
    /// e.g. a codec-level desync).
    ProtocolError = 0xF1FF,
}

impl NakCode {
    /// Numeric wire value.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether receiving this code should end the session rather than
    /// continue accepting packets after the NAK, per spec.md §7's
    /// enumerated terminate set.
    #[must_use]
    pub fn terminates_session(self) -> bool {
        matches!(
            self,
            Self::IdInvalid
                | Self::AccountInvalid
                | Self::DeviceInvalid
                | Self::AccountInactive
                | Self::DeviceInactive
                | Self::ExcessiveConnections
                | Self::ProtocolError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_and_payload_errors_are_recoverable() {
        assert!(!NakCode::BlockChecksum.terminates_session());
        assert!(!NakCode::PacketPayload.terminates_session());
        assert!(!NakCode::ExcessiveEvents.terminates_session());
        assert!(!NakCode::PacketType.terminates_session());
    }

    #[test]
    fn test_identity_and_connection_errors_terminate() {
        assert!(NakCode::AccountInvalid.terminates_session());
        assert!(NakCode::DeviceInvalid.terminates_session());
        assert!(NakCode::ExcessiveConnections.terminates_session());
    }
}
