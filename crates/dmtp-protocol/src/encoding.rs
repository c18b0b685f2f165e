//! Session/wire encoding negotiation.

use bitflags::bitflags;

bitflags! {
    /// A device's advertised supported-encoding bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SupportedEncodings: u8 {
        /// Binary framing, no text layer.
        const BINARY = 0x01;
        /// Base64 payload, no checksum.
        const BASE64 = 0x02;
        /// Base64 payload with an appended Fletcher checksum.
        const BASE64_CKSUM = 0x04;
        /// Hex payload, no checksum.
        const HEX = 0x08;
        /// Hex payload with an appended Fletcher checksum.
        const HEX_CKSUM = 0x10;
        /// CSV payload, no checksum.
        const CSV = 0x20;
        /// CSV payload with an appended Fletcher checksum.
        const CSV_CKSUM = 0x40;
    }
}

/// The encoding in effect for a session, fixed by the first packet received
/// and mutable only via an explicit client-signaled downgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// `[0xE0][type][len][payload]`.
    Binary,
    /// `$<hex-type><hex-plen><base64-payload>\r`.
    Base64,
    /// Base64 with a trailing `*<fletcher>`.
    Base64Cksum,
    /// `$<hex-type><hex-plen><hex-payload>\r`.
    Hex,
    /// Hex with a trailing `*<fletcher>`.
    HexCksum,
    /// `$<hex-type><hex-plen><csv-payload>\r`.
    Csv,
    /// CSV with a trailing `*<fletcher>`.
    CsvCksum,
}

impl Encoding {
    /// Whether this encoding carries a trailing Fletcher checksum.
    #[must_use]
    pub fn has_checksum(self) -> bool {
        matches!(self, Self::Base64Cksum | Self::HexCksum | Self::CsvCksum)
    }

    /// Whether this encoding uses binary framing (as opposed to an ASCII
    /// line starting with the `'$'` sentinel).
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Binary)
    }

    /// The capability bit this encoding corresponds to in a device's
    /// [`SupportedEncodings`] mask.
    #[must_use]
    pub fn as_flag(self) -> SupportedEncodings {
        match self {
            Self::Binary => SupportedEncodings::BINARY,
            Self::Base64 => SupportedEncodings::BASE64,
            Self::Base64Cksum => SupportedEncodings::BASE64_CKSUM,
            Self::Hex => SupportedEncodings::HEX,
            Self::HexCksum => SupportedEncodings::HEX_CKSUM,
            Self::Csv => SupportedEncodings::CSV,
            Self::CsvCksum => SupportedEncodings::CSV_CKSUM,
        }
    }

    /// The encoding a client downgrades *to* after reporting
    /// `ERROR_PACKET_ENCODING` on this encoding, per the session FSM's
    /// `CLIENT_ERROR` handling. `None` if this encoding has no defined
    /// downgrade target.
    #[must_use]
    pub fn downgrade_target(self) -> Option<Self> {
        match self {
            Self::HexCksum | Self::CsvCksum => Some(Self::Base64Cksum),
            Self::Hex | Self::Csv => Some(Self::Base64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_checksum() {
        assert!(Encoding::HexCksum.has_checksum());
        assert!(!Encoding::Hex.has_checksum());
    }

    #[test]
    fn test_downgrade_targets() {
        assert_eq!(Encoding::HexCksum.downgrade_target(), Some(Encoding::Base64Cksum));
        assert_eq!(Encoding::Hex.downgrade_target(), Some(Encoding::Base64));
        assert_eq!(Encoding::CsvCksum.downgrade_target(), Some(Encoding::Base64Cksum));
        assert_eq!(Encoding::Csv.downgrade_target(), Some(Encoding::Base64));
        assert_eq!(Encoding::Binary.downgrade_target(), None);
    }

    #[test]
    fn test_as_flag_matches_bitflags() {
        assert_eq!(Encoding::Binary.as_flag(), SupportedEncodings::BINARY);
        assert_eq!(Encoding::CsvCksum.as_flag(), SupportedEncodings::CSV_CKSUM);
    }
}
