//! Packet framing constants and the client/server packet type taxonomy.

use crate::error::ProtocolError;
use bytes::Bytes;

/// Sentinel byte marking a binary-framed packet.
pub const BINARY_SENTINEL: u8 = 0xE0;

/// Sentinel byte marking an ASCII-framed packet (`'$'`).
pub const ASCII_SENTINEL: u8 = b'$';

/// Default ASCII line terminator.
pub const ASCII_TERMINATOR: u8 = b'\r';

/// Minimum binary frame header length: sentinel, type, length.
pub const MIN_HEADER_LEN: usize = 3;

/// Maximum payload length a single packet may carry.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Lower bound (inclusive) of the standard, non-template event type range.
pub const STANDARD_EVENT_MIN: u8 = 0xC0;
/// Upper bound (inclusive) of the standard, non-template event type range.
pub const STANDARD_EVENT_MAX: u8 = 0xCF;
/// Lower bound (inclusive) of the custom, template-keyed event type range.
pub const CUSTOM_EVENT_MIN: u8 = 0xE0;
/// Upper bound (inclusive) of the custom, template-keyed event type range.
pub const CUSTOM_EVENT_MAX: u8 = 0xEF;

/// A decoded packet: raw type byte plus payload.
///
/// The type byte is kept raw rather than pre-classified into
/// [`ClientPacketType`] so that an unrecognized type can still be echoed
/// back in a `NAK_PACKET_TYPE` error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Raw packet type byte as read off the wire.
    pub packet_type: u8,
    /// Payload bytes (0..=255 long).
    pub payload: Bytes,
}

impl Packet {
    /// Construct a new packet, truncating an oversized payload is not
    /// performed here; callers must validate length before constructing.
    #[must_use]
    pub fn new(packet_type: u8, payload: Bytes) -> Self {
        Self {
            packet_type,
            payload,
        }
    }

    /// Total encoded length of this packet in binary framing.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        MIN_HEADER_LEN + self.payload.len()
    }
}

/// Packet types a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientPacketType {
    /// 6-byte (u48) unique device id.
    UniqueId,
    /// Account id string, paired with [`ClientPacketType::DeviceId`].
    AccountId,
    /// Device id string, paired with [`ClientPacketType::AccountId`].
    DeviceId,
    /// A single property value (diagnostic/config readback).
    PropertyValue,
    /// A diagnostic record.
    Diagnostic,
    /// A client-reported error condition.
    Error,
    /// Definition of a custom payload template.
    FormatDef24,
    /// A GPS/status event; the inner byte is the raw event type, either in
    /// the standard range or the custom (template-keyed) range.
    Event(u8),
    /// End of block, more blocks to follow in this session.
    EobMore,
    /// End of block, last block of the session.
    EobDone,
}

impl ClientPacketType {
    /// Classify a raw wire type byte.
    ///
    /// Returns `None` for a byte that matches no known client packet type;
    /// the session layer turns that into `NAK_PACKET_TYPE`.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::UniqueId),
            0x02 => Some(Self::AccountId),
            0x03 => Some(Self::DeviceId),
            0x20 => Some(Self::PropertyValue),
            0x21 => Some(Self::Diagnostic),
            0x22 => Some(Self::Error),
            0x30 => Some(Self::FormatDef24),
            0xFC => Some(Self::EobMore),
            0xFD => Some(Self::EobDone),
            t if (STANDARD_EVENT_MIN..=STANDARD_EVENT_MAX).contains(&t) => Some(Self::Event(t)),
            t if (CUSTOM_EVENT_MIN..=CUSTOM_EVENT_MAX).contains(&t) => Some(Self::Event(t)),
            _ => None,
        }
    }

    /// Encode back to the raw wire type byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::UniqueId => 0x01,
            Self::AccountId => 0x02,
            Self::DeviceId => 0x03,
            Self::PropertyValue => 0x20,
            Self::Diagnostic => 0x21,
            Self::Error => 0x22,
            Self::FormatDef24 => 0x30,
            Self::Event(t) => t,
            Self::EobMore => 0xFC,
            Self::EobDone => 0xFD,
        }
    }

    /// True if this type carries a GPS/status event record.
    #[must_use]
    pub fn is_event(self) -> bool {
        matches!(self, Self::Event(_))
    }

    /// True if this event type requires a registered [`crate::template::PayloadTemplate`]
    /// to decode, as opposed to a fixed, built-in layout.
    #[must_use]
    pub fn is_custom_event(self) -> bool {
        matches!(self, Self::Event(t) if (CUSTOM_EVENT_MIN..=CUSTOM_EVENT_MAX).contains(&t))
    }

    /// True if this type is part of device identification
    /// (`AWAIT_IDENT` transitions).
    #[must_use]
    pub fn is_identification(self) -> bool {
        matches!(self, Self::UniqueId | Self::AccountId | Self::DeviceId)
    }

    /// True if this is an end-of-block marker.
    #[must_use]
    pub fn is_end_of_block(self) -> bool {
        matches!(self, Self::EobMore | Self::EobDone)
    }
}

/// Packet types the server may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerPacketType {
    /// Acknowledges the last successfully ingested event's sequence.
    Ack,
    /// Marks the end of a block for a duplex session expecting more blocks.
    Eob,
    /// Marks the end of the session (terminal).
    Eot,
    /// Carries a server-error payload.
    Error,
}

impl ServerPacketType {
    /// Encode to the raw wire type byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Ack => 0xFA,
            Self::Eob => 0xFB,
            Self::Eot => 0xFD,
            Self::Error => 0xFE,
        }
    }
}

/// Validate a declared payload length against the frame's minimum header.
pub fn validate_payload_len(len: usize) -> Result<u8, ProtocolError> {
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: MAX_PAYLOAD_LEN,
            actual: len,
        });
    }
    Ok(len as u8)
}
