//! The stateful `tokio_util` codec combining binary and ASCII framing.
//!
//! The session's encoding is fixed by the first packet received (binary
//! sentinel vs. ASCII sentinel) and stays pinned thereafter except for an
//! explicit [`DmtpCodec::set_encoding`] call, which the session layer
//! drives on an encoding-downgrade `CLIENT_ERROR`.

use bytes::BytesMut;
use dmtp_protocol::{Encoding, Packet, ProtocolError, ASCII_SENTINEL, BINARY_SENTINEL};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::{ascii_codec, binary_codec};

/// Default cap on a framed packet's total wire size (binary) or line
/// length (ASCII), guarding against a misbehaving or malicious peer.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 600;

/// A `tokio_util::codec::{Decoder, Encoder}` for OpenDMTP packets.
///
/// Mixes binary and ASCII framing on the same stream: the encoding is
/// detected from the first byte of the first frame and then pinned for
/// the life of the session.
#[derive(Debug)]
pub struct DmtpCodec {
    encoding: Option<Encoding>,
    max_frame_bytes: usize,
}

impl DmtpCodec {
    /// Create a codec with no encoding pinned yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            encoding: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Cap the maximum frame size this codec will accept.
    #[must_use]
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// The encoding pinned by the first decoded/encoded packet, if any.
    #[must_use]
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Force the active encoding, used for the session FSM's downgrade
    /// path (`ERROR_PACKET_ENCODING`) and for encoding a session's first
    /// outbound packet before any inbound packet has pinned one.
    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = Some(encoding);
    }
}

impl Default for DmtpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DmtpCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if src.len() > self.max_frame_bytes && !src.contains(&b'\r') {
            return Err(CodecError::LineTooLong {
                size: src.len(),
                max: self.max_frame_bytes,
            });
        }

        let first = src[0];
        match (self.encoding, first) {
            (None, BINARY_SENTINEL) | (Some(Encoding::Binary), _) => {
                let decoded = binary_codec::try_decode(src)?;
                if decoded.is_some() {
                    self.encoding.get_or_insert(Encoding::Binary);
                }
                Ok(decoded)
            }
            (None, ASCII_SENTINEL) => {
                let has_cksum = has_ascii_checksum_marker(src);
                let encoding = if has_cksum { Encoding::HexCksum } else { Encoding::Hex };
                let decoded = ascii_codec::try_decode(src, encoding)?;
                if decoded.is_some() {
                    self.encoding.get_or_insert(encoding);
                }
                Ok(decoded)
            }
            (Some(encoding), ASCII_SENTINEL) => Ok(ascii_codec::try_decode(src, encoding)?),
            (Some(_), _) => Err(CodecError::Protocol(ProtocolError::InvalidHeader)),
            (None, _) => Err(CodecError::Protocol(ProtocolError::InvalidHeader)),
        }
    }
}

impl Encoder<Packet> for DmtpCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoding = self.encoding.unwrap_or(Encoding::Binary);
        match encoding {
            Encoding::Binary => binary_codec::encode(&item, dst)?,
            other => ascii_codec::encode(&item, other, dst)?,
        }
        Ok(())
    }
}

/// Peek whether an as-yet-unterminated ASCII line carries a `*<cksum>`
/// marker, without consuming any bytes.
fn has_ascii_checksum_marker(src: &BytesMut) -> bool {
    let line_end = src.iter().position(|&b| b == b'\r').unwrap_or(src.len());
    src[..line_end].contains(&b'*')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_pins_binary_encoding_from_first_packet() {
        let mut codec = DmtpCodec::new();
        let mut buf = BytesMut::new();
        binary_codec::encode(&Packet::new(0x01, Bytes::from_static(b"x")), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.packet_type, 0x01);
        assert_eq!(codec.encoding(), Some(Encoding::Binary));
    }

    #[test]
    fn test_pins_ascii_hex_cksum_from_first_packet() {
        let mut codec = DmtpCodec::new();
        let mut buf = BytesMut::new();
        ascii_codec::encode(
            &Packet::new(0x22, Bytes::from_static(b"err")),
            Encoding::HexCksum,
            &mut buf,
        )
        .unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.packet_type, 0x22);
        assert_eq!(codec.encoding(), Some(Encoding::HexCksum));
    }

    #[test]
    fn test_set_encoding_drives_subsequent_ascii_decodes() {
        let mut codec = DmtpCodec::new();
        codec.set_encoding(Encoding::Base64Cksum);
        let mut buf = BytesMut::new();
        ascii_codec::encode(
            &Packet::new(0x01, Bytes::from_static(b"payload")),
            Encoding::Base64Cksum,
            &mut buf,
        )
        .unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload, Bytes::from_static(b"payload"));
    }

    #[test]
    fn test_pinned_binary_codec_rejects_ascii_frame() {
        let mut codec = DmtpCodec::new();
        codec.set_encoding(Encoding::Binary);
        let mut buf = BytesMut::from(&b"$0102abcd\r"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
