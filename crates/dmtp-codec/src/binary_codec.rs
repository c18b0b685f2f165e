//! Binary frame encode/decode: `[0xE0][type:u8][plen:u8][payload]`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use dmtp_protocol::{Packet, ProtocolError, BINARY_SENTINEL, MIN_HEADER_LEN};

/// Attempt to decode one binary frame from the front of `src`.
///
/// Returns `Ok(None)` when more bytes are needed. On success, the consumed
/// bytes are removed from `src`.
pub fn try_decode(src: &mut BytesMut) -> Result<Option<Packet>, ProtocolError> {
    if src.len() < MIN_HEADER_LEN {
        return Ok(None);
    }
    if src[0] != BINARY_SENTINEL {
        return Err(ProtocolError::InvalidHeader);
    }

    let packet_type = src[1];
    let payload_len = src[2] as usize;
    let total_len = MIN_HEADER_LEN + payload_len;

    if src.len() < total_len {
        src.reserve(total_len - src.len());
        return Ok(None);
    }

    let mut frame = src.split_to(total_len);
    frame.advance(MIN_HEADER_LEN);
    let payload: Bytes = frame.freeze();

    tracing::trace!(packet_type, payload_len, "decoded binary dmtp packet");
    Ok(Some(Packet::new(packet_type, payload)))
}

/// Encode a packet in binary framing.
pub fn encode(packet: &Packet, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    if packet.payload.len() > u8::MAX as usize {
        return Err(ProtocolError::InvalidLength {
            expected: u8::MAX as usize,
            actual: packet.payload.len(),
        });
    }
    dst.reserve(MIN_HEADER_LEN + packet.payload.len());
    dst.put_u8(BINARY_SENTINEL);
    dst.put_u8(packet.packet_type);
    dst.put_u8(packet.payload.len() as u8);
    dst.put_slice(&packet.payload);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let packet = Packet::new(0x01, Bytes::from_static(b"hello"));
        let mut buf = BytesMut::new();
        encode(&packet, &mut buf).unwrap();

        let decoded = try_decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_incomplete_frame_returns_none() {
        let mut buf = BytesMut::from(&[BINARY_SENTINEL, 0x01, 0x05, b'h', b'e'][..]);
        assert_eq!(try_decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_wrong_sentinel_is_invalid_header() {
        let mut buf = BytesMut::from(&[0x00, 0x01, 0x00][..]);
        assert_eq!(try_decode(&mut buf), Err(ProtocolError::InvalidHeader));
    }
}
