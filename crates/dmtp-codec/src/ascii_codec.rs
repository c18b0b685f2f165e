//! ASCII-line frame encode/decode: `$<hex-type><hex-plen><payload>[*<fletcher>]\r`.
//!
//! The payload body is encoded per the session's active text [`Encoding`]
//! (hex, base64, or CSV); the optional trailing `*<fletcher>` carries a
//! Fletcher-16 checksum computed over the ASCII body (the characters
//! before the `*`), independent of the duplex-block-scoped checksum of
//! `dmtp_protocol::checksum`.

use base64::Engine;
use bytes::{Bytes, BytesMut};
use dmtp_protocol::{Encoding, Fletcher16, Packet, ProtocolError, ASCII_SENTINEL, ASCII_TERMINATOR};

const CKSUM_MARKER: u8 = b'*';

/// Attempt to decode one ASCII frame from the front of `src`, interpreting
/// the payload body per `encoding`.
///
/// Returns `Ok(None)` when the terminator has not yet arrived.
pub fn try_decode(
    src: &mut BytesMut,
    encoding: Encoding,
) -> Result<Option<Packet>, ProtocolError> {
    let Some(term_pos) = src.iter().position(|&b| b == ASCII_TERMINATOR) else {
        return Ok(None);
    };

    let line = src.split_to(term_pos + 1);
    let body = &line[..term_pos]; // exclude terminator

    if body.first() != Some(&ASCII_SENTINEL) {
        return Err(ProtocolError::InvalidHeader);
    }
    let body = &body[1..];

    if body.len() < 4 {
        return Err(ProtocolError::InvalidHeader);
    }
    let packet_type = parse_hex_byte(&body[0..2])?;
    let declared_len = parse_hex_byte(&body[2..4])? as usize;
    let rest = &body[4..];

    let (encoded_payload, checksum_marker) = match rest.iter().position(|&b| b == CKSUM_MARKER) {
        Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
        None => (rest, None),
    };

    if encoding.has_checksum() != checksum_marker.is_some() {
        return Err(ProtocolError::InvalidChecksum);
    }

    let payload = decode_body(encoded_payload, encoding)?;
    if payload.len() != declared_len {
        return Err(ProtocolError::InvalidLength {
            expected: declared_len,
            actual: payload.len(),
        });
    }

    if let Some(marker) = checksum_marker {
        verify_checksum(body, encoded_payload.len(), marker)?;
    }

    Ok(Some(Packet::new(packet_type, Bytes::from(payload))))
}

/// Encode a packet as an ASCII frame in `encoding`.
pub fn encode(packet: &Packet, encoding: Encoding, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    if packet.payload.len() > u8::MAX as usize {
        return Err(ProtocolError::InvalidLength {
            expected: u8::MAX as usize,
            actual: packet.payload.len(),
        });
    }

    let mut body = Vec::new();
    push_hex_byte(&mut body, packet.packet_type);
    push_hex_byte(&mut body, packet.payload.len() as u8);
    let encoded_payload = encode_body(&packet.payload, encoding);
    body.extend_from_slice(&encoded_payload);

    dst.reserve(body.len() + 8);
    dst.put_u8_ext(ASCII_SENTINEL);
    dst.extend_from_slice(&body);

    if encoding.has_checksum() {
        let mut fletcher = Fletcher16::new();
        fletcher.update(&body);
        let (f0, f1) = fletcher.checksum();
        dst.put_u8_ext(CKSUM_MARKER);
        push_hex_byte_into(dst, f0);
        push_hex_byte_into(dst, f1);
    }

    dst.put_u8_ext(ASCII_TERMINATOR);
    Ok(())
}

fn decode_body(encoded: &[u8], encoding: Encoding) -> Result<Vec<u8>, ProtocolError> {
    match encoding {
        Encoding::Hex | Encoding::HexCksum => decode_hex(encoded),
        Encoding::Base64 | Encoding::Base64Cksum => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ProtocolError::InvalidPayload),
        Encoding::Csv | Encoding::CsvCksum => decode_csv(encoded),
        Encoding::Binary => Err(ProtocolError::UnsupportedEncoding(0)),
    }
}

fn encode_body(payload: &[u8], encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Hex | Encoding::HexCksum => {
            let mut out = Vec::with_capacity(payload.len() * 2);
            for &b in payload {
                push_hex_byte(&mut out, b);
            }
            out
        }
        Encoding::Base64 | Encoding::Base64Cksum => {
            base64::engine::general_purpose::STANDARD.encode(payload).into_bytes()
        }
        Encoding::Csv | Encoding::CsvCksum => payload
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
            .into_bytes(),
        Encoding::Binary => Vec::new(),
    }
}

fn decode_hex(encoded: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if encoded.len() % 2 != 0 {
        return Err(ProtocolError::InvalidPayload);
    }
    encoded
        .chunks(2)
        .map(parse_hex_byte)
        .collect::<Result<Vec<u8>, _>>()
}

fn decode_csv(encoded: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }
    std::str::from_utf8(encoded)
        .map_err(|_| ProtocolError::InvalidPayload)?
        .split(',')
        .map(|field| field.parse::<u8>().map_err(|_| ProtocolError::InvalidPayload))
        .collect()
}

fn verify_checksum(body: &[u8], ascii_body_len: usize, marker: &[u8]) -> Result<(), ProtocolError> {
    if marker.len() != 4 {
        return Err(ProtocolError::InvalidChecksum);
    }
    let claimed_f0 = parse_hex_byte(&marker[0..2])?;
    let claimed_f1 = parse_hex_byte(&marker[2..4])?;

    let checksum_region = &body[..4 + ascii_body_len];
    let mut fletcher = Fletcher16::new();
    fletcher.update(checksum_region);
    if fletcher.is_valid(claimed_f0, claimed_f1) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidChecksum)
    }
}

fn parse_hex_byte(chars: &[u8]) -> Result<u8, ProtocolError> {
    if chars.len() != 2 {
        return Err(ProtocolError::InvalidPayload);
    }
    let s = std::str::from_utf8(chars).map_err(|_| ProtocolError::InvalidPayload)?;
    u8::from_str_radix(s, 16).map_err(|_| ProtocolError::InvalidPayload)
}

fn push_hex_byte(out: &mut Vec<u8>, byte: u8) {
    out.extend_from_slice(format!("{byte:02x}").as_bytes());
}

fn push_hex_byte_into(out: &mut BytesMut, byte: u8) {
    out.extend_from_slice(format!("{byte:02x}").as_bytes());
}

/// Small extension so call sites above read like `bytes::BufMut` without
/// pulling the trait's full surface into scope twice.
trait PutU8Ext {
    fn put_u8_ext(&mut self, byte: u8);
}

impl PutU8Ext for BytesMut {
    fn put_u8_ext(&mut self, byte: u8) {
        self.extend_from_slice(&[byte]);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_no_checksum() {
        let packet = Packet::new(0x01, Bytes::from_static(b"hi"));
        let mut buf = BytesMut::new();
        encode(&packet, Encoding::Hex, &mut buf).unwrap();

        let decoded = try_decode(&mut buf, Encoding::Hex).unwrap().unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_hex_cksum_roundtrip() {
        let packet = Packet::new(0x22, Bytes::from_static(b"error payload"));
        let mut buf = BytesMut::new();
        encode(&packet, Encoding::HexCksum, &mut buf).unwrap();

        let decoded = try_decode(&mut buf, Encoding::HexCksum).unwrap().unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_hex_cksum_detects_corruption() {
        let packet = Packet::new(0x22, Bytes::from_static(b"error payload"));
        let mut buf = BytesMut::new();
        encode(&packet, Encoding::HexCksum, &mut buf).unwrap();
        let last = buf.len() - 2;
        buf[last] = b'0';
        buf[last + 1] = if buf[last + 1] == b'0' { b'1' } else { b'0' };

        assert_eq!(
            try_decode(&mut buf, Encoding::HexCksum),
            Err(ProtocolError::InvalidChecksum)
        );
    }

    #[test]
    fn test_base64_roundtrip() {
        let packet = Packet::new(0x01, Bytes::from_static(b"base64 payload bytes"));
        let mut buf = BytesMut::new();
        encode(&packet, Encoding::Base64, &mut buf).unwrap();

        let decoded = try_decode(&mut buf, Encoding::Base64).unwrap().unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_csv_roundtrip() {
        let packet = Packet::new(0x01, Bytes::from_static(&[0, 1, 255, 42]));
        let mut buf = BytesMut::new();
        encode(&packet, Encoding::Csv, &mut buf).unwrap();

        let decoded = try_decode(&mut buf, Encoding::Csv).unwrap().unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_base64_cksum_roundtrip() {
        let packet = Packet::new(0x01, Bytes::from_static(b"base64 checksum payload"));
        let mut buf = BytesMut::new();
        encode(&packet, Encoding::Base64Cksum, &mut buf).unwrap();

        let decoded = try_decode(&mut buf, Encoding::Base64Cksum).unwrap().unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_csv_cksum_roundtrip() {
        let packet = Packet::new(0x22, Bytes::from_static(&[0, 1, 255, 42]));
        let mut buf = BytesMut::new();
        encode(&packet, Encoding::CsvCksum, &mut buf).unwrap();

        let decoded = try_decode(&mut buf, Encoding::CsvCksum).unwrap().unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_incomplete_line_returns_none() {
        let mut buf = BytesMut::from(&b"$01"[..]);
        assert_eq!(try_decode(&mut buf, Encoding::Hex).unwrap(), None);
    }
}
