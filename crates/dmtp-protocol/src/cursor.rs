//! Typed read/write cursor over a packet payload.
//!
//! Mirrors the small, focused accessor style of a typed buffer reader:
//! every read either advances the cursor and returns a value, or leaves
//! the cursor untouched and returns [`ProtocolError::InvalidPayload`].

use crate::error::ProtocolError;
use crate::geo::GpsPoint;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Read-only cursor over a decoded payload.
#[derive(Debug, Clone)]
pub struct PayloadReader {
    buf: Bytes,
}

impl PayloadReader {
    /// Wrap a payload for reading.
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn require(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            Err(ProtocolError::InvalidPayload)
        } else {
            Ok(())
        }
    }

    /// Read an unsigned 8-bit integer.
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.require(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a signed 8-bit integer.
    pub fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        self.require(1)?;
        Ok(self.buf.get_i8())
    }

    /// Read an unsigned 16-bit big-endian integer.
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.require(2)?;
        Ok(self.buf.get_u16())
    }

    /// Read a signed 16-bit big-endian integer.
    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        self.require(2)?;
        Ok(self.buf.get_i16())
    }

    /// Read an unsigned 32-bit big-endian integer.
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.require(4)?;
        Ok(self.buf.get_u32())
    }

    /// Read a signed 32-bit big-endian integer.
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.require(4)?;
        Ok(self.buf.get_i32())
    }

    /// Read a 48-bit unsigned integer (unique device id width).
    pub fn read_u48(&mut self) -> Result<u64, ProtocolError> {
        self.require(6)?;
        let mut value: u64 = 0;
        for _ in 0..6 {
            value = (value << 8) | u64::from(self.buf.get_u8());
        }
        Ok(value)
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        self.require(len)?;
        Ok(self.buf.copy_to_bytes(len))
    }

    /// Read a fixed-length string, trimming trailing NUL padding.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String, ProtocolError> {
        let raw = self.read_bytes(len)?;
        let trimmed = raw
            .iter()
            .position(|&b| b == 0)
            .map_or(&raw[..], |nul| &raw[..nul]);
        String::from_utf8(trimmed.to_vec()).map_err(|_| ProtocolError::InvalidPayload)
    }

    /// Read a standard-resolution (6-byte) GPS point.
    pub fn read_gps_point_standard(&mut self) -> Result<GpsPoint, ProtocolError> {
        let raw = self.read_bytes(6)?;
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&raw);
        Ok(GpsPoint::decode_standard(&bytes))
    }

    /// Read a high-resolution (8-byte) GPS point.
    pub fn read_gps_point_high(&mut self) -> Result<GpsPoint, ProtocolError> {
        let raw = self.read_bytes(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&raw);
        Ok(GpsPoint::decode_high(&bytes))
    }
}

/// Write cursor for building a payload incrementally.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Start an empty payload writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append an unsigned 8-bit integer.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Append an unsigned 16-bit big-endian integer.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    /// Append an unsigned 32-bit big-endian integer.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Append a 48-bit unsigned integer, high byte first.
    pub fn write_u48(&mut self, value: u64) {
        for shift in (0..6).rev() {
            self.buf.put_u8((value >> (shift * 8)) as u8);
        }
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Append a standard-resolution GPS point.
    pub fn write_gps_point_standard(&mut self, point: &GpsPoint) {
        self.buf.put_slice(&point.encode_standard());
    }

    /// Append a high-resolution GPS point.
    pub fn write_gps_point_high(&mut self, point: &GpsPoint) {
        self.buf.put_slice(&point.encode_high());
    }

    /// Finish, returning the built payload. Errors if the payload would
    /// exceed the wire's maximum payload length.
    pub fn finish(self) -> Result<Bytes, ProtocolError> {
        if self.buf.len() > crate::packet::MAX_PAYLOAD_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: crate::packet::MAX_PAYLOAD_LEN,
                actual: self.buf.len(),
            });
        }
        Ok(self.buf.freeze())
    }
}
