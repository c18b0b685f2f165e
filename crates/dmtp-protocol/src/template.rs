//! Custom event payload templates.
//!
//! A [`PayloadTemplate`] is a user-defined schema for a custom event type,
//! registered by the device and looked up by (account, device, customType)
//! in `dmtp-store`. This module owns only the schema shape and its
//! validity predicate; resolution and storage live in `dmtp-store`.

use crate::cursor::PayloadReader;
use crate::error::ProtocolError;
use crate::geo::GpsPoint;
use crate::packet::MAX_PAYLOAD_LEN;

/// Field data types a template may describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 32-bit integer.
    Int32,
    /// Standard-resolution (6-byte) GPS point.
    GpsPointStandard,
    /// High-resolution (8-byte) GPS point.
    GpsPointHigh,
    /// Fixed-length ASCII/UTF-8 string.
    String,
    /// Opaque fixed-length byte string.
    Binary,
}

impl FieldType {
    /// Recognize a raw template field-type byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::UInt8),
            0x02 => Some(Self::UInt16),
            0x03 => Some(Self::UInt32),
            0x04 => Some(Self::Int32),
            0x05 => Some(Self::GpsPointStandard),
            0x06 => Some(Self::GpsPointHigh),
            0x07 => Some(Self::String),
            0x08 => Some(Self::Binary),
            _ => None,
        }
    }

    /// Encode back to the raw wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::UInt8 => 0x01,
            Self::UInt16 => 0x02,
            Self::UInt32 => 0x03,
            Self::Int32 => 0x04,
            Self::GpsPointStandard => 0x05,
            Self::GpsPointHigh => 0x06,
            Self::String => 0x07,
            Self::Binary => 0x08,
        }
    }

    /// Fixed encoded width in bytes for this field type. `String`/`Binary`
    /// widths come from the field descriptor's declared length instead.
    #[must_use]
    pub fn fixed_width(self) -> Option<u8> {
        match self {
            Self::UInt8 => Some(1),
            Self::UInt16 => Some(2),
            Self::UInt32 | Self::Int32 => Some(4),
            Self::GpsPointStandard => Some(6),
            Self::GpsPointHigh => Some(8),
            Self::String | Self::Binary => None,
        }
    }
}

/// A single field descriptor within a [`PayloadTemplate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field data type.
    pub field_type: FieldType,
    /// 1-based position within the encoded payload.
    pub index: u8,
    /// Encoded length in bytes.
    pub length: u8,
}

/// A custom event's payload schema, keyed by (account, device, customType)
/// in `dmtp-store`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PayloadTemplate {
    /// Ordered field descriptors, in wire order.
    pub fields: Vec<Field>,
}

impl PayloadTemplate {
    /// Build a template from its field list.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// A template is valid iff the sum of its field lengths fits in a
    /// single payload and every declared length matches the field type's
    /// fixed width when one is defined.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let total: u32 = self.fields.iter().map(|f| u32::from(f.length)).sum();
        if total > MAX_PAYLOAD_LEN as u32 {
            return false;
        }
        self.fields.iter().all(|f| match f.field_type.fixed_width() {
            Some(width) => f.length == width,
            None => f.length > 0,
        })
    }

    /// Decode a custom-event payload against this template, one
    /// [`FieldValue`] per descriptor in wire order.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<FieldValue>, ProtocolError> {
        let mut reader = PayloadReader::new(bytes::Bytes::copy_from_slice(payload));
        self.fields
            .iter()
            .map(|field| field.decode(&mut reader))
            .collect()
    }
}

/// A decoded custom-event field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// [`FieldType::UInt8`].
    UInt8(u8),
    /// [`FieldType::UInt16`].
    UInt16(u16),
    /// [`FieldType::UInt32`].
    UInt32(u32),
    /// [`FieldType::Int32`].
    Int32(i32),
    /// [`FieldType::GpsPointStandard`] or [`FieldType::GpsPointHigh`].
    Gps(GpsPoint),
    /// [`FieldType::String`].
    String(String),
    /// [`FieldType::Binary`].
    Binary(Vec<u8>),
}

impl FieldValue {
    /// The GPS point carried by this value, if it is a GPS field.
    #[must_use]
    pub fn as_gps_point(&self) -> Option<GpsPoint> {
        match self {
            Self::Gps(point) => Some(*point),
            _ => None,
        }
    }
}

impl Field {
    fn decode(&self, reader: &mut PayloadReader) -> Result<FieldValue, ProtocolError> {
        Ok(match self.field_type {
            FieldType::UInt8 => FieldValue::UInt8(reader.read_u8()?),
            FieldType::UInt16 => FieldValue::UInt16(reader.read_u16()?),
            FieldType::UInt32 => FieldValue::UInt32(reader.read_u32()?),
            FieldType::Int32 => FieldValue::Int32(reader.read_i32()?),
            FieldType::GpsPointStandard => FieldValue::Gps(reader.read_gps_point_standard()?),
            FieldType::GpsPointHigh => FieldValue::Gps(reader.read_gps_point_high()?),
            FieldType::String => FieldValue::String(reader.read_fixed_string(self.length as usize)?),
            FieldType::Binary => {
                FieldValue::Binary(reader.read_bytes(self.length as usize)?.to_vec())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_template() {
        let template = PayloadTemplate::new(vec![
            Field { field_type: FieldType::UInt32, index: 1, length: 4 },
            Field { field_type: FieldType::GpsPointStandard, index: 2, length: 6 },
        ]);
        assert!(template.is_valid());
    }

    #[test]
    fn test_invalid_fixed_width_mismatch() {
        let template = PayloadTemplate::new(vec![Field {
            field_type: FieldType::UInt32,
            index: 1,
            length: 2,
        }]);
        assert!(!template.is_valid());
    }

    #[test]
    fn test_invalid_total_length_exceeds_payload() {
        let fields = (0..30)
            .map(|i| Field { field_type: FieldType::Binary, index: i, length: 20 })
            .collect();
        assert!(!PayloadTemplate::new(fields).is_valid());
    }

    #[test]
    fn test_unrecognized_field_type_byte() {
        assert_eq!(FieldType::from_u8(0xFF), None);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_decode_fields_in_wire_order() {
        let template = PayloadTemplate::new(vec![
            Field { field_type: FieldType::UInt16, index: 1, length: 2 },
            Field { field_type: FieldType::GpsPointStandard, index: 2, length: 6 },
        ]);
        let point = GpsPoint::new(10.0, -20.0);
        let mut payload = vec![0x00, 0x2a];
        payload.extend_from_slice(&point.encode_standard());
        let values = template.decode(&payload).unwrap();
        assert_eq!(values[0], FieldValue::UInt16(42));
        assert!(values[1].as_gps_point().is_some());
    }
}
