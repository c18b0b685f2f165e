//! The GPS/status event record.

use bytes::Bytes;

use crate::cursor::{PayloadReader, PayloadWriter};
use crate::error::ProtocolError;
use crate::geo::GpsPoint;
use crate::time::EpochSeconds;

const FLAG_SPEED: u8 = 0x01;
const FLAG_HEADING: u8 = 0x02;
const FLAG_ALTITUDE: u8 = 0x04;
const FLAG_DISTANCE: u8 = 0x08;
const FLAG_TOP_SPEED: u8 = 0x10;
const FLAG_GEOFENCE: u8 = 0x20;
const FLAG_SEQUENCE: u8 = 0x40;
const FLAG_HIGH_RES_GPS: u8 = 0x80;

/// A single ingested telemetry event.
///
/// Uniqueness within a device's event stream is `(account, device,
/// timestamp, status_code)`; `account`/`device` are not carried on this
/// struct since they are properties of the owning session, not the wire
/// record.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Seconds since epoch when the event was recorded on the device.
    pub timestamp: EpochSeconds,
    /// Device-defined status code.
    pub status_code: u16,
    /// Reported position.
    pub position: GpsPoint,
    /// Speed in km/h.
    pub speed_kph: f32,
    /// Heading in degrees.
    pub heading_deg: f32,
    /// Altitude in meters.
    pub altitude_m: f32,
    /// Cumulative distance in km.
    pub distance_km: f32,
    /// Top speed observed since the last event, in km/h.
    pub top_speed_kph: f32,
    /// Up to two geofence ids the device reports as crossed/contained.
    pub geofence_ids: [Option<u32>; 2],
    /// Optional sequence number and width, set when the device is
    /// reporting gap-filled historical events.
    pub sequence: Option<Sequence>,
    /// Raw, as-received payload bytes, preserved for replay/debugging.
    pub raw: Vec<u8>,
}

/// A sequence number plus the byte width the client used to encode it, so
/// the server's ACK can echo the same width back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    /// Sequence number value.
    pub number: u32,
    /// Width in bytes (1..=3) as received.
    pub width: u8,
}

impl Event {
    /// The `(timestamp, status_code)` half of this event's uniqueness key;
    /// callers combine it with the owning session's `(account, device)`.
    #[must_use]
    pub fn key(&self) -> (EpochSeconds, u16) {
        (self.timestamp, self.status_code)
    }

    /// Decode a standard-event payload: a presence-flags byte, timestamp,
    /// status code, a GPS point (6 or 8 bytes per the high-resolution
    /// flag), then each optional field in flag order.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let raw = payload.to_vec();
        let mut reader = PayloadReader::new(Bytes::copy_from_slice(payload));
        let flags = reader.read_u8()?;
        let timestamp = reader.read_u32()?;
        let status_code = reader.read_u16()?;
        let position = if flags & FLAG_HIGH_RES_GPS != 0 {
            reader.read_gps_point_high()?
        } else {
            reader.read_gps_point_standard()?
        };

        let speed_kph = read_scaled_u16(&mut reader, flags, FLAG_SPEED)?;
        let heading_deg = read_scaled_u16(&mut reader, flags, FLAG_HEADING)?;
        let altitude_m = read_scaled_i16(&mut reader, flags, FLAG_ALTITUDE)?;
        let distance_km = read_scaled_u16(&mut reader, flags, FLAG_DISTANCE)?;
        let top_speed_kph = read_scaled_u16(&mut reader, flags, FLAG_TOP_SPEED)?;

        let mut geofence_ids = [None, None];
        if flags & FLAG_GEOFENCE != 0 {
            let count = reader.read_u8()?;
            for slot in geofence_ids.iter_mut().take(count.min(2) as usize) {
                *slot = Some(reader.read_u32()?);
            }
        }

        let sequence = if flags & FLAG_SEQUENCE != 0 {
            let width = reader.read_u8()?;
            if !(1..=3).contains(&width) {
                return Err(ProtocolError::InvalidPayload);
            }
            let bytes = reader.read_bytes(width as usize)?;
            let mut number: u32 = 0;
            for byte in bytes.iter() {
                number = (number << 8) | u32::from(*byte);
            }
            Some(Sequence { number, width })
        } else {
            None
        };

        Ok(Self {
            timestamp,
            status_code,
            position,
            speed_kph,
            heading_deg,
            altitude_m,
            distance_km,
            top_speed_kph,
            geofence_ids,
            sequence,
            raw,
        })
    }

    /// Encode this event as a standard-event payload, the inverse of
    /// [`Event::decode`].
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut flags = 0u8;
        if self.speed_kph != 0.0 {
            flags |= FLAG_SPEED;
        }
        if self.heading_deg != 0.0 {
            flags |= FLAG_HEADING;
        }
        if self.altitude_m != 0.0 {
            flags |= FLAG_ALTITUDE;
        }
        if self.distance_km != 0.0 {
            flags |= FLAG_DISTANCE;
        }
        if self.top_speed_kph != 0.0 {
            flags |= FLAG_TOP_SPEED;
        }
        if self.geofence_ids.iter().any(Option::is_some) {
            flags |= FLAG_GEOFENCE;
        }
        if self.sequence.is_some() {
            flags |= FLAG_SEQUENCE;
        }
        let mut writer = PayloadWriter::new();
        writer.write_u8(flags);
        writer.write_u32(self.timestamp);
        writer.write_u16(self.status_code);
        writer.write_gps_point_standard(&self.position);

        if flags & FLAG_SPEED != 0 {
            writer.write_u16(scale_u16(self.speed_kph));
        }
        if flags & FLAG_HEADING != 0 {
            writer.write_u16(scale_u16(self.heading_deg));
        }
        if flags & FLAG_ALTITUDE != 0 {
            writer.write_u16(scale_i16(self.altitude_m) as u16);
        }
        if flags & FLAG_DISTANCE != 0 {
            writer.write_u16(scale_u16(self.distance_km));
        }
        if flags & FLAG_TOP_SPEED != 0 {
            writer.write_u16(scale_u16(self.top_speed_kph));
        }
        if flags & FLAG_GEOFENCE != 0 {
            let count = self.geofence_ids.iter().filter(|id| id.is_some()).count() as u8;
            writer.write_u8(count);
            for id in self.geofence_ids.iter().flatten() {
                writer.write_u32(*id);
            }
        }
        if let Some(sequence) = self.sequence {
            writer.write_u8(sequence.width);
            for shift in (0..sequence.width).rev() {
                writer.write_u8((sequence.number >> (shift * 8)) as u8);
            }
        }

        writer.finish()
    }
}

fn scale_u16(value: f32) -> u16 {
    (value * 10.0).round().clamp(0.0, f32::from(u16::MAX)) as u16
}

fn scale_i16(value: f32) -> i16 {
    (value * 10.0).round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

fn read_scaled_u16(
    reader: &mut PayloadReader,
    flags: u8,
    flag: u8,
) -> Result<f32, ProtocolError> {
    if flags & flag == 0 {
        return Ok(0.0);
    }
    Ok(f32::from(reader.read_u16()?) / 10.0)
}

fn read_scaled_i16(
    reader: &mut PayloadReader,
    flags: u8,
    flag: u8,
) -> Result<f32, ProtocolError> {
    if flags & flag == 0 {
        return Ok(0.0);
    }
    Ok(f32::from(reader.read_i16()?) / 10.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_is_timestamp_and_status() {
        let event = Event {
            timestamp: 100,
            status_code: 0xF020,
            position: GpsPoint::new(0.0, 0.0),
            speed_kph: 0.0,
            heading_deg: 0.0,
            altitude_m: 0.0,
            distance_km: 0.0,
            top_speed_kph: 0.0,
            geofence_ids: [None, None],
            sequence: None,
            raw: Vec::new(),
        };
        assert_eq!(event.key(), (100, 0xF020));
    }

    #[test]
    fn test_encode_decode_roundtrip_with_optional_fields() {
        let event = Event {
            timestamp: 0x6500_0000,
            status_code: 0xF020,
            position: GpsPoint::new(34.05, -118.25),
            speed_kph: 62.5,
            heading_deg: 180.0,
            altitude_m: -12.5,
            distance_km: 0.0,
            top_speed_kph: 0.0,
            geofence_ids: [Some(7), None],
            sequence: Some(Sequence { number: 42, width: 1 }),
            raw: Vec::new(),
        };
        let encoded = event.encode().unwrap();
        let decoded = Event::decode(&encoded).unwrap();
        assert_eq!(decoded.timestamp, event.timestamp);
        assert_eq!(decoded.status_code, event.status_code);
        assert_eq!(decoded.geofence_ids, event.geofence_ids);
        assert_eq!(decoded.sequence, event.sequence);
        assert!((decoded.speed_kph - event.speed_kph).abs() < 0.1);
        assert!((decoded.altitude_m - event.altitude_m).abs() < 0.1);
    }

    #[test]
    fn test_encode_decode_minimal_event_has_no_optional_fields() {
        let event = Event {
            timestamp: 1,
            status_code: 2,
            position: GpsPoint::new(0.0, 0.0),
            speed_kph: 0.0,
            heading_deg: 0.0,
            altitude_m: 0.0,
            distance_km: 0.0,
            top_speed_kph: 0.0,
            geofence_ids: [None, None],
            sequence: None,
            raw: Vec::new(),
        };
        let encoded = event.encode().unwrap();
        assert_eq!(encoded.len(), 1 + 4 + 2 + 6);
        let decoded = Event::decode(&encoded).unwrap();
        assert_eq!(decoded.sequence, None);
        assert_eq!(decoded.geofence_ids, [None, None]);
    }
}
