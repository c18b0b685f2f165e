//! # dmtp-protocol
//!
//! Pure implementation of the OpenDMTP wire format: packet framing, the
//! Fletcher-16 block checksum, the payload cursor, GPS point codecs, and
//! the custom payload template schema.
//!
//! ## Design philosophy
//!
//! This crate is intentionally IO-agnostic: no sockets, no async runtime,
//! no store access. `dmtp-codec` builds framing on top of it; `dmtp-session`
//! and `dmtp-store` build session/device semantics on top of that.
//!
//! ## Example
//!
//! ```
//! use dmtp_protocol::checksum::Fletcher16;
//!
//! let mut f = Fletcher16::new();
//! f.update(b"a duplex block's bytes");
//! let (f0, f1) = f.checksum();
//! assert!(f.is_valid(f0, f1));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod checksum;
pub mod cursor;
pub mod encoding;
pub mod error;
pub mod event;
pub mod geo;
pub mod packet;
pub mod template;
pub mod time;

pub use checksum::Fletcher16;
pub use encoding::{Encoding, SupportedEncodings};
pub use error::ProtocolError;
pub use event::{Event, Sequence};
pub use geo::GpsPoint;
pub use packet::{
    ClientPacketType, Packet, ServerPacketType, ASCII_SENTINEL, ASCII_TERMINATOR,
    BINARY_SENTINEL, CUSTOM_EVENT_MAX, CUSTOM_EVENT_MIN, MAX_PAYLOAD_LEN, MIN_HEADER_LEN,
    STANDARD_EVENT_MAX, STANDARD_EVENT_MIN,
};
pub use template::{Field, FieldType, FieldValue, PayloadTemplate};
pub use time::{now_epoch_seconds, EpochSeconds};
