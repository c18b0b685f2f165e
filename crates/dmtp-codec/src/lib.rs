//! # dmtp-codec
//!
//! Async framing layer for the OpenDMTP wire protocol.
//!
//! This crate turns raw byte streams (TCP) and datagrams (UDP) into
//! [`dmtp_protocol::Packet`]s, handling both binary framing and the
//! ASCII/hex/base64/CSV text encodings behind a single
//! `tokio_util::codec::{Decoder, Encoder}` implementation.
//!
//! ## Architecture
//!
//! ```text
//! byte stream -> DmtpCodec (sentinel-detected framing) -> Packet -> dmtp-session
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod ascii_codec;
pub mod binary_codec;
pub mod dmtp_codec;
pub mod error;
pub mod framed;

pub use dmtp_codec::{DmtpCodec, DEFAULT_MAX_FRAME_BYTES};
pub use error::CodecError;
pub use framed::PacketStream;
