//! # dmtp-store
//!
//! Device identity, the connection-profile rate limiter, and the
//! pluggable storage traits that `dmtp-session` and `dmtp-server` are
//! generic over. This crate has no opinion on the actual backend: see
//! `dmtp-testing` for an in-memory implementation.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod identity;
pub mod traits;

pub use error::StoreError;
pub use identity::{mark_and_validate, ConnectionProfile, DeviceIdentity};
pub use traits::{AccountStore, DeviceStore, DiagnosticSink, EventStore, Store, TemplateStore};
