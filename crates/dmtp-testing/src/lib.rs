//! # dmtp-testing
//!
//! Test infrastructure for OpenDMTP server development: an in-memory
//! [`dmtp_store::Store`] implementation and a wire-level mock client for
//! driving a [`dmtp_server::Listener`] end to end without a real database
//! or device fleet.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod memory_store;
pub mod mock_client;

pub use memory_store::{DeviceSeed, MemoryStore};
pub use mock_client::{send_udp_datagram, MockClient};
