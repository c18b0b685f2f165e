//! # dmtp-server
//!
//! The OpenDMTP listener runtime: a single configured port accepting both
//! TCP (duplex) and UDP (simplex) traffic, spawning one
//! [`dmtp_session::Session`] worker per TCP connection and one dispatch
//! worker per UDP datagram, against a shared [`dmtp_store::Store`]
//! backend.
//!
//! [`listener::Listener`] is the entry point; [`config::ListenerConfig`]
//! carries the timeout/size knobs spec'd for the transport layer.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod listener;
pub mod tcp;
pub mod udp;

pub use config::ListenerConfig;
pub use error::ListenerError;
pub use listener::Listener;
