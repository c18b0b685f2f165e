//! # dmtp-session
//!
//! The OpenDMTP per-connection session: identification, rate limiting,
//! event dispatch, and end-of-block acknowledgement, driven over a framed
//! [`dmtp_codec::PacketStream`].
//!
//! [`dispatch::Dispatcher`] holds all protocol state and business logic;
//! [`session::Session`] is the thin transport loop that owns the socket,
//! enforces timeouts, and writes back whatever the dispatcher returns.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod nak;
pub mod session;
pub mod state;
pub mod stats;

pub use config::SessionConfig;
pub use dispatch::{DispatchResult, Dispatcher};
pub use error::SessionError;
pub use nak::NakCode;
pub use session::{dispatch_simplex_datagram, Session};
pub use state::SessionState;
pub use stats::SessionStats;
