//! The transport-driving loop for a single session.
//!
//! Owns the framed [`PacketStream`], enforces the identification/idle
//! timeouts, and feeds decoded packets to a [`Dispatcher`], writing
//! whatever responses it returns back to the wire. Business logic (what a
//! packet means, what to reply) lives entirely in [`crate::dispatch`]; this
//! module only pumps bytes and clocks.

use std::sync::Arc;

use dmtp_codec::{DmtpCodec, PacketStream};
use dmtp_protocol::{now_epoch_seconds, Packet, ServerPacketType};
use dmtp_store::Store;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::warn;

use crate::config::SessionConfig;
use crate::dispatch::Dispatcher;
use crate::error::SessionError;
use crate::state::SessionState;
use crate::stats::SessionStats;

/// Drives one duplex (TCP) session to completion against a store backend.
pub struct Session<T, S: Store> {
    stream: PacketStream<T>,
    dispatcher: Dispatcher<S>,
    config: SessionConfig,
    stats: SessionStats,
}

impl<T, S> Session<T, S>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: Store,
{
    /// Start a new duplex session over `transport`, with no encoding
    /// pinned yet — the first packet received decides it.
    #[must_use]
    pub fn new(transport: T, store: Arc<S>, config: SessionConfig) -> Self {
        let codec = DmtpCodec::new().with_max_frame_bytes(config.max_frame_bytes);
        Self {
            stream: PacketStream::with_codec(transport, codec),
            dispatcher: Dispatcher::new(store, true),
            config,
            stats: SessionStats::new(),
        }
    }

    /// Run the session until it terminates, the peer closes the
    /// connection, or a fatal error occurs. Always returns the stats
    /// accumulated up to that point, even on error.
    pub async fn run(mut self) -> (SessionStats, Result<(), SessionError>) {
        let result = self.drive().await;
        self.stats.encoding = self.stream.codec().encoding();
        (self.stats, result)
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        loop {
            let packet = match self.next_packet().await? {
                Some(packet) => packet,
                None => return Ok(()),
            };

            self.stats.mark_activity();
            self.stats.bytes_in += packet.encoded_len() as u64;

            let outcome = self.dispatcher.dispatch(&packet, now_epoch_seconds()).await;

            for _ in 0..outcome.events_stored {
                self.stats.record_stored();
            }
            for _ in 0..outcome.events_duplicate {
                self.stats.record_duplicate();
            }
            if outcome.downgrade_encoding {
                self.apply_encoding_downgrade().await;
            }

            for response in outcome.packets {
                self.stats.bytes_out += response.encoded_len() as u64;
                if response.packet_type == ServerPacketType::Error.to_u8() {
                    self.stats.record_nak();
                }
                self.stream.send(response).await.map_err(SessionError::Codec)?;
            }

            if self.dispatcher.state() == SessionState::Terminated {
                return Ok(());
            }
        }
    }

    /// Read the next packet, applying the three-tier timeout budget: the
    /// deadline appropriate to the current FSM state bounds the wait for a
    /// packet's first byte, but once that byte has arrived (the stream has
    /// a non-empty partial frame buffered) a single tighter retry under
    /// `packet_timeout` bounds only the rest of that one packet.
    async fn next_packet(&mut self) -> Result<Option<Packet>, SessionError> {
        let deadline = match self.dispatcher.state() {
            SessionState::AwaitIdent => self.config.identification_timeout,
            SessionState::AwaitEobAck => self.config.eob_ack_timeout,
            _ => self.config.idle_timeout,
        };

        match timeout(deadline, self.stream.next()).await {
            Ok(Some(Ok(packet))) => Ok(Some(packet)),
            Ok(Some(Err(err))) => Err(SessionError::Codec(err)),
            Ok(None) => Ok(None),
            Err(_) if self.stream.has_partial_frame() => {
                match timeout(self.config.packet_timeout, self.stream.next()).await {
                    Ok(Some(Ok(packet))) => Ok(Some(packet)),
                    Ok(Some(Err(err))) => Err(SessionError::Codec(err)),
                    Ok(None) => Ok(None),
                    Err(_) => Err(self.timeout_error()),
                }
            }
            Err(_) => Err(self.timeout_error()),
        }
    }

    fn timeout_error(&self) -> SessionError {
        if self.dispatcher.state() == SessionState::AwaitIdent {
            SessionError::IdentificationTimeout
        } else {
            SessionError::IdleTimeout
        }
    }

    async fn apply_encoding_downgrade(&mut self) {
        let Some(current) = self.stream.codec().encoding() else {
            return;
        };
        let Some(target) = current.downgrade_target() else {
            warn!(?current, "encoding downgrade requested with no defined target");
            return;
        };
        self.stream.codec_mut().set_encoding(target);
        if let Err(err) = self.dispatcher.forget_encoding(current).await {
            warn!(%err, "failed to persist encoding downgrade");
        }
    }
}

/// Dispatch every event packet in a single UDP datagram's worth of
/// already-decoded packets against a fresh, identification-only session.
///
/// Simplex sessions never write responses (`dmtp_protocol`'s ACK/EOB/EOT
/// flow is duplex-only): the caller discards whatever [`Dispatcher`]
/// would have replied with. This mirrors §6's "simplex discards
/// responses" rule without threading an unused sink through the call.
pub async fn dispatch_simplex_datagram<S: Store>(
    packets: &[dmtp_protocol::Packet],
    store: Arc<S>,
) -> SessionStats {
    let mut dispatcher = Dispatcher::new(store, false);
    let mut stats = SessionStats::new();
    let now = now_epoch_seconds();
    for packet in packets {
        stats.mark_activity();
        stats.bytes_in += packet.encoded_len() as u64;
        let outcome = dispatcher.dispatch(packet, now).await;
        for _ in 0..outcome.events_stored {
            stats.record_stored();
        }
        for _ in 0..outcome.events_duplicate {
            stats.record_duplicate();
        }
    }
    stats
}
