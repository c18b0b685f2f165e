//! The UDP receive loop.
//!
//! Each datagram is "a complete, independently-encoded packet stream": it
//! gets a fresh [`DmtpCodec`] decoded to exhaustion, and every resulting
//! packet is replayed through a brand-new, identification-only dispatcher
//! via [`dmtp_session::dispatch_simplex_datagram`]. There is no connection
//! to hold open, so the worker-per-session model of `tcp.rs` becomes
//! worker-per-datagram here, spawned from the same receive loop rather
//! than from an accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use dmtp_codec::DmtpCodec;
use dmtp_protocol::Packet;
use dmtp_session::dispatch_simplex_datagram;
use dmtp_store::Store;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::config::ListenerConfig;
use crate::error::ListenerError;

/// A running UDP receive loop. Dropping this stops it.
pub struct UdpReceiveLoop {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl UdpReceiveLoop {
    /// Bind and start receiving datagrams, spawning one dispatch worker
    /// per datagram.
    pub async fn start<S: Store>(config: Arc<ListenerConfig>, store: Arc<S>) -> Result<Self, ListenerError> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port))
            .await
            .map_err(|source| ListenerError::UdpBind { port: config.port, source })?;
        let addr = socket.local_addr().map_err(|source| ListenerError::UdpBind { port: config.port, source })?;
        let socket = Arc::new(socket);

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut shutdown_rx = shutdown_tx.subscribe();

        let recv_socket = socket.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; config.max_packet_bytes.max(dmtp_codec::DEFAULT_MAX_FRAME_BYTES)];
            loop {
                tokio::select! {
                    result = recv_socket.recv_from(&mut buf) => {
                        match result {
                            Ok((len, peer)) => {
                                let datagram = buf[..len].to_vec();
                                let config = config.clone();
                                let store = store.clone();
                                tokio::spawn(async move {
                                    handle_datagram(datagram, peer, config, store).await;
                                });
                            }
                            Err(err) => {
                                warn!(%err, "UDP recv failed");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(Self { addr, shutdown_tx })
    }

    /// The address the socket bound, useful when `port` was 0.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop receiving new datagrams. In-flight dispatch workers run to
    /// completion.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for UdpReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_datagram<S: Store>(datagram: Vec<u8>, peer: SocketAddr, config: Arc<ListenerConfig>, store: Arc<S>) {
    let work = async {
        let packets = decode_datagram(&datagram, &config);
        if packets.is_empty() {
            debug!(%peer, bytes = datagram.len(), "datagram produced no decodable packets");
            return;
        }
        let stats = dispatch_simplex_datagram(&packets, store).await;
        debug!(%peer, events_stored = stats.events_stored, events_duplicate = stats.events_duplicate, "datagram processed");
    };

    if tokio::time::timeout(config.session_timeout_udp, work).await.is_err() {
        warn!(%peer, "UDP datagram worker exceeded its session timeout");
    }
}

/// Decode every packet present in a single datagram, stopping at the
/// first decode error (a malformed trailing packet does not invalidate
/// packets already decoded ahead of it).
fn decode_datagram(datagram: &[u8], config: &ListenerConfig) -> Vec<Packet> {
    if datagram.len() < config.min_packet_bytes {
        return Vec::new();
    }

    let mut codec = DmtpCodec::new().with_max_frame_bytes(config.max_packet_bytes);
    let mut buf = BytesMut::from(datagram);
    let mut packets = Vec::new();

    loop {
        match codec.decode(&mut buf) {
            Ok(Some(packet)) => packets.push(packet),
            Ok(None) => break,
            Err(err) => {
                warn!(%err, decoded = packets.len(), "stopping datagram decode on error");
                break;
            }
        }
    }

    packets
}
