//! Top-level listener: binds the single configured port for both TCP and
//! UDP and runs both loops under one shutdown handle.

use std::sync::Arc;

use dmtp_store::Store;

use crate::config::ListenerConfig;
use crate::error::ListenerError;
use crate::tcp::TcpAcceptLoop;
use crate::udp::UdpReceiveLoop;

/// A running OpenDMTP listener: a TCP accept loop and a UDP receive loop
/// sharing one port and one store.
pub struct Listener {
    tcp: TcpAcceptLoop,
    udp: UdpReceiveLoop,
}

impl Listener {
    /// Bind both sockets and start serving.
    pub async fn start<S: Store + 'static>(config: ListenerConfig, store: Arc<S>) -> Result<Self, ListenerError> {
        if config.max_packet_bytes < 3 + 255 {
            return Err(ListenerError::Configuration(format!(
                "maxPacketBytes must be >= 258, got {}",
                config.max_packet_bytes
            )));
        }
        if config.min_packet_bytes < 3 {
            return Err(ListenerError::Configuration(format!(
                "minPacketBytes must be >= 3, got {}",
                config.min_packet_bytes
            )));
        }

        let config = Arc::new(config);
        let tcp = TcpAcceptLoop::start(config.clone(), store.clone()).await?;
        let udp = UdpReceiveLoop::start(config, store).await?;

        Ok(Self { tcp, udp })
    }

    /// The bound TCP address.
    #[must_use]
    pub fn tcp_addr(&self) -> std::net::SocketAddr {
        self.tcp.addr()
    }

    /// The bound UDP address.
    #[must_use]
    pub fn udp_addr(&self) -> std::net::SocketAddr {
        self.udp.addr()
    }

    /// Number of TCP sessions currently active.
    #[must_use]
    pub fn active_tcp_sessions(&self) -> usize {
        self.tcp.active_sessions()
    }

    /// Stop both loops. In-flight sessions and datagram workers run to
    /// completion.
    pub fn stop(&self) {
        self.tcp.stop();
        self.udp.stop();
    }
}
