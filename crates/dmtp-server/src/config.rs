//! Listener configuration.

use std::time::Duration;

/// Configuration for a [`crate::listener::Listener`].
///
/// Mirrors the separately-tunable TCP and UDP timeout budgets: a duplex
/// session and a simplex datagram worker have different natural lifetimes,
/// so each transport gets its own session-timeout default.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Port both the TCP and UDP sockets bind (required, no default).
    pub port: u16,
    /// Time allowed between packets before the first byte of a new one
    /// arrives (default 4 s).
    pub idle_timeout: Duration,
    /// Once the first byte of a packet is read, the bound the remainder
    /// must complete within (default 1 s).
    pub packet_timeout: Duration,
    /// Wall-clock bound on a whole TCP session (default 5 s).
    pub session_timeout_tcp: Duration,
    /// Wall-clock bound on a whole UDP datagram worker (default 60 s).
    pub session_timeout_udp: Duration,
    /// `SO_LINGER` duration so the final EOT/ACK is flushed before FIN
    /// (default 5 s).
    pub linger: Duration,
    /// Largest packet a binary session will accept (must be at least
    /// `3 + 255`, default 600).
    pub max_packet_bytes: usize,
    /// Smallest byte count the binary decoder will treat as a complete
    /// header (default 3: sentinel + type + length).
    pub min_packet_bytes: usize,
}

impl ListenerConfig {
    /// Start from the spec defaults, binding `port`.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            idle_timeout: Duration::from_secs(4),
            packet_timeout: Duration::from_secs(1),
            session_timeout_tcp: Duration::from_secs(5),
            session_timeout_udp: Duration::from_secs(60),
            linger: Duration::from_secs(5),
            max_packet_bytes: dmtp_codec::DEFAULT_MAX_FRAME_BYTES,
            min_packet_bytes: 3,
        }
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the packet-completion timeout.
    #[must_use]
    pub fn packet_timeout(mut self, timeout: Duration) -> Self {
        self.packet_timeout = timeout;
        self
    }

    /// Set the TCP session timeout.
    #[must_use]
    pub fn session_timeout_tcp(mut self, timeout: Duration) -> Self {
        self.session_timeout_tcp = timeout;
        self
    }

    /// Set the UDP session timeout.
    #[must_use]
    pub fn session_timeout_udp(mut self, timeout: Duration) -> Self {
        self.session_timeout_udp = timeout;
        self
    }

    /// Set the `SO_LINGER` duration.
    #[must_use]
    pub fn linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Set the maximum accepted packet size.
    #[must_use]
    pub fn max_packet_bytes(mut self, max: usize) -> Self {
        self.max_packet_bytes = max;
        self
    }

    /// Convert this configuration into the [`dmtp_session::SessionConfig`]
    /// a duplex (TCP) session is driven with.
    #[must_use]
    pub fn to_tcp_session_config(&self) -> dmtp_session::SessionConfig {
        let mut session = dmtp_session::SessionConfig::new()
            .with_identification_timeout(self.session_timeout_tcp)
            .with_idle_timeout(self.idle_timeout)
            .with_packet_timeout(self.packet_timeout);
        session.max_frame_bytes = self.max_packet_bytes;
        session
    }
}
