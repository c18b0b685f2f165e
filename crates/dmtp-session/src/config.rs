//! Session timeout configuration.

use std::time::Duration;

/// Timeouts governing a single session's lifecycle. Grounded on
/// `mssql-client::config::TimeoutConfig`'s shape (one field per phase,
/// a `Default` impl with spec-reasonable values).
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Time allowed for the first identification packet to arrive after
    /// the transport connects (§4.4).
    pub identification_timeout: Duration,
    /// Time allowed between packets once identified, before the session
    /// is considered idle and closed.
    pub idle_timeout: Duration,
    /// Time allowed for a client to acknowledge an `EOB`/`EOT` before the
    /// session gives up and closes.
    pub eob_ack_timeout: Duration,
    /// Time allowed for the remainder of a packet to arrive once its first
    /// byte has been observed. Tighter than `idle_timeout`, which bounds
    /// the gap *between* packets rather than a single in-flight one.
    pub packet_timeout: Duration,
    /// Maximum payload size accepted from a client frame, in bytes.
    pub max_frame_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identification_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
            eob_ack_timeout: Duration::from_secs(15),
            packet_timeout: Duration::from_secs(1),
            max_frame_bytes: dmtp_codec::DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl SessionConfig {
    /// Start from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the identification timeout.
    #[must_use]
    pub fn with_identification_timeout(mut self, timeout: Duration) -> Self {
        self.identification_timeout = timeout;
        self
    }

    /// Override the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Override the EOB/EOT acknowledgement timeout.
    #[must_use]
    pub fn with_eob_ack_timeout(mut self, timeout: Duration) -> Self {
        self.eob_ack_timeout = timeout;
        self
    }

    /// Override the per-packet completion timeout.
    #[must_use]
    pub fn with_packet_timeout(mut self, timeout: Duration) -> Self {
        self.packet_timeout = timeout;
        self
    }
}
