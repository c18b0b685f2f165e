//! Per-session bookkeeping.
//!
//! Grounded on `mssql-pool::lifecycle::ConnectionMetadata`: an
//! `Instant`-based struct with small `mark_*`/`record_*` mutators rather
//! than computed on demand.

use std::time::Instant;

use dmtp_protocol::Encoding;

/// Running counters and timestamps for one session, used for idle-timeout
/// checks and for diagnostics exposed by the server layer.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// When the session's transport was accepted.
    pub opened_at: Instant,
    /// When the last packet was received from the client.
    pub last_activity_at: Instant,
    /// Events successfully stored.
    pub events_stored: u64,
    /// Events rejected as duplicates (not an error, just not re-stored).
    pub events_duplicate: u64,
    /// Packets that triggered a NAK.
    pub naks_sent: u64,
    /// Bytes read from the transport.
    pub bytes_in: u64,
    /// Bytes written to the transport.
    pub bytes_out: u64,
    /// The text encoding pinned for this session, once known.
    pub encoding: Option<Encoding>,
}

impl SessionStats {
    /// A fresh set of counters, timestamped now.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            opened_at: now,
            last_activity_at: now,
            events_stored: 0,
            events_duplicate: 0,
            naks_sent: 0,
            bytes_in: 0,
            bytes_out: 0,
            encoding: None,
        }
    }

    /// Refresh the activity timestamp, used after each packet received.
    pub fn mark_activity(&mut self) {
        self.last_activity_at = Instant::now();
    }

    /// Whether more than `idle_timeout` has elapsed since the last
    /// activity.
    #[must_use]
    pub fn is_idle(&self, idle_timeout: std::time::Duration) -> bool {
        self.last_activity_at.elapsed() > idle_timeout
    }

    /// Record a stored event.
    pub fn record_stored(&mut self) {
        self.events_stored += 1;
    }

    /// Record a duplicate event (quota-consuming, not re-stored).
    pub fn record_duplicate(&mut self) {
        self.events_duplicate += 1;
    }

    /// Record a NAK sent to the client.
    pub fn record_nak(&mut self) {
        self.naks_sent += 1;
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}
