//! Session runtime state machine.
//!
//! Grounded on `mssql-client::state::ProtocolState`: a small runtime enum
//! tracking where the session currently is, separate from any
//! compile-time type-state (spec.md's FSM is driven by packet content
//! arriving over the wire, not by which methods the caller invokes, so a
//! type-state encoding does not fit here).

/// Where a session currently sits in the identification/block protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first identification packet
    /// (`UniqueId`/`AccountId`+`DeviceId`).
    AwaitIdent,
    /// Identified, waiting for the first data packet of a block.
    Identified,
    /// Inside a block: has seen at least one event/diagnostic packet
    /// since the last `EOB`.
    InBlock,
    /// Sent an `ACK`/`EOB`/`EOT` and is waiting for the client's
    /// acknowledgement before the next block can begin.
    AwaitEobAck,
    /// The session is finished; no further packets will be processed.
    Terminated,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::AwaitIdent
    }
}

impl SessionState {
    /// Whether the session has completed identification and can accept
    /// data packets.
    #[must_use]
    pub fn is_identified(&self) -> bool {
        !matches!(self, Self::AwaitIdent)
    }

    /// Whether the session is done processing packets.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}
