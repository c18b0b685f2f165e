//! Store-layer errors.

use thiserror::Error;

/// Errors a [`crate::traits::AccountStore`]/[`crate::traits::DeviceStore`]/
/// [`crate::traits::EventStore`]/[`crate::traits::TemplateStore`]
/// implementation may return.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No account matched the given id.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// No device matched the given id/unique-id.
    #[error("device not found")]
    DeviceNotFound,

    /// The event's `(account, device, timestamp, status_code)` key already
    /// exists. Not fatal to the session: the session layer treats this as
    /// a successful ACK but an observable, non-inserting outcome.
    #[error("duplicate event")]
    DuplicateEvent,

    /// A template failed to register (invalid schema, storage failure).
    #[error("template registration failed: {0}")]
    TemplateRegistration(String),

    /// A backend-specific failure not covered above.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error should be treated as a duplicate-key outcome
    /// rather than a genuine failure, per §4.5/§7's "duplicate is not an
    /// error for the ACK path" rule.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateEvent)
    }
}
