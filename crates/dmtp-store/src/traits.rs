//! Pluggable storage interfaces.
//!
//! These are native `async fn` traits, not `#[async_trait]`-boxed ones:
//! `dmtp-server`/`dmtp-session` are generic over one concrete backend per
//! deployment, so there is no need to erase the future type behind a
//! `dyn` object. Grounded on `mssql-auth::AuthProvider`'s trait-with-async-fn
//! shape.

use dmtp_protocol::{Event, PayloadTemplate, SupportedEncodings};

use crate::identity::DeviceIdentity;
use crate::StoreError;

/// Account-level lookups.
pub trait AccountStore: Send + Sync {
    /// Look up an account by id, returning whether it is active and
    /// permitted to receive traffic.
    fn is_account_active(
        &self,
        account_id: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Device identity lookups and mutations.
pub trait DeviceStore: Send + Sync {
    /// Resolve a device by its 48-bit unique id (client sent `UniqueId`
    /// instead of `AccountId`/`DeviceId`).
    fn lookup_by_unique(
        &self,
        unique_id: u64,
    ) -> impl Future<Output = Result<DeviceIdentity, StoreError>> + Send;

    /// Resolve a device by (account, device) name pair.
    fn lookup_by_name(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> impl Future<Output = Result<DeviceIdentity, StoreError>> + Send;

    /// Persist updated connection-profile / rate-limiter state after a
    /// `mark_and_validate` call.
    fn save_connection_state(
        &self,
        identity: &DeviceIdentity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Whether the device currently supports the given encoding.
    fn supports_encoding(
        &self,
        identity: &DeviceIdentity,
        encoding: SupportedEncodings,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Permanently remove an encoding from the device's supported set,
    /// following a session-level downgrade decision.
    fn remove_encoding(
        &self,
        identity: &DeviceIdentity,
        encoding: SupportedEncodings,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Custom event payload-template registration and lookup.
pub trait TemplateStore: Send + Sync {
    /// Register (or replace) a custom event template for
    /// `(account, device, custom_type)`.
    fn register_template(
        &self,
        account_id: &str,
        device_id: &str,
        custom_type: u8,
        template: PayloadTemplate,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Look up a previously registered template.
    fn lookup_template(
        &self,
        account_id: &str,
        device_id: &str,
        custom_type: u8,
    ) -> impl Future<Output = Result<Option<PayloadTemplate>, StoreError>> + Send;
}

/// Event persistence and quota accounting.
pub trait EventStore: Send + Sync {
    /// Count events recorded for `(account, device)` within the rate-limit
    /// window ending at `now_sec`, for the quota check in §4.5.
    fn count_events(
        &self,
        account_id: &str,
        device_id: &str,
        window_minutes: u8,
        now_sec: u32,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send;

    /// Insert an event, keyed by `(account, device, timestamp, status_code)`.
    /// Returns `Err(StoreError::DuplicateEvent)` if the key already exists;
    /// the session layer treats that as a non-fatal, non-inserting success.
    fn insert_event(
        &self,
        account_id: &str,
        device_id: &str,
        event: Event,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch events for `(account, device)` with timestamps in
    /// `[from_sec, to_sec)`, oldest first. Used by operator tooling, not
    /// the ingest path itself.
    fn range_events(
        &self,
        account_id: &str,
        device_id: &str,
        from_sec: u32,
        to_sec: u32,
    ) -> impl Future<Output = Result<Vec<Event>, StoreError>> + Send;
}

/// Out-of-band diagnostic/property reporting, and a record of
/// client-reported protocol errors. Not part of spec.md's external
/// interfaces but implied by the `PROPERTY_VALUE`/`DIAGNOSTIC`/`ERROR`
/// client packet types: something has to receive them.
pub trait DiagnosticSink: Send + Sync {
    /// Record a property-value report (`PROPERTY_VALUE` packet).
    fn record_property(
        &self,
        account_id: &str,
        device_id: &str,
        property_key: u16,
        value: &[u8],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Record a diagnostic report (`DIAGNOSTIC` packet).
    fn record_diagnostic(
        &self,
        account_id: &str,
        device_id: &str,
        diagnostic_code: u16,
        value: &[u8],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Record a client-reported protocol error (`ERROR` packet).
    fn record_client_error(
        &self,
        account_id: &str,
        device_id: &str,
        error_code: u16,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A complete backend: every store trait a session needs, bundled so
/// `dmtp-session`/`dmtp-server` can be generic over a single type
/// parameter instead of four.
pub trait Store:
    AccountStore + DeviceStore + TemplateStore + EventStore + DiagnosticSink + Send + Sync + 'static
{
}

impl<T> Store for T where
    T: AccountStore
        + DeviceStore
        + TemplateStore
        + EventStore
        + DiagnosticSink
        + Send
        + Sync
        + 'static
{
}
