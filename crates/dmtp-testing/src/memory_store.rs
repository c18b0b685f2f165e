//! An in-memory [`Store`] implementation for tests and the demo binary.
//!
//! No teacher counterpart exists (`mssql-*` is a client driver, never a
//! backend); built directly to the `dmtp-store` trait contracts, using
//! `parking_lot::Mutex`-guarded maps the way `mssql-pool`'s connection
//! pool guards its slot list — a single lock per concern, held only for
//! the duration of a synchronous map operation.

use std::collections::HashMap;

use dmtp_protocol::{Event, PayloadTemplate, SupportedEncodings};
use dmtp_store::{AccountStore, ConnectionProfile, DeviceIdentity, DeviceStore};
use dmtp_store::{DiagnosticSink, EventStore, StoreError, TemplateStore};
use parking_lot::Mutex;

/// Seed data for one device, handed to [`MemoryStore::with_device`].
#[derive(Debug, Clone)]
pub struct DeviceSeed {
    /// Owning account id.
    pub account_id: String,
    /// Device id within the account.
    pub device_id: String,
    /// 48-bit unique id, for `CLIENT_UNIQUE_ID` identification.
    pub unique_id: u64,
    /// Whether the device is active (inactive devices are rejected at
    /// identification).
    pub is_active: bool,
    /// Encodings this device starts out supporting.
    pub supported_encodings: SupportedEncodings,
    /// Rate-limit window width, in minutes.
    pub limit_time_interval_minutes: u8,
    /// Event quota within the window; 0 disables it.
    pub max_allowed_events: u32,
    /// Max total connections within the window.
    pub total_max_conn: u32,
    /// Max total connections within the last minute.
    pub total_max_conn_per_minute: u32,
    /// Max duplex connections within the window.
    pub duplex_max_conn: u32,
    /// Max duplex connections within the last minute.
    pub duplex_max_conn_per_minute: u32,
}

impl DeviceSeed {
    /// A permissive seed: active, every encoding supported, generous
    /// quotas. Tests override only the fields that matter to the scenario.
    #[must_use]
    pub fn new(account_id: impl Into<String>, device_id: impl Into<String>, unique_id: u64) -> Self {
        Self {
            account_id: account_id.into(),
            device_id: device_id.into(),
            unique_id,
            is_active: true,
            supported_encodings: SupportedEncodings::all(),
            limit_time_interval_minutes: 5,
            max_allowed_events: 0,
            total_max_conn: 100,
            total_max_conn_per_minute: 100,
            duplex_max_conn: 100,
            duplex_max_conn_per_minute: 100,
        }
    }

    fn into_identity(self) -> DeviceIdentity {
        DeviceIdentity {
            account_id: self.account_id,
            device_id: self.device_id,
            unique_id: self.unique_id,
            is_active: self.is_active,
            supported_encodings: self.supported_encodings,
            limit_time_interval_minutes: self.limit_time_interval_minutes,
            max_allowed_events: self.max_allowed_events,
            total_profile: ConnectionProfile::new(self.limit_time_interval_minutes),
            total_max_conn: self.total_max_conn,
            total_max_conn_per_minute: self.total_max_conn_per_minute,
            duplex_profile: ConnectionProfile::new(self.limit_time_interval_minutes),
            duplex_max_conn: self.duplex_max_conn,
            duplex_max_conn_per_minute: self.duplex_max_conn_per_minute,
        }
    }
}

type DeviceKey = (String, String);
type TemplateKey = (String, String, u8);
type EventKey = (String, String, u32, u16);

#[derive(Default)]
struct Tables {
    accounts_active: HashMap<String, bool>,
    devices_by_name: HashMap<DeviceKey, DeviceIdentity>,
    devices_by_unique: HashMap<u64, DeviceKey>,
    templates: HashMap<TemplateKey, PayloadTemplate>,
    events: HashMap<EventKey, Event>,
    properties: Vec<(String, String, u16, Vec<u8>)>,
    diagnostics: Vec<(String, String, u16, Vec<u8>)>,
    client_errors: Vec<(String, String, u16)>,
}

/// A single-process, `Mutex`-guarded implementation of every store trait,
/// suitable for integration tests and the `demos/` wiring example. Not
/// durable and not intended for production use.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// An empty store with no accounts, devices, or events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device (and implicitly its account, marked active) for
    /// tests to identify against.
    #[must_use]
    pub fn with_device(self, seed: DeviceSeed) -> Self {
        let mut tables = self.tables.lock();
        let key = (seed.account_id.clone(), seed.device_id.clone());
        tables.accounts_active.insert(seed.account_id.clone(), true);
        tables.devices_by_unique.insert(seed.unique_id, key.clone());
        tables.devices_by_name.insert(key, seed.into_identity());
        drop(tables);
        self
    }

    /// Mark an account inactive, for the `NAK_ACCOUNT_INACTIVE` scenario.
    pub fn deactivate_account(&self, account_id: &str) {
        self.tables.lock().accounts_active.insert(account_id.to_string(), false);
    }

    /// Every event currently stored for `(account, device)`, for test
    /// assertions.
    #[must_use]
    pub fn events_for(&self, account_id: &str, device_id: &str) -> Vec<Event> {
        self.tables
            .lock()
            .events
            .iter()
            .filter(|((a, d, _, _), _)| a == account_id && d == device_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Diagnostic reports recorded so far, for test assertions.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<(String, String, u16, Vec<u8>)> {
        self.tables.lock().diagnostics.clone()
    }
}

impl AccountStore for MemoryStore {
    async fn is_account_active(&self, account_id: &str) -> Result<bool, StoreError> {
        self.tables
            .lock()
            .accounts_active
            .get(account_id)
            .copied()
            .ok_or_else(|| StoreError::AccountNotFound(account_id.to_string()))
    }
}

impl DeviceStore for MemoryStore {
    async fn lookup_by_unique(&self, unique_id: u64) -> Result<DeviceIdentity, StoreError> {
        let tables = self.tables.lock();
        let key = tables.devices_by_unique.get(&unique_id).ok_or(StoreError::DeviceNotFound)?;
        tables.devices_by_name.get(key).cloned().ok_or(StoreError::DeviceNotFound)
    }

    async fn lookup_by_name(&self, account_id: &str, device_id: &str) -> Result<DeviceIdentity, StoreError> {
        if !self.tables.lock().accounts_active.contains_key(account_id) {
            return Err(StoreError::AccountNotFound(account_id.to_string()));
        }
        self.tables
            .lock()
            .devices_by_name
            .get(&(account_id.to_string(), device_id.to_string()))
            .cloned()
            .ok_or(StoreError::DeviceNotFound)
    }

    async fn save_connection_state(&self, identity: &DeviceIdentity) -> Result<(), StoreError> {
        let key = (identity.account_id.clone(), identity.device_id.clone());
        self.tables.lock().devices_by_name.insert(key, identity.clone());
        Ok(())
    }

    async fn supports_encoding(
        &self,
        identity: &DeviceIdentity,
        encoding: SupportedEncodings,
    ) -> Result<bool, StoreError> {
        let tables = self.tables.lock();
        let key = (identity.account_id.clone(), identity.device_id.clone());
        Ok(tables
            .devices_by_name
            .get(&key)
            .is_some_and(|d| d.supported_encodings.intersects(encoding)))
    }

    async fn remove_encoding(&self, identity: &DeviceIdentity, encoding: SupportedEncodings) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let key = (identity.account_id.clone(), identity.device_id.clone());
        if let Some(device) = tables.devices_by_name.get_mut(&key) {
            device.supported_encodings.remove(encoding);
        }
        Ok(())
    }
}

impl TemplateStore for MemoryStore {
    async fn register_template(
        &self,
        account_id: &str,
        device_id: &str,
        custom_type: u8,
        template: PayloadTemplate,
    ) -> Result<(), StoreError> {
        let key = (account_id.to_string(), device_id.to_string(), custom_type);
        self.tables.lock().templates.insert(key, template);
        Ok(())
    }

    async fn lookup_template(
        &self,
        account_id: &str,
        device_id: &str,
        custom_type: u8,
    ) -> Result<Option<PayloadTemplate>, StoreError> {
        let key = (account_id.to_string(), device_id.to_string(), custom_type);
        Ok(self.tables.lock().templates.get(&key).cloned())
    }
}

impl EventStore for MemoryStore {
    async fn count_events(
        &self,
        account_id: &str,
        device_id: &str,
        window_minutes: u8,
        now_sec: u32,
    ) -> Result<u32, StoreError> {
        let from_sec = now_sec.saturating_sub(u32::from(window_minutes) * 60);
        let tables = self.tables.lock();
        Ok(tables
            .events
            .keys()
            .filter(|(a, d, ts, _)| a == account_id && d == device_id && *ts >= from_sec && *ts <= now_sec)
            .count() as u32)
    }

    async fn insert_event(&self, account_id: &str, device_id: &str, event: Event) -> Result<(), StoreError> {
        let (timestamp, status_code) = event.key();
        let key = (account_id.to_string(), device_id.to_string(), timestamp, status_code);
        let mut tables = self.tables.lock();
        if tables.events.contains_key(&key) {
            return Err(StoreError::DuplicateEvent);
        }
        tables.events.insert(key, event);
        Ok(())
    }

    async fn range_events(
        &self,
        account_id: &str,
        device_id: &str,
        from_sec: u32,
        to_sec: u32,
    ) -> Result<Vec<Event>, StoreError> {
        let tables = self.tables.lock();
        let mut events: Vec<_> = tables
            .events
            .iter()
            .filter(|((a, d, ts, _), _)| a == account_id && d == device_id && *ts >= from_sec && *ts < to_sec)
            .map(|(_, event)| event.clone())
            .collect();
        events.sort_by_key(|event| event.timestamp);
        Ok(events)
    }
}

impl DiagnosticSink for MemoryStore {
    async fn record_property(
        &self,
        account_id: &str,
        device_id: &str,
        property_key: u16,
        value: &[u8],
    ) -> Result<(), StoreError> {
        self.tables.lock().properties.push((
            account_id.to_string(),
            device_id.to_string(),
            property_key,
            value.to_vec(),
        ));
        Ok(())
    }

    async fn record_diagnostic(
        &self,
        account_id: &str,
        device_id: &str,
        diagnostic_code: u16,
        value: &[u8],
    ) -> Result<(), StoreError> {
        self.tables.lock().diagnostics.push((
            account_id.to_string(),
            device_id.to_string(),
            diagnostic_code,
            value.to_vec(),
        ));
        Ok(())
    }

    async fn record_client_error(
        &self,
        account_id: &str,
        device_id: &str,
        error_code: u16,
    ) -> Result<(), StoreError> {
        self.tables
            .lock()
            .client_errors
            .push((account_id.to_string(), device_id.to_string(), error_code));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dmtp_protocol::GpsPoint;

    fn sample_event(timestamp: u32) -> Event {
        Event {
            timestamp,
            status_code: 1,
            position: GpsPoint::new(34.0, -118.0),
            speed_kph: 0.0,
            heading_deg: 0.0,
            altitude_m: 0.0,
            distance_km: 0.0,
            top_speed_kph: 0.0,
            geofence_ids: [None, None],
            sequence: None,
            raw: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_lookup_by_unique_finds_seeded_device() {
        let store = MemoryStore::new().with_device(DeviceSeed::new("acct", "dev1", 42));
        let identity = store.lookup_by_unique(42).await.unwrap();
        assert_eq!(identity.device_id, "dev1");
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let store = MemoryStore::new();
        let err = store.lookup_by_name("nope", "dev1").await.unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_event_insert_is_rejected() {
        let store = MemoryStore::new().with_device(DeviceSeed::new("acct", "dev1", 1));
        store.insert_event("acct", "dev1", sample_event(100)).await.unwrap();
        let err = store.insert_event("acct", "dev1", sample_event(100)).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_count_events_respects_window() {
        let store = MemoryStore::new().with_device(DeviceSeed::new("acct", "dev1", 1));
        store.insert_event("acct", "dev1", sample_event(0)).await.unwrap();
        store.insert_event("acct", "dev1", sample_event(10_000)).await.unwrap();
        let count = store.count_events("acct", "dev1", 5, 10_000).await.unwrap();
        assert_eq!(count, 1);
    }
}
