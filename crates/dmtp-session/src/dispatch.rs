//! The per-packet dispatch logic: identification, rate limiting, event
//! ingestion, and end-of-block acknowledgement.
//!
//! This module is transport-agnostic: it consumes decoded
//! [`dmtp_protocol::Packet`]s and a store handle, and produces response
//! packets plus a flag telling the caller whether to downgrade the
//! session's wire encoding. [`crate::session::Session`] owns the
//! transport and codec and drives this loop.

use std::sync::Arc;

use bytes::Bytes;
use dmtp_protocol::cursor::PayloadReader;
use dmtp_protocol::{
    ClientPacketType, Event, Fletcher16, Packet, PayloadTemplate, Sequence, ServerPacketType,
};
use dmtp_store::{DeviceIdentity, Store};

use crate::nak::NakCode;
use crate::state::SessionState;

/// A client-reported error code meaning "I cannot parse further replies in
/// the current ASCII text encoding" — the trigger for §4.3's encoding
/// downgrade. Client-chosen, distinct from the server's own [`NakCode`]
/// numbering.
pub const CLIENT_ERROR_PACKET_ENCODING: u16 = 0x0001;

/// Outcome of dispatching one packet.
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Response packets to send, in order. Empty for simplex sessions or
    /// packet types that elicit no reply.
    pub packets: Vec<Packet>,
    /// Set when the client reported [`CLIENT_ERROR_PACKET_ENCODING`]: the
    /// caller should downgrade the codec's pinned encoding and remove the
    /// offending encoding from the device's supported set.
    pub downgrade_encoding: bool,
    /// Events newly stored by this dispatch call, for [`crate::stats::SessionStats`].
    pub events_stored: u32,
    /// Events that turned out to be duplicates by this dispatch call.
    pub events_duplicate: u32,
}

impl DispatchResult {
    fn packets(packets: Vec<Packet>) -> Self {
        Self { packets, ..Self::default() }
    }

    fn none() -> Self {
        Self::default()
    }
}

enum InsertOutcome {
    Stored,
    Duplicate,
    QuotaExceeded,
    StoreFailed,
}

/// Drives one session's packets through the identification → block →
/// end-of-block protocol, against a concrete [`Store`] backend.
pub struct Dispatcher<S: Store> {
    store: Arc<S>,
    is_duplex: bool,
    state: SessionState,
    pending_account: Option<String>,
    pending_device: Option<String>,
    identity: Option<DeviceIdentity>,
    fletcher: Fletcher16,
    last_ack: Option<Sequence>,
    any_event_this_block: bool,
    block_poisoned: bool,
    deferred_error: Option<(NakCode, u8)>,
}

impl<S: Store> Dispatcher<S> {
    /// Start a fresh dispatcher in `AWAIT_IDENT`.
    #[must_use]
    pub fn new(store: Arc<S>, is_duplex: bool) -> Self {
        Self {
            store,
            is_duplex,
            state: SessionState::AwaitIdent,
            pending_account: None,
            pending_device: None,
            identity: None,
            fletcher: Fletcher16::new(),
            last_ack: None,
            any_event_this_block: false,
            block_poisoned: false,
            deferred_error: None,
        }
    }

    /// Current FSM state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The resolved device identity, once identification has completed.
    #[must_use]
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Remove `encoding` from the identified device's supported set,
    /// following a session-level downgrade decision. A no-op before
    /// identification completes.
    pub async fn forget_encoding(
        &self,
        encoding: dmtp_protocol::Encoding,
    ) -> Result<(), dmtp_store::StoreError> {
        match &self.identity {
            Some(identity) => self.store.remove_encoding(identity, encoding.as_flag()).await,
            None => Ok(()),
        }
    }

    /// Dispatch one decoded packet, returning the responses to send (if
    /// any) and whether the session must downgrade its wire encoding.
    pub async fn dispatch(&mut self, packet: &Packet, now_sec: u32) -> DispatchResult {
        if self.state.is_terminated() {
            return DispatchResult::none();
        }

        let is_eob = matches!(
            ClientPacketType::from_u8(packet.packet_type),
            Some(t) if t.is_end_of_block()
        );
        if self.is_duplex {
            self.fletcher
                .update(&[dmtp_protocol::BINARY_SENTINEL, packet.packet_type, packet.payload.len() as u8]);
            if !is_eob {
                self.fletcher.update(&packet.payload);
            }
        }

        let Some(kind) = ClientPacketType::from_u8(packet.packet_type) else {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketType, packet.packet_type, &[])]);
        };

        match kind {
            ClientPacketType::UniqueId => self.handle_unique_id(packet, now_sec).await,
            ClientPacketType::AccountId => self.handle_account_id(packet, now_sec).await,
            ClientPacketType::DeviceId => self.handle_device_id(packet, now_sec).await,
            ClientPacketType::PropertyValue => self.handle_property_value(packet).await,
            ClientPacketType::Diagnostic => self.handle_diagnostic(packet).await,
            ClientPacketType::Error => self.handle_client_error(packet).await,
            ClientPacketType::FormatDef24 => self.handle_format_def(packet).await,
            ClientPacketType::Event(event_type) => self.handle_event(event_type, packet, now_sec).await,
            ClientPacketType::EobMore | ClientPacketType::EobDone => {
                DispatchResult::packets(self.handle_end_of_block(kind, packet))
            }
        }
    }

    async fn handle_unique_id(&mut self, packet: &Packet, now_sec: u32) -> DispatchResult {
        if self.state != SessionState::AwaitIdent {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketType, packet.packet_type, &[])]);
        }
        let mut reader = PayloadReader::new(packet.payload.clone());
        let Ok(unique_id) = reader.read_u48() else {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketPayload, packet.packet_type, &[])]);
        };
        match self.store.lookup_by_unique(unique_id).await {
            Ok(identity) => self.finish_identification(identity, now_sec).await,
            Err(_) => {
                self.state = SessionState::Terminated;
                DispatchResult::packets(vec![self.error_packet(NakCode::IdInvalid, packet.packet_type, &[])])
            }
        }
    }

    async fn handle_account_id(&mut self, packet: &Packet, now_sec: u32) -> DispatchResult {
        if self.state != SessionState::AwaitIdent {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketType, packet.packet_type, &[])]);
        }
        let mut reader = PayloadReader::new(packet.payload.clone());
        let Ok(account_id) = reader.read_fixed_string(packet.payload.len()) else {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketPayload, packet.packet_type, &[])]);
        };
        self.pending_account = Some(account_id);
        self.try_resolve_by_name(packet.packet_type, now_sec).await
    }

    async fn handle_device_id(&mut self, packet: &Packet, now_sec: u32) -> DispatchResult {
        if self.state != SessionState::AwaitIdent {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketType, packet.packet_type, &[])]);
        }
        let mut reader = PayloadReader::new(packet.payload.clone());
        let Ok(device_id) = reader.read_fixed_string(packet.payload.len()) else {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketPayload, packet.packet_type, &[])]);
        };
        self.pending_device = Some(device_id);
        self.try_resolve_by_name(packet.packet_type, now_sec).await
    }

    async fn try_resolve_by_name(&mut self, offending_type: u8, now_sec: u32) -> DispatchResult {
        let (Some(account), Some(device)) = (self.pending_account.clone(), self.pending_device.clone())
        else {
            return DispatchResult::none();
        };
        match self.store.lookup_by_name(&account, &device).await {
            Ok(identity) => self.finish_identification(identity, now_sec).await,
            Err(dmtp_store::StoreError::AccountNotFound(_)) => {
                self.state = SessionState::Terminated;
                DispatchResult::packets(vec![self.error_packet(NakCode::AccountInvalid, offending_type, &[])])
            }
            Err(_) => {
                self.state = SessionState::Terminated;
                DispatchResult::packets(vec![self.error_packet(NakCode::DeviceInvalid, offending_type, &[])])
            }
        }
    }

    async fn finish_identification(&mut self, mut identity: DeviceIdentity, now_sec: u32) -> DispatchResult {
        if !identity.is_active {
            self.state = SessionState::Terminated;
            return DispatchResult::packets(vec![self.error_packet(NakCode::DeviceInactive, 0, &[])]);
        }
        if !identity.mark_and_validate(self.is_duplex, now_sec) {
            self.state = SessionState::Terminated;
            return DispatchResult::packets(vec![
                self.error_packet(NakCode::ExcessiveConnections, 0, &[])
            ]);
        }
        let _ = self.store.save_connection_state(&identity).await;
        self.identity = Some(identity);
        self.state = SessionState::Identified;
        DispatchResult::none()
    }

    async fn handle_property_value(&mut self, packet: &Packet) -> DispatchResult {
        if let Some(identity) = self.identity.clone() {
            if packet.payload.len() >= 2 {
                let key = u16::from_be_bytes([packet.payload[0], packet.payload[1]]);
                let value = &packet.payload[2..];
                let _ = self
                    .store
                    .record_property(&identity.account_id, &identity.device_id, key, value)
                    .await;
            }
        }
        DispatchResult::none()
    }

    async fn handle_diagnostic(&mut self, packet: &Packet) -> DispatchResult {
        if let Some(identity) = self.identity.clone() {
            if packet.payload.len() >= 2 {
                let code = u16::from_be_bytes([packet.payload[0], packet.payload[1]]);
                let value = &packet.payload[2..];
                let _ = self
                    .store
                    .record_diagnostic(&identity.account_id, &identity.device_id, code, value)
                    .await;
            }
        }
        DispatchResult::none()
    }

    async fn handle_client_error(&mut self, packet: &Packet) -> DispatchResult {
        let Some(identity) = self.identity.clone() else {
            return DispatchResult::none();
        };
        if packet.payload.len() < 2 {
            return DispatchResult::none();
        }
        let code = u16::from_be_bytes([packet.payload[0], packet.payload[1]]);
        let _ = self
            .store
            .record_client_error(&identity.account_id, &identity.device_id, code)
            .await;
        DispatchResult {
            downgrade_encoding: code == CLIENT_ERROR_PACKET_ENCODING,
            ..DispatchResult::none()
        }
    }

    async fn handle_format_def(&mut self, packet: &Packet) -> DispatchResult {
        let Some(identity) = self.identity.clone() else {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketType, packet.packet_type, &[])]);
        };
        let mut reader = PayloadReader::new(packet.payload.clone());
        let parsed = (|| -> Result<(u8, PayloadTemplate), ()> {
            let custom_type = reader.read_u8().map_err(|_| ())?;
            let field_count = reader.read_u8().map_err(|_| ())?;
            let mut fields = Vec::with_capacity(field_count as usize);
            for index in 0..field_count {
                let type_byte = reader.read_u8().map_err(|_| ())?;
                let length = reader.read_u8().map_err(|_| ())?;
                let field_type = dmtp_protocol::FieldType::from_u8(type_byte).ok_or(())?;
                fields.push(dmtp_protocol::Field { field_type, index, length });
            }
            Ok((custom_type, PayloadTemplate::new(fields)))
        })();

        match parsed {
            Ok((custom_type, template))
                if (dmtp_protocol::CUSTOM_EVENT_MIN..=dmtp_protocol::CUSTOM_EVENT_MAX).contains(&custom_type)
                    && template.is_valid() =>
            {
                let result = self
                    .store
                    .register_template(&identity.account_id, &identity.device_id, custom_type, template)
                    .await;
                if result.is_err() {
                    return DispatchResult::packets(vec![
                        self.error_packet(NakCode::FormatDefinitionInvalid, packet.packet_type, &[])
                    ]);
                }
                DispatchResult::none()
            }
            _ => DispatchResult::packets(vec![
                self.error_packet(NakCode::FormatDefinitionInvalid, packet.packet_type, &[])
            ]),
        }
    }

    async fn handle_event(&mut self, event_type: u8, packet: &Packet, now_sec: u32) -> DispatchResult {
        let Some(identity) = self.identity.clone() else {
            return DispatchResult::packets(vec![self.error_packet(NakCode::PacketType, packet.packet_type, &[])]);
        };
        if matches!(self.state, SessionState::Identified | SessionState::AwaitEobAck) {
            self.state = SessionState::InBlock;
        }
        self.any_event_this_block = true;

        if self.block_poisoned {
            return DispatchResult::none();
        }

        let is_custom = (dmtp_protocol::CUSTOM_EVENT_MIN..=dmtp_protocol::CUSTOM_EVENT_MAX).contains(&event_type);
        let event = if is_custom {
            match self.decode_custom_event(&identity, event_type, &packet.payload, now_sec).await {
                Some(event) => event,
                None => {
                    self.deferred_error = Some((NakCode::EventError, packet.packet_type));
                    self.block_poisoned = true;
                    return DispatchResult::none();
                }
            }
        } else {
            match Event::decode(&packet.payload) {
                Ok(event) => event,
                Err(_) => {
                    self.deferred_error = Some((NakCode::PacketPayload, packet.packet_type));
                    self.block_poisoned = true;
                    return DispatchResult::none();
                }
            }
        };

        let mut result = DispatchResult::none();
        match self.insert_event(&identity, event.clone(), now_sec).await {
            InsertOutcome::Stored => {
                self.last_ack = Some(event.sequence.unwrap_or(Sequence { number: 0, width: 1 }));
                result.events_stored = 1;
            }
            InsertOutcome::Duplicate => {
                self.last_ack = Some(event.sequence.unwrap_or(Sequence { number: 0, width: 1 }));
                result.events_duplicate = 1;
            }
            InsertOutcome::QuotaExceeded => {
                self.deferred_error = Some((NakCode::ExcessiveEvents, packet.packet_type));
                self.block_poisoned = true;
            }
            InsertOutcome::StoreFailed => {
                self.deferred_error = Some((NakCode::EventError, packet.packet_type));
                self.block_poisoned = true;
            }
        }
        result
    }

    async fn decode_custom_event(
        &self,
        identity: &DeviceIdentity,
        event_type: u8,
        payload: &Bytes,
        now_sec: u32,
    ) -> Option<Event> {
        let template = self
            .store
            .lookup_template(&identity.account_id, &identity.device_id, event_type)
            .await
            .ok()
            .flatten()?;
        let values = template.decode(payload).ok()?;
        let position = values.iter().find_map(dmtp_protocol::FieldValue::as_gps_point)?;
        Some(Event {
            timestamp: now_sec,
            status_code: 0xE000 | u16::from(event_type),
            position,
            speed_kph: 0.0,
            heading_deg: 0.0,
            altitude_m: 0.0,
            distance_km: 0.0,
            top_speed_kph: 0.0,
            geofence_ids: [None, None],
            sequence: None,
            raw: payload.to_vec(),
        })
    }

    async fn insert_event(&self, identity: &DeviceIdentity, event: Event, now_sec: u32) -> InsertOutcome {
        if identity.max_allowed_events > 0 {
            match self
                .store
                .count_events(
                    &identity.account_id,
                    &identity.device_id,
                    identity.limit_time_interval_minutes,
                    now_sec,
                )
                .await
            {
                Ok(count) if count >= identity.max_allowed_events => return InsertOutcome::QuotaExceeded,
                Ok(_) => {}
                Err(_) => return InsertOutcome::StoreFailed,
            }
        }
        match self.store.insert_event(&identity.account_id, &identity.device_id, event).await {
            Ok(()) => InsertOutcome::Stored,
            Err(e) if e.is_duplicate() => InsertOutcome::Duplicate,
            Err(_) => InsertOutcome::StoreFailed,
        }
    }

    fn handle_end_of_block(&mut self, kind: ClientPacketType, packet: &Packet) -> Vec<Packet> {
        let checksum_ok = match packet.payload.len() {
            0 => true,
            2 => self.fletcher.is_valid(packet.payload[0], packet.payload[1]),
            _ => false,
        };
        self.fletcher.reset();

        let mut responses = Vec::new();
        if self.any_event_this_block {
            if checksum_ok {
                responses.push(self.ack_packet());
            } else {
                let code = if packet.payload.len() == 2 {
                    NakCode::BlockChecksum
                } else {
                    NakCode::PacketPayload
                };
                responses.push(self.error_packet(code, packet.packet_type, &[]));
            }
            if let Some((code, offending)) = self.deferred_error.take() {
                responses.push(self.error_packet(code, offending, &[]));
            }
        }

        if kind == ClientPacketType::EobDone {
            responses.push(Packet::new(ServerPacketType::Eot.to_u8(), Bytes::new()));
            self.state = SessionState::Terminated;
        } else {
            responses.push(Packet::new(ServerPacketType::Eob.to_u8(), Bytes::new()));
            self.state = if self.is_duplex { SessionState::AwaitEobAck } else { SessionState::Identified };
        }

        self.any_event_this_block = false;
        self.block_poisoned = false;
        self.deferred_error = None;
        responses
    }

    fn ack_packet(&self) -> Packet {
        let sequence = self.last_ack.unwrap_or(Sequence { number: 0, width: 1 });
        let mut payload = Vec::with_capacity(1 + sequence.width as usize);
        payload.push(sequence.width);
        for shift in (0..sequence.width).rev() {
            payload.push((sequence.number >> (shift * 8)) as u8);
        }
        Packet::new(ServerPacketType::Ack.to_u8(), Bytes::from(payload))
    }

    fn error_packet(&self, code: NakCode, offending_type: u8, context: &[u8]) -> Packet {
        let mut payload = Vec::with_capacity(3 + context.len());
        payload.extend_from_slice(&code.code().to_be_bytes());
        payload.push(offending_type);
        payload.extend_from_slice(context);
        Packet::new(ServerPacketType::Error.to_u8(), Bytes::from(payload))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dmtp_protocol::{Field, FieldType, GpsPoint, PayloadTemplate};
    use dmtp_store::TemplateStore;
    use dmtp_testing::{DeviceSeed, MemoryStore};

    const NOW: u32 = 1_700_000_000;

    fn unique_id_packet(unique_id: u64) -> Packet {
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&unique_id.to_be_bytes()[2..]);
        Packet::new(ClientPacketType::UniqueId.to_u8(), Bytes::from(payload))
    }

    fn account_packet(account_id: &str) -> Packet {
        Packet::new(ClientPacketType::AccountId.to_u8(), Bytes::copy_from_slice(account_id.as_bytes()))
    }

    fn device_packet(device_id: &str) -> Packet {
        Packet::new(ClientPacketType::DeviceId.to_u8(), Bytes::copy_from_slice(device_id.as_bytes()))
    }

    fn sample_event() -> Event {
        Event {
            timestamp: NOW,
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

    fn event_packet(event_type: u8, event: &Event) -> Packet {
        Packet::new(event_type, event.encode().unwrap())
    }

    fn eob_packet(done: bool) -> Packet {
        let kind = if done { ClientPacketType::EobDone } else { ClientPacketType::EobMore };
        Packet::new(kind.to_u8(), Bytes::new())
    }

    #[tokio::test]
    async fn test_unique_id_identifies_and_moves_to_identified() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 7)));
        let mut dispatcher = Dispatcher::new(store, true);

        let result = dispatcher.dispatch(&unique_id_packet(7), NOW).await;
        assert!(result.packets.is_empty());
        assert_eq!(dispatcher.state(), SessionState::Identified);
        assert_eq!(dispatcher.identity().unwrap().device_id, "m1");
    }

    #[tokio::test]
    async fn test_account_id_alone_does_not_identify() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
        let mut dispatcher = Dispatcher::new(store, true);

        let result = dispatcher.dispatch(&account_packet("demo"), NOW).await;
        assert!(result.packets.is_empty());
        assert_eq!(dispatcher.state(), SessionState::AwaitIdent);
    }

    #[tokio::test]
    async fn test_account_then_device_identifies() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
        let mut dispatcher = Dispatcher::new(store, true);

        dispatcher.dispatch(&account_packet("demo"), NOW).await;
        let result = dispatcher.dispatch(&device_packet("m1"), NOW).await;
        assert!(result.packets.is_empty());
        assert_eq!(dispatcher.state(), SessionState::Identified);
    }

    #[tokio::test]
    async fn test_unknown_unique_id_terminates_with_id_invalid() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = Dispatcher::new(store, true);

        let result = dispatcher.dispatch(&unique_id_packet(99), NOW).await;
        assert_eq!(result.packets.len(), 1);
        let code = u16::from_be_bytes([result.packets[0].payload[0], result.packets[0].payload[1]]);
        assert_eq!(code, NakCode::IdInvalid.code());
        assert!(dispatcher.state().is_terminated());
    }

    #[tokio::test]
    async fn test_inactive_device_terminates_with_device_inactive() {
        let mut seed = DeviceSeed::new("demo", "m1", 1);
        seed.is_active = false;
        let store = Arc::new(MemoryStore::new().with_device(seed));
        let mut dispatcher = Dispatcher::new(store, true);

        let result = dispatcher.dispatch(&unique_id_packet(1), NOW).await;
        let code = u16::from_be_bytes([result.packets[0].payload[0], result.packets[0].payload[1]]);
        assert_eq!(code, NakCode::DeviceInactive.code());
        assert!(dispatcher.state().is_terminated());
    }

    #[tokio::test]
    async fn test_second_connection_within_the_minute_is_denied() {
        let mut seed = DeviceSeed::new("demo", "m1", 1);
        seed.total_max_conn_per_minute = 1;
        let store = Arc::new(MemoryStore::new().with_device(seed));

        let mut first = Dispatcher::new(store.clone(), true);
        first.dispatch(&unique_id_packet(1), NOW).await;
        assert_eq!(first.state(), SessionState::Identified);

        let mut second = Dispatcher::new(store, true);
        let result = second.dispatch(&unique_id_packet(1), NOW).await;
        let code = u16::from_be_bytes([result.packets[0].payload[0], result.packets[0].payload[1]]);
        assert_eq!(code, NakCode::ExcessiveConnections.code());
    }

    #[tokio::test]
    async fn test_event_then_eob_done_acks_and_closes_session() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
        let mut dispatcher = Dispatcher::new(store.clone(), true);
        dispatcher.dispatch(&unique_id_packet(1), NOW).await;

        let event = sample_event();
        let stored = dispatcher.dispatch(&event_packet(0xC5, &event), NOW).await;
        assert_eq!(stored.events_stored, 1);

        let eob = dispatcher.dispatch(&eob_packet(true), NOW).await;
        assert_eq!(eob.packets.len(), 2);
        assert_eq!(eob.packets[0].packet_type, ServerPacketType::Ack.to_u8());
        assert_eq!(eob.packets[1].packet_type, ServerPacketType::Eot.to_u8());
        assert!(dispatcher.state().is_terminated());
        assert_eq!(store.events_for("demo", "m1").len(), 1);
    }

    #[tokio::test]
    async fn test_block_checksum_mismatch_naks_but_keeps_stored_event() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
        let mut dispatcher = Dispatcher::new(store.clone(), true);
        dispatcher.dispatch(&unique_id_packet(1), NOW).await;
        dispatcher.dispatch(&event_packet(0xC5, &sample_event()), NOW).await;

        let bad_checksum = Packet::new(ClientPacketType::EobDone.to_u8(), Bytes::from_static(&[0xDE, 0xAD]));
        let result = dispatcher.dispatch(&bad_checksum, NOW).await;
        assert_eq!(result.packets[0].packet_type, ServerPacketType::Error.to_u8());
        let code = u16::from_be_bytes([result.packets[0].payload[0], result.packets[0].payload[1]]);
        assert_eq!(code, NakCode::BlockChecksum.code());
        assert_eq!(store.events_for("demo", "m1").len(), 1);
    }

    #[tokio::test]
    async fn test_quota_exceeded_defers_error_to_end_of_block() {
        let mut seed = DeviceSeed::new("demo", "m1", 1);
        seed.max_allowed_events = 1;
        let store = Arc::new(MemoryStore::new().with_device(seed));
        let mut dispatcher = Dispatcher::new(store.clone(), true);
        dispatcher.dispatch(&unique_id_packet(1), NOW).await;

        let first = sample_event();
        let mut second = sample_event();
        second.status_code = 2;

        let first_result = dispatcher.dispatch(&event_packet(0xC5, &first), NOW).await;
        assert_eq!(first_result.events_stored, 1);
        let second_result = dispatcher.dispatch(&event_packet(0xC5, &second), NOW).await;
        assert_eq!(second_result.events_stored, 0);
        assert_eq!(second_result.events_duplicate, 0);

        let eob = dispatcher.dispatch(&eob_packet(true), NOW).await;
        assert_eq!(eob.packets.len(), 3);
        assert_eq!(eob.packets[0].packet_type, ServerPacketType::Ack.to_u8());
        assert_eq!(eob.packets[1].packet_type, ServerPacketType::Error.to_u8());
        let code = u16::from_be_bytes([eob.packets[1].payload[0], eob.packets[1].payload[1]]);
        assert_eq!(code, NakCode::ExcessiveEvents.code());
        assert_eq!(eob.packets[2].packet_type, ServerPacketType::Eot.to_u8());
        assert_eq!(store.events_for("demo", "m1").len(), 1);
    }

    #[tokio::test]
    async fn test_custom_event_decodes_via_registered_template() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
        let mut dispatcher = Dispatcher::new(store.clone(), true);
        dispatcher.dispatch(&unique_id_packet(1), NOW).await;

        let template = PayloadTemplate::new(vec![Field {
            field_type: FieldType::GpsPointStandard,
            index: 1,
            length: 6,
        }]);
        store
            .register_template("demo", "m1", 0xE5, template)
            .await
            .unwrap();

        let point = GpsPoint::new(10.0, -20.0);
        let payload = Bytes::copy_from_slice(&point.encode_standard());
        let result = dispatcher.dispatch(&Packet::new(0xE5, payload), NOW).await;
        assert_eq!(result.events_stored, 1);
        assert_eq!(store.events_for("demo", "m1").len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_custom_event_defers_event_error() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
        let mut dispatcher = Dispatcher::new(store.clone(), true);
        dispatcher.dispatch(&unique_id_packet(1), NOW).await;

        let result = dispatcher.dispatch(&Packet::new(0xE5, Bytes::from_static(b"??????")), NOW).await;
        assert_eq!(result.packets.len(), 0);

        let eob = dispatcher.dispatch(&eob_packet(false), NOW).await;
        assert_eq!(eob.packets[0].packet_type, ServerPacketType::Error.to_u8());
        let code = u16::from_be_bytes([eob.packets[0].payload[0], eob.packets[0].payload[1]]);
        assert_eq!(code, NakCode::EventError.code());
        assert_eq!(eob.packets[1].packet_type, ServerPacketType::Eob.to_u8());
    }

    #[tokio::test]
    async fn test_client_error_packet_encoding_requests_downgrade() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
        let mut dispatcher = Dispatcher::new(store, true);
        dispatcher.dispatch(&unique_id_packet(1), NOW).await;

        let mut payload = Vec::new();
        payload.extend_from_slice(&CLIENT_ERROR_PACKET_ENCODING.to_be_bytes());
        let result = dispatcher
            .dispatch(&Packet::new(ClientPacketType::Error.to_u8(), Bytes::from(payload)), NOW)
            .await;
        assert!(result.downgrade_encoding);
        assert!(result.packets.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_packet_type_naks_without_terminating() {
        let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
        let mut dispatcher = Dispatcher::new(store, true);
        dispatcher.dispatch(&unique_id_packet(1), NOW).await;

        let result = dispatcher.dispatch(&Packet::new(0x99, Bytes::new()), NOW).await;
        let code = u16::from_be_bytes([result.packets[0].payload[0], result.packets[0].payload[1]]);
        assert_eq!(code, NakCode::PacketType.code());
        assert!(!dispatcher.state().is_terminated());
    }
}
