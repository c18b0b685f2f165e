//! The six literal end-to-end scenarios a compliant server must satisfy,
//! run against a real [`dmtp_server::Listener`] over loopback sockets with
//! an in-memory store.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use dmtp_protocol::{ClientPacketType, Encoding, Event, Fletcher16, GpsPoint, Packet, ServerPacketType, SupportedEncodings};
use dmtp_server::{Listener, ListenerConfig};
use dmtp_session::NakCode;
use dmtp_testing::{send_udp_datagram, DeviceSeed, MemoryStore, MockClient};
use std::sync::Arc;

const STANDARD_EVENT_TYPE: u8 = 0xC5;

async fn start_listener(store: Arc<MemoryStore>) -> (Listener, SocketAddr, SocketAddr) {
    let listener = Listener::start(ListenerConfig::new(0), store).await.expect("listener binds");
    let tcp_addr = listener.tcp_addr();
    let udp_addr = listener.udp_addr();
    (listener, tcp_addr, udp_addr)
}

fn sample_event() -> Event {
    Event {
        timestamp: 0x6500_0000,
        status_code: 0xF020,
        position: GpsPoint::new(34.05, -118.25),
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

/// Mirror `Dispatcher::dispatch`'s checksum feeding: header bytes of every
/// packet in the block, payload bytes except for the closing EOB packet.
fn expected_block_checksum(packets: &[(u8, Vec<u8>)], eob_type: u8, eob_payload_len: u8) -> (u8, u8) {
    let mut fletcher = Fletcher16::new();
    for (packet_type, payload) in packets {
        fletcher.update(&[dmtp_protocol::BINARY_SENTINEL, *packet_type, payload.len() as u8]);
        fletcher.update(payload);
    }
    fletcher.update(&[dmtp_protocol::BINARY_SENTINEL, eob_type, eob_payload_len]);
    fletcher.checksum()
}

async fn find_error(client: &mut MockClient) -> Packet {
    loop {
        match client.recv().await {
            Some(Ok(packet)) if packet.packet_type == ServerPacketType::Error.to_u8() => return packet,
            Some(Ok(_)) => continue,
            Some(Err(err)) => panic!("codec error waiting for ERROR packet: {err}"),
            None => panic!("connection closed before an ERROR packet arrived"),
        }
    }
}

#[tokio::test]
async fn scenario_1_happy_path_duplex_binary_one_event() {
    let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
    let (_listener, tcp_addr, _udp_addr) = start_listener(store.clone()).await;

    let mut client = MockClient::connect(tcp_addr).await.expect("connects");
    client.identify_by_name("demo", "m1").await.expect("sends identification");

    let event = sample_event();
    let event_payload = event.encode().expect("event encodes").to_vec();
    client.send_event(STANDARD_EVENT_TYPE, &event).await.expect("sends event");

    let account_payload = b"demo".to_vec();
    let device_payload = b"m1".to_vec();
    let eob_type = ClientPacketType::EobDone.to_u8();
    let (f0, f1) = expected_block_checksum(
        &[
            (ClientPacketType::AccountId.to_u8(), account_payload),
            (ClientPacketType::DeviceId.to_u8(), device_payload),
            (STANDARD_EVENT_TYPE, event_payload),
        ],
        eob_type,
        2,
    );
    client
        .send_end_of_block(true, Some(u16::from_be_bytes([f0, f1])))
        .await
        .expect("sends EOB_DONE");

    let ack = client.recv().await.expect("ack arrives").expect("ack decodes");
    assert_eq!(ack.packet_type, ServerPacketType::Ack.to_u8());

    let eot = client.recv().await.expect("eot arrives").expect("eot decodes");
    assert_eq!(eot.packet_type, ServerPacketType::Eot.to_u8());

    let stored = store.events_for("demo", "m1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].timestamp, 0x6500_0000);
}

#[tokio::test]
async fn scenario_2_unknown_device_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let (_listener, tcp_addr, _udp_addr) = start_listener(store).await;

    let mut client = MockClient::connect(tcp_addr).await.expect("connects");
    client.identify_unique(0x0000_0000_0001).await.expect("sends unique id");

    let error = find_error(&mut client).await;
    let code = u16::from_be_bytes([error.payload[0], error.payload[1]]);
    assert_eq!(code, NakCode::IdInvalid.code());

    assert!(client.recv().await.is_none(), "session must close after a terminating NAK");
}

#[tokio::test]
async fn scenario_3_excessive_connections_denies_a_third_connection() {
    let mut seed = DeviceSeed::new("demo", "m1", 1);
    seed.total_max_conn_per_minute = 1;
    let store = Arc::new(MemoryStore::new().with_device(seed));
    let (_listener, tcp_addr, _udp_addr) = start_listener(store.clone()).await;

    let mut first = MockClient::connect(tcp_addr).await.expect("connects");
    first.identify_by_name("demo", "m1").await.expect("sends identification");
    // Drive the first session to a clean identified state before opening a second.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = MockClient::connect(tcp_addr).await.expect("connects");
    second.identify_by_name("demo", "m1").await.expect("sends identification");

    let error = find_error(&mut second).await;
    let code = u16::from_be_bytes([error.payload[0], error.payload[1]]);
    assert_eq!(code, NakCode::ExcessiveConnections.code());
}

#[tokio::test]
async fn scenario_4_block_checksum_mismatch_still_stores_the_event() {
    let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
    let (_listener, tcp_addr, _udp_addr) = start_listener(store.clone()).await;

    let mut client = MockClient::connect(tcp_addr).await.expect("connects");
    client.identify_by_name("demo", "m1").await.expect("sends identification");

    let event = sample_event();
    client.send_event(STANDARD_EVENT_TYPE, &event).await.expect("sends event");
    // Deliberately wrong checksum bytes.
    client.send_end_of_block(true, Some(0xDEAD)).await.expect("sends EOB_DONE");

    let error = find_error(&mut client).await;
    let code = u16::from_be_bytes([error.payload[0], error.payload[1]]);
    assert_eq!(code, NakCode::BlockChecksum.code());

    let stored = store.events_for("demo", "m1");
    assert_eq!(stored.len(), 1, "event insertion precedes checksum evaluation");
}

#[tokio::test]
async fn scenario_5_encoding_downgrade_clears_the_supported_bit() {
    let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
    let (_listener, tcp_addr, _udp_addr) = start_listener(store.clone()).await;

    let mut client = MockClient::connect(tcp_addr).await.expect("connects");
    client.pin_encoding(Encoding::HexCksum);
    client.identify_by_name("demo", "m1").await.expect("sends ASCII+CKSUM identification");

    let mut error_payload = bytes::BytesMut::new();
    error_payload.extend_from_slice(&dmtp_session::dispatch::CLIENT_ERROR_PACKET_ENCODING.to_be_bytes());
    client
        .send(Packet::new(ClientPacketType::Error.to_u8(), error_payload.freeze()))
        .await
        .expect("reports encoding error");

    tokio::time::sleep(Duration::from_millis(50)).await;

    let identity = dmtp_store::DeviceStore::lookup_by_name(store.as_ref(), "demo", "m1")
        .await
        .expect("device still resolves");
    assert!(!identity.supported_encodings.contains(SupportedEncodings::HEX_CKSUM));
}

#[tokio::test]
async fn scenario_6_simplex_udp_four_events_no_end_of_block() {
    let store = Arc::new(MemoryStore::new().with_device(DeviceSeed::new("demo", "m1", 1)));
    let (_listener, _tcp_addr, udp_addr) = start_listener(store.clone()).await;

    let mut packets = vec![
        Packet::new(ClientPacketType::AccountId.to_u8(), Bytes::from_static(b"demo")),
        Packet::new(ClientPacketType::DeviceId.to_u8(), Bytes::from_static(b"m1")),
    ];
    for i in 0..4u32 {
        let mut event = sample_event();
        event.timestamp += i;
        let payload = event.encode().expect("event encodes");
        packets.push(Packet::new(STANDARD_EVENT_TYPE, payload));
    }

    send_udp_datagram("127.0.0.1:0".parse().unwrap(), udp_addr, &packets)
        .await
        .expect("sends datagram");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let stored = store.events_for("demo", "m1");
    assert_eq!(stored.len(), 4);
}
