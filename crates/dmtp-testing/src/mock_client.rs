//! A wire-level client harness for driving a [`dmtp_server::Listener`]
//! under test.
//!
//! Role-inverted from `mssql-testing::mock_server`: that file plays the
//! server side of a handshake against a client library under test; here
//! [`MockClient`] plays the device side of a session against our server.
//! The manual `PacketStream` send/recv shape is the same one
//! `dmtp-codec`/`dmtp-session` already use; this just gives tests a named
//! place to build identification/event/EOB packets without repeating
//! byte layout at every call site.

use bytes::{BufMut, Bytes, BytesMut};
use dmtp_codec::{CodecError, PacketStream};
use dmtp_protocol::{ClientPacketType, Event, Packet};
use tokio::net::{TcpStream, UdpSocket};

/// A duplex (TCP) client session for integration tests.
pub struct MockClient {
    stream: PacketStream<TcpStream>,
}

impl MockClient {
    /// Connect to `addr` with no encoding pinned; the first packet sent
    /// determines binary vs. ASCII framing, matching a real device.
    pub async fn connect(addr: std::net::SocketAddr) -> std::io::Result<Self> {
        let transport = TcpStream::connect(addr).await?;
        Ok(Self { stream: PacketStream::new(transport) })
    }

    /// Send a packet.
    pub async fn send(&mut self, packet: Packet) -> Result<(), CodecError> {
        use futures_util::SinkExt;
        self.stream.send(packet).await
    }

    /// Force the client's own outbound encoding, for tests that need to
    /// start a session in a specific ASCII sub-encoding (a real device
    /// decides this the same way: by what it sends first).
    pub fn pin_encoding(&mut self, encoding: dmtp_protocol::Encoding) {
        self.stream.codec_mut().set_encoding(encoding);
    }

    /// Receive the next packet, or `None` if the server closed the
    /// connection.
    pub async fn recv(&mut self) -> Option<Result<Packet, CodecError>> {
        use futures_util::StreamExt;
        self.stream.next().await
    }

    /// Identify by 48-bit unique id.
    pub async fn identify_unique(&mut self, unique_id: u64) -> Result<(), CodecError> {
        let mut payload = BytesMut::new();
        payload.put_uint(unique_id, 6);
        self.send(Packet::new(ClientPacketType::UniqueId.to_u8(), payload.freeze())).await
    }

    /// Identify by (account, device) name pair: two packets, account then
    /// device, per §4.3.
    pub async fn identify_by_name(&mut self, account_id: &str, device_id: &str) -> Result<(), CodecError> {
        self.send(Packet::new(ClientPacketType::AccountId.to_u8(), Bytes::copy_from_slice(account_id.as_bytes())))
            .await?;
        self.send(Packet::new(ClientPacketType::DeviceId.to_u8(), Bytes::copy_from_slice(device_id.as_bytes())))
            .await
    }

    /// Send a standard-range event.
    pub async fn send_event(&mut self, event_type: u8, event: &Event) -> Result<(), CodecError> {
        let payload = event.encode().expect("event within payload length bounds");
        self.send(Packet::new(event_type, payload)).await
    }

    /// Send `EOB_MORE` (more blocks to follow) or `EOB_DONE` (final block),
    /// with an optional checksum-carrying payload length (0 or 2 bytes;
    /// the caller is responsible for matching what the session's Fletcher
    /// state actually computed).
    pub async fn send_end_of_block(&mut self, done: bool, checksum: Option<u16>) -> Result<(), CodecError> {
        let mut payload = BytesMut::new();
        if let Some(cksum) = checksum {
            payload.put_u16(cksum);
        }
        let packet_type =
            if done { ClientPacketType::EobDone.to_u8() } else { ClientPacketType::EobMore.to_u8() };
        self.send(Packet::new(packet_type, payload.freeze())).await
    }
}

/// Send a one-shot UDP datagram containing one or more already-encoded
/// packets, simulating a simplex device.
pub async fn send_udp_datagram(
    local_addr: std::net::SocketAddr,
    server_addr: std::net::SocketAddr,
    packets: &[Packet],
) -> std::io::Result<()> {
    use dmtp_codec::DmtpCodec;
    use tokio_util::codec::Encoder;

    let socket = UdpSocket::bind(local_addr).await?;
    let mut codec = DmtpCodec::new();
    let mut buf = BytesMut::new();
    for packet in packets {
        codec.encode(packet.clone(), &mut buf).map_err(std::io::Error::other)?;
    }
    socket.send_to(&buf, server_addr).await?;
    Ok(())
}
