//! Framed packet stream for async I/O.
//!
//! A single task drives one `PacketStream<T>` over a session's whole
//! lifetime; there is no split reader/writer pair here since nothing in
//! this workspace runs the read and write halves of a session on separate
//! tasks.

use std::pin::Pin;
use std::task::{Context, Poll};

use dmtp_protocol::Packet;
use futures_core::Stream;
use futures_util::Sink;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::dmtp_codec::DmtpCodec;
use crate::error::CodecError;

pin_project! {
    /// A framed packet stream over a bidirectional async transport.
    pub struct PacketStream<T> {
        #[pin]
        inner: Framed<T, DmtpCodec>,
    }
}

impl<T> PacketStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Wrap a transport with a fresh, unpinned-encoding codec.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Framed::new(transport, DmtpCodec::new()),
        }
    }

    /// Wrap a transport with a caller-supplied codec (e.g. one with the
    /// encoding already pinned).
    pub fn with_codec(transport: T, codec: DmtpCodec) -> Self {
        Self {
            inner: Framed::new(transport, codec),
        }
    }

    /// Reference to the codec driving this stream.
    pub fn codec(&self) -> &DmtpCodec {
        self.inner.codec()
    }

    /// Mutable reference to the codec, used to pin/downgrade encoding.
    pub fn codec_mut(&mut self) -> &mut DmtpCodec {
        self.inner.codec_mut()
    }

    /// Consume the stream, returning the underlying transport.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Whether any bytes of a not-yet-complete frame are sitting in the
    /// read buffer, i.e. the first byte of a new packet has already
    /// arrived but the rest hasn't. Used to re-bound a stalled read under
    /// a tighter packet-completion timeout rather than the longer
    /// between-packets one.
    #[must_use]
    pub fn has_partial_frame(&self) -> bool {
        !self.inner.read_buffer().is_empty()
    }
}

impl<T> Stream for PacketStream<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Packet, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> Sink<Packet> for PacketStream<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Packet) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

impl<T> std::fmt::Debug for PacketStream<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}

