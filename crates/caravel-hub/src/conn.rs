//! Wire connection — a framed ADC duplex with buffered writes.
//!
//! During the handshake the connection is driven whole, request/response
//! style, with a read deadline per expected packet. On admission it is
//! split: the serving loop owns the read half, and the write half moves
//! behind the peer's mutex so fan-out tasks can write without racing.
//!
//! Writes are fed into the frame buffer; nothing reaches the socket until
//! `flush`. This lets the handshake batch a whole roster into one flush.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{Framed, FramedRead, FramedWrite};

use caravel_proto::{
    AdcCodec, BroadcastPacket, DirectPacket, InfoPacket, Message, Packet, Sid,
};

use crate::HubError;

/// Any framed duplex the hub can serve: plain TCP, TLS, or an in-memory
/// pipe in tests.
pub trait Wire: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Wire for T {}

type BoxWire = Box<dyn Wire>;

pub struct Conn {
    framed: Framed<BoxWire, AdcCodec>,
    remote: SocketAddr,
}

impl Conn {
    pub fn new(io: impl Wire + 'static, remote: SocketAddr) -> Conn {
        Conn {
            framed: Framed::new(Box::new(io), AdcCodec),
            remote,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Read the next packet. `deadline` bounds the wait; `None` waits
    /// forever. End-of-stream is a transport error here, since the
    /// handshake always expects a packet.
    pub async fn read_packet(&mut self, deadline: Option<Duration>) -> Result<Packet, HubError> {
        let item = match deadline {
            Some(d) => tokio::time::timeout(d, self.framed.next())
                .await
                .map_err(|_| HubError::Timeout)?,
            None => self.framed.next().await,
        };
        match item {
            Some(Ok(pkt)) => Ok(pkt),
            Some(Err(e)) => Err(e.into()),
            None => Err(HubError::Transport(std::io::ErrorKind::UnexpectedEof.into())),
        }
    }

    pub async fn write_packet(&mut self, pkt: Packet) -> Result<(), HubError> {
        self.framed.feed(pkt).await?;
        Ok(())
    }

    pub async fn write_info_msg<M: Message>(&mut self, msg: &M) -> Result<(), HubError> {
        self.write_packet(Packet::Info(InfoPacket::from_msg(msg))).await
    }

    pub async fn write_broadcast<M: Message>(&mut self, id: Sid, msg: &M) -> Result<(), HubError> {
        self.write_packet(Packet::Broadcast(BroadcastPacket::from_msg(id, msg)))
            .await
    }

    pub async fn write_direct<M: Message>(
        &mut self,
        id: Sid,
        target: Sid,
        msg: &M,
    ) -> Result<(), HubError> {
        self.write_packet(Packet::Direct(DirectPacket::from_msg(id, target, msg)))
            .await
    }

    pub async fn flush(&mut self) -> Result<(), HubError> {
        self.framed.flush().await?;
        Ok(())
    }

    /// Split into an owned read half and a shareable write half. Bytes
    /// already buffered from the socket move to the reader, so nothing a
    /// pipelining client sent during the handshake is lost.
    pub fn split(self) -> (ConnReader, ConnWriter) {
        let parts = self.framed.into_parts();
        let read_buf = parts.read_buf;
        let (r, w) = tokio::io::split(parts.io);
        let mut reader = FramedRead::new(r, AdcCodec);
        *reader.read_buffer_mut() = read_buf;
        (
            ConnReader { inner: reader },
            ConnWriter {
                inner: FramedWrite::new(w, AdcCodec),
            },
        )
    }
}

/// The serving loop's half: a stream of inbound packets.
pub struct ConnReader {
    inner: FramedRead<ReadHalf<BoxWire>, AdcCodec>,
}

impl ConnReader {
    /// Next inbound packet; `None` on clean end-of-stream.
    pub async fn next_packet(&mut self) -> Option<Result<Packet, HubError>> {
        self.inner.next().await.map(|r| r.map_err(HubError::from))
    }
}

/// The peer's half: buffered writes, explicit flush, shutdown on close.
pub struct ConnWriter {
    inner: FramedWrite<WriteHalf<BoxWire>, AdcCodec>,
}

impl ConnWriter {
    pub async fn feed_packet(&mut self, pkt: Packet) -> Result<(), HubError> {
        self.inner.feed(pkt).await?;
        Ok(())
    }

    pub async fn feed_info_msg<M: Message>(&mut self, msg: &M) -> Result<(), HubError> {
        self.feed_packet(Packet::Info(InfoPacket::from_msg(msg))).await
    }

    pub async fn feed_broadcast<M: Message>(&mut self, id: Sid, msg: &M) -> Result<(), HubError> {
        self.feed_packet(Packet::Broadcast(BroadcastPacket::from_msg(id, msg)))
            .await
    }

    pub async fn feed_direct<M: Message>(
        &mut self,
        id: Sid,
        target: Sid,
        msg: &M,
    ) -> Result<(), HubError> {
        self.feed_packet(Packet::Direct(DirectPacket::from_msg(id, target, msg)))
            .await
    }

    pub async fn flush(&mut self) -> Result<(), HubError> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut the transport down. The remote (and our own read half) will
    /// observe end-of-stream.
    pub async fn shutdown(&mut self) -> Result<(), HubError> {
        self.inner.get_mut().shutdown().await?;
        Ok(())
    }
}
