//! Connection handling
//!
//! One `Connection` per live socket: a buffered frame reader on the read
//! half and a shareable writer handle on the write half. The split matters
//! for replication: when a connection serves PSYNC its writer handle is
//! registered with the replication manager for broadcasts, while the read
//! loop here keeps consuming the replica's REPLCONF ACK reports.

use crate::dispatch::Dispatcher;
use crate::protocol::{codec, Frame};
use crate::replication::ReplicaLink;
use crate::server::ServerContext;
use anyhow::bail;
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Who is on the other end of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// An ordinary client issuing requests
    Client,

    /// The primary's replication stream; commands are applied silently
    Primary,
}

/// Connection handler
#[derive(Debug)]
pub struct Connection {
    /// Read half of the socket
    reader: OwnedReadHalf,

    /// Write half, shareable so PSYNC can hand it to the replica set
    writer: Arc<Mutex<OwnedWriteHalf>>,

    /// Read buffer
    buffer: BytesMut,

    /// Whether the peer is a client or the primary's stream
    source: StreamSource,

    /// Peer address, for logging
    peer: SocketAddr,

    /// Set once this connection served a PSYNC and became a replica link
    replica: Option<Arc<ReplicaLink>>,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(socket: TcpStream, peer: SocketAddr, source: StreamSource) -> Self {
        let (reader, writer) = socket.into_split();
        Connection {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            buffer: BytesMut::with_capacity(4096),
            source,
            peer,
            replica: None,
        }
    }

    /// Peer address of this connection
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether incoming data is the primary's replication stream
    pub fn is_primary_stream(&self) -> bool {
        self.source == StreamSource::Primary
    }

    /// Shareable handle to the socket's write half
    pub fn writer_handle(&self) -> Arc<Mutex<OwnedWriteHalf>> {
        self.writer.clone()
    }

    /// The replica link served over this connection, if any
    pub fn replica_link(&self) -> Option<&Arc<ReplicaLink>> {
        self.replica.as_ref()
    }

    /// Mark this connection as an attached replica link
    pub fn attach_replica_link(&mut self, link: Arc<ReplicaLink>) {
        self.replica = Some(link);
    }

    /// Run the read-dispatch loop until the peer goes away.
    ///
    /// A clean EOF between frames is normal termination. Malformed wire
    /// data is logged and closes the connection. If the connection had
    /// become a replica link, the link is detached on the way out.
    pub async fn handle(mut self, ctx: Arc<ServerContext>) -> anyhow::Result<()> {
        let dispatcher = Dispatcher::new(ctx.clone());
        let result = self.run(&dispatcher).await;
        if let Some(link) = self.replica.take() {
            ctx.replication.unregister(&link).await;
        }
        result
    }

    async fn run(&mut self, dispatcher: &Dispatcher) -> anyhow::Result<()> {
        loop {
            match self.read_frame().await {
                Ok(Some(frame)) => {
                    debug!("frame from {}: {}", self.peer, frame);
                    dispatcher.dispatch(self, frame).await?;
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!("closing {} on framing error: {}", self.peer, e);
                    return Ok(());
                }
            }
        }
    }

    /// Read one complete frame.
    ///
    /// Returns Ok(None) on a clean EOF before the first byte of a frame;
    /// an EOF mid-frame is an error.
    pub async fn read_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        loop {
            if let Some(frame) = codec::decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                bail!("connection closed mid-frame");
            }
        }
    }

    /// Consume the PSYNC bootstrap payload: `$<len>\r\n` followed by
    /// exactly `len` raw bytes and no trailing CRLF.
    pub async fn read_snapshot(&mut self) -> anyhow::Result<Bytes> {
        loop {
            if !self.buffer.is_empty() && self.buffer[0] != b'$' {
                bail!(
                    "expected '$' to open the bootstrap payload, got 0x{:02x}",
                    self.buffer[0]
                );
            }
            if let Some(nl) = self.buffer.windows(2).position(|window| window == b"\r\n") {
                let len: usize = std::str::from_utf8(&self.buffer[1..nl])
                    .ok()
                    .and_then(|text| text.parse().ok())
                    .ok_or_else(|| anyhow::anyhow!("bad bootstrap payload length"))?;
                if self.buffer.len() >= nl + 2 + len {
                    self.buffer.advance(nl + 2);
                    return Ok(self.buffer.split_to(len).freeze());
                }
            }

            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                bail!("connection closed while reading the bootstrap payload");
            }
        }
    }

    /// Send a reply, unless this connection is the primary's stream.
    ///
    /// Replies to replicated commands are suppressed; the one exception,
    /// the REPLCONF GETACK answer, goes through `write_frame` directly.
    pub async fn reply(&self, frame: &Frame) -> std::io::Result<()> {
        if self.is_primary_stream() {
            return Ok(());
        }
        self.write_frame(frame).await
    }

    /// Encode and send a frame
    pub async fn write_frame(&self, frame: &Frame) -> std::io::Result<()> {
        let mut buf = BytesMut::with_capacity(64);
        codec::encode_to(&mut buf, frame);
        self.write_raw(&buf).await
    }

    /// Send raw bytes
    pub async fn write_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }
}
