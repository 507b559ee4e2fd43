//! One attached replica link

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

/// The persistent connection between the primary and one attached replica.
///
/// Holds a shared handle to the socket's write half (the connection task
/// keeps the read half to consume REPLCONF ACK reports) and the highest
/// offset the replica has acknowledged so far.
#[derive(Debug)]
pub struct ReplicaLink {
    peer: SocketAddr,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    acked_offset: AtomicU64,
}

impl ReplicaLink {
    /// Create a link around the write half of a connection that served PSYNC
    pub fn new(writer: Arc<Mutex<OwnedWriteHalf>>, peer: SocketAddr) -> Self {
        ReplicaLink {
            peer,
            writer,
            acked_offset: AtomicU64::new(0),
        }
    }

    /// Address of the replica behind this link
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Highest offset the replica has acknowledged
    pub fn acked_offset(&self) -> u64 {
        self.acked_offset.load(Ordering::Acquire)
    }

    /// Record a REPLCONF ACK received over this link. Acknowledgments only
    /// ever move the recorded offset forward.
    pub fn record_ack(&self, offset: u64) {
        self.acked_offset.fetch_max(offset, Ordering::AcqRel);
    }

    /// Write raw bytes to the replica
    pub async fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_link() -> (ReplicaLink, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        let (_, writer) = server.into_split();
        (ReplicaLink::new(Arc::new(Mutex::new(writer)), peer), client)
    }

    #[tokio::test]
    async fn test_acks_are_monotonic() {
        let (link, _client) = loopback_link().await;

        assert_eq!(link.acked_offset(), 0);
        link.record_ack(42);
        assert_eq!(link.acked_offset(), 42);
        link.record_ack(17);
        assert_eq!(link.acked_offset(), 42);
        link.record_ack(100);
        assert_eq!(link.acked_offset(), 100);
    }

    #[tokio::test]
    async fn test_send_reaches_the_peer() {
        use tokio::io::AsyncReadExt;

        let (link, mut client) = loopback_link().await;
        link.send(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        let mut buf = [0_u8; 14];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"*1\r\n$4\r\nPING\r\n");
    }
}
