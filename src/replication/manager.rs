//! Primary-side replication state

use super::link::ReplicaLink;
use crate::protocol::codec;
use bytes::Bytes;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How often WAIT refreshes acknowledgment offsets while blocked.
/// The upstream protocol leaves the cadence open; a short poll keeps the
/// barrier responsive without flooding the links.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Replication state owned by a primary
///
/// The replication ID is generated once and stable for the process
/// lifetime. The offset counts the encoded bytes of every propagated
/// write command. The link collection is appended by PSYNC handling and
/// iterated by propagation, so it lives behind a lock.
pub struct ReplicationManager {
    replication_id: String,
    offset: AtomicU64,
    replicas: Mutex<Vec<Arc<ReplicaLink>>>,
}

impl ReplicationManager {
    pub fn new() -> Self {
        ReplicationManager {
            replication_id: generate_replication_id(),
            offset: AtomicU64::new(0),
            replicas: Mutex::new(Vec::new()),
        }
    }

    /// 40-hex-character identifier of this primary's replication history
    pub fn replication_id(&self) -> &str {
        &self.replication_id
    }

    /// Bytes of write traffic propagated since startup
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Number of currently attached replicas
    pub async fn replica_count(&self) -> usize {
        self.replicas.lock().await.len()
    }

    /// Attach a replica link after its PSYNC was served
    pub async fn register(&self, link: ReplicaLink) -> Arc<ReplicaLink> {
        let link = Arc::new(link);
        let mut replicas = self.replicas.lock().await;
        replicas.push(link.clone());
        info!(
            "replica attached: {} ({} total)",
            link.peer_addr(),
            replicas.len()
        );
        link
    }

    /// Drop a link whose connection went away
    pub async fn unregister(&self, link: &Arc<ReplicaLink>) {
        let mut replicas = self.replicas.lock().await;
        replicas.retain(|candidate| !Arc::ptr_eq(candidate, link));
        info!(
            "replica detached: {} ({} remaining)",
            link.peer_addr(),
            replicas.len()
        );
    }

    /// Broadcast a write command to every attached replica.
    ///
    /// Advances the replication offset by the command's encoded length.
    /// A failing link is logged and skipped; it never blocks the others.
    pub async fn propagate(&self, args: &[Bytes]) {
        let payload = codec::command_bytes(args);
        self.offset.fetch_add(payload.len() as u64, Ordering::AcqRel);

        let links: Vec<_> = self.replicas.lock().await.clone();
        debug!(
            "propagating {} bytes to {} replica(s)",
            payload.len(),
            links.len()
        );
        for link in links {
            if let Err(e) = link.send(&payload).await {
                warn!("error propagating to replica {}: {}", link.peer_addr(), e);
            }
        }
    }

    /// Block until at least `needed` replicas acknowledged the current
    /// offset or the timeout elapses; returns how many satisfy the bound
    /// at the moment of return.
    pub async fn wait_for_acks(&self, needed: usize, timeout: Duration) -> usize {
        let target = self.offset();
        let deadline = Instant::now() + timeout;

        loop {
            let acked = self.count_acked(target).await;
            if acked >= needed || Instant::now() >= deadline {
                return acked;
            }
            self.request_acks().await;

            let nap = deadline
                .saturating_duration_since(Instant::now())
                .min(ACK_POLL_INTERVAL);
            tokio::time::sleep(nap).await;
        }
    }

    async fn count_acked(&self, target: u64) -> usize {
        self.replicas
            .lock()
            .await
            .iter()
            .filter(|link| link.acked_offset() >= target)
            .count()
    }

    /// Ask every link to report its processed offset. GETACK traffic does
    /// not advance the write offset.
    async fn request_acks(&self) {
        let getack = codec::command_bytes(&[
            Bytes::from_static(b"REPLCONF"),
            Bytes::from_static(b"GETACK"),
            Bytes::from_static(b"*"),
        ]);
        let links: Vec<_> = self.replicas.lock().await.clone();
        for link in links {
            if let Err(e) = link.send(&getack).await {
                warn!("error requesting ack from {}: {}", link.peer_addr(), e);
            }
        }
    }
}

impl Default for ReplicationManager {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_replication_id() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..40).map(|_| HEX[rng.gen_range(0..HEX.len())] as char).collect()
}
