//! Process-wide server state

use crate::config::Config;
use crate::replication::ReplicationManager;
use crate::store::MemoryStore;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// The single process-wide state value shared by every connection task.
///
/// Constructed once at startup and passed around behind an `Arc`; there
/// are no ambient globals. Holds the role configuration, the keyspace,
/// primary-side replication state and the replica-side stream position.
pub struct ServerContext {
    /// Startup configuration (role, port)
    pub config: Config,

    /// The keyspace
    pub store: Mutex<MemoryStore>,

    /// Primary-side replication state
    pub replication: ReplicationManager,

    /// Bytes of command traffic consumed from the primary's stream since
    /// the post-handshake position (replica role only)
    processed_offset: AtomicU64,
}

impl ServerContext {
    pub fn new(config: Config) -> Self {
        ServerContext {
            config,
            store: Mutex::new(MemoryStore::new()),
            replication: ReplicationManager::new(),
            processed_offset: AtomicU64::new(0),
        }
    }

    /// This process accepts writes unless --replicaof was given
    pub fn is_primary(&self) -> bool {
        self.config.replica_of.is_none()
    }

    /// Stream position to report in REPLCONF ACK
    pub fn processed_offset(&self) -> u64 {
        self.processed_offset.load(Ordering::Acquire)
    }

    /// Credit consumed primary-stream bytes to the replica's position
    pub fn note_stream_bytes(&self, len: u64) {
        self.processed_offset.fetch_add(len, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplicaOf;

    fn config(replica_of: Option<ReplicaOf>) -> Config {
        Config {
            port: 6379,
            replica_of,
        }
    }

    #[test]
    fn test_role_follows_config() {
        let primary = ServerContext::new(config(None));
        assert!(primary.is_primary());

        let replica = ServerContext::new(config(Some(ReplicaOf {
            host: "localhost".to_string(),
            port: 6379,
        })));
        assert!(!replica.is_primary());
    }

    #[test]
    fn test_stream_bytes_accumulate() {
        let ctx = ServerContext::new(config(None));
        assert_eq!(ctx.processed_offset(), 0);
        ctx.note_stream_bytes(14);
        ctx.note_stream_bytes(31);
        assert_eq!(ctx.processed_offset(), 45);
    }
}
