//! In-memory storage implementation

use super::entry::Entry;
use bytes::Bytes;
use siphasher::sip::SipHasher13;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;

/// Type alias for our hash map with SipHasher
type StoreMap = HashMap<Bytes, Entry, BuildHasherDefault<SipHasher13>>;

/// In-memory key-value store
///
/// A single map from key to entry. Expired entries are removed lazily by
/// the reads that discover them; there is no background sweeper.
pub struct MemoryStore {
    store: StoreMap,
}

impl MemoryStore {
    /// Create a new memory store with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new memory store with specified initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        MemoryStore {
            store: HashMap::with_capacity_and_hasher(
                capacity,
                BuildHasherDefault::<SipHasher13>::default(),
            ),
        }
    }

    /// Upsert an entry. An overwrite replaces any previous expiry.
    pub fn set(&mut self, key: impl Into<Bytes>, entry: Entry) {
        self.store.insert(key.into(), entry);
    }

    /// Get the live value for a key.
    ///
    /// An entry whose deadline has passed is treated as absent and removed.
    pub fn get(&mut self, key: &Bytes) -> Option<Bytes> {
        let expired = self
            .store
            .get(key)
            .map(|entry| entry.is_expired())
            .unwrap_or(false);

        if expired {
            self.store.remove(key);
            return None;
        }

        self.store.get(key).map(|entry| entry.value.clone())
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.store.values().filter(|entry| !entry.is_expired()).count()
    }

    /// Check if the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
