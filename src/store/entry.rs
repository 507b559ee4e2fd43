//! Entry structure for key-value pairs

use bytes::Bytes;
use std::time::{Duration, Instant};

/// A single stored value with its optional expiry deadline
#[derive(Debug, Clone)]
pub struct Entry {
    /// The value
    pub value: Bytes,

    /// Optional expiration time (absolute)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Create an entry without expiration
    pub fn new(value: impl Into<Bytes>) -> Self {
        Entry {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Create an entry that expires `ttl_ms` milliseconds from now.
    ///
    /// A zero or negative TTL is legal and produces an entry that is
    /// already expired to subsequent reads.
    pub fn with_expiry(value: impl Into<Bytes>, ttl_ms: i64) -> Self {
        let deadline = if ttl_ms > 0 {
            Instant::now() + Duration::from_millis(ttl_ms as u64)
        } else {
            Instant::now()
        };
        Entry {
            value: value.into(),
            expires_at: Some(deadline),
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() >= expires_at,
            None => false,
        }
    }
}
