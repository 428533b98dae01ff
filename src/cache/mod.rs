//! Time-bounded storage of raw feed payloads keyed by feed URL.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Revalidation hints stored next to a payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl CacheMetadata {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A cached feed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: CacheMetadata,
}

impl CacheEntry {
    /// Build an entry stamped now that expires after `ttl`
    pub fn new(key: &str, payload: String, ttl: Duration, metadata: CacheMetadata) -> Self {
        let fetched_at = Utc::now();
        Self {
            key: key.to_string(),
            payload,
            fetched_at,
            expires_at: expiry(fetched_at, ttl),
            metadata,
        }
    }

    /// Fresh while `at` is strictly before expiry; a zero TTL is never fresh
    pub fn is_fresh_at(&self, at: DateTime<Utc>) -> bool {
        at < self.expires_at
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

fn expiry(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Key/value store for feed payloads with per-entry expiry.
///
/// Implementations must tolerate concurrent calls; writes to the same key
/// are last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The entry for `key` if present and not expired
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// The entry for `key` regardless of freshness
    async fn peek(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store `payload` under `key`, replacing any previous entry
    async fn set(
        &self,
        key: &str,
        payload: String,
        ttl: Duration,
        metadata: CacheMetadata,
    ) -> Result<(), CacheError>;

    /// Returns whether an entry was removed
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    /// Revalidation hints for `key`, kept even after the payload expires
    async fn metadata(&self, key: &str) -> Result<Option<CacheMetadata>, CacheError> {
        Ok(self.peek(key).await?.map(|entry| entry.metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_is_expired_immediately() {
        let entry = CacheEntry::new("k", "x".into(), Duration::ZERO, CacheMetadata::default());
        assert_eq!(entry.fetched_at, entry.expires_at);
        assert!(!entry.is_fresh_at(entry.fetched_at));
    }

    #[test]
    fn freshness_boundary() {
        let entry = CacheEntry::new(
            "k",
            "x".into(),
            Duration::from_secs(60),
            CacheMetadata::default(),
        );
        assert!(entry.is_fresh_at(entry.fetched_at + TimeDelta::seconds(59)));
        assert!(!entry.is_fresh_at(entry.fetched_at + TimeDelta::seconds(60)));
    }

    #[test]
    fn huge_ttl_saturates() {
        let entry = CacheEntry::new("k", "x".into(), Duration::MAX, CacheMetadata::default());
        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(entry.is_fresh());
    }
}
