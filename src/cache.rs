//! Cache backends for directory records.
//!
//! The store is shared and externally owned: the lookup path reads single
//! entries and conditionally writes them, it never deletes or iterates.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use memcache::Client;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::error::{LookupError, Result};
use crate::record::DirectoryRecord;

/// 4 days, in seconds.
pub const MIN_LIFETIME: u64 = 345_600;
/// 6 days, in seconds.
pub const MAX_LIFETIME: u64 = 518_400;

/// Cached record with its absolute expiry (Unix seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    pub data: DirectoryRecord,
    pub expires_at: u64,
}

impl CacheItem {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Key-value store with a per-entry expiry timestamp.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get an item, possibly expired.
    async fn get(&self, key: &str) -> Result<Option<CacheItem>>;

    /// Store `data` under `key` until `expires_at`.
    async fn set(
        &self,
        key: &str,
        data: &DirectoryRecord,
        expires_at: u64,
    ) -> Result<()>;
}

/// Pick a lifetime in `range`, drawn again on every write so that keys
/// written together do not expire together.
pub fn random_lifetime(range: RangeInclusive<u64>) -> u64 {
    if range.is_empty() {
        return *range.start();
    }

    rand::thread_rng().gen_range(range)
}

/// Process-local cache. Expired items are dropped when read.
pub struct MemoryCache {
    items: RwLock<HashMap<String, CacheItem>>,
    clock: Box<dyn Clock>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_clock(Box::new(SystemClock::new()))
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`MemoryCache`] judging expiry with `clock`.
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored items, expired ones not yet read included.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheItem>> {
        let now = self.clock.now();
        let mut items = self.items.write().await;

        if items.get(key).is_some_and(|item| item.is_expired(now)) {
            items.remove(key);
            tracing::trace!(%key, "expired cache data dropped");
            return Ok(None);
        }

        Ok(items.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        data: &DirectoryRecord,
        expires_at: u64,
    ) -> Result<()> {
        self.items.write().await.insert(key.to_owned(), CacheItem {
            data: data.clone(),
            expires_at,
        });

        tracing::trace!(%key, expires_at, "cache data set");
        Ok(())
    }
}

/// Run a blocking cache call off the async workers.
async fn blocking<T, F>(call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| LookupError::Cache(err.to_string()))?
}

/// Memcached-backed cache. Items are stored as JSON.
pub struct MemcacheCache {
    client: Arc<Client>,
    clock: Box<dyn Clock>,
}

impl MemcacheCache {
    /// Connect to a memcached instance on `address` (`host:port`).
    pub fn connect(address: &str, clock: Box<dyn Clock>) -> Result<Self> {
        let client = Client::connect(format!(
            "memcache://{address}?timeout=2&tcp_nodelay=true"
        ))
        .map_err(|err| LookupError::Cache(err.to_string()))?;

        tracing::info!(%address, "memcached connected");

        Ok(Self {
            client: Arc::new(client),
            clock,
        })
    }
}

#[async_trait]
impl CacheBackend for MemcacheCache {
    async fn get(&self, key: &str) -> Result<Option<CacheItem>> {
        let client = Arc::clone(&self.client);
        let owned_key = key.to_owned();
        let payload: Option<String> = blocking(move || {
            client
                .get(&owned_key)
                .map_err(|err| LookupError::Cache(err.to_string()))
        })
        .await?;

        payload
            .map(|data| serde_json::from_str(&data))
            .transpose()
            .map_err(Into::into)
    }

    async fn set(
        &self,
        key: &str,
        data: &DirectoryRecord,
        expires_at: u64,
    ) -> Result<()> {
        let ttl = expires_at.saturating_sub(self.clock.now());
        if ttl == 0 {
            return Ok(());
        }

        let payload = serde_json::to_string(&CacheItem {
            data: data.clone(),
            expires_at,
        })?;

        // Memcached reads expirations above 30 days as absolute timestamps.
        let ttl = u32::try_from(ttl.min(2_592_000)).unwrap_or(2_592_000);

        let client = Arc::clone(&self.client);
        let owned_key = key.to_owned();
        blocking(move || {
            client
                .set(&owned_key, payload.as_str(), ttl)
                .map_err(|err| LookupError::Cache(err.to_string()))
        })
        .await?;

        tracing::trace!(%key, ttl, "cache data set");
        Ok(())
    }
}
