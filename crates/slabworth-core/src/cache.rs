//! In-memory memoization with per-entry expiry.
//!
//! Values are stored as serialized JSON bodies; the typed helpers keep the
//! aggregators out of the serialization details. Expiry is evaluated lazily
//! at read time and an expired entry is evicted by the read that observes it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Default lifetime for merged market aggregates.
pub const MARKET_AGGREGATE_TTL: Duration = Duration::from_secs(15 * 60);
/// Default lifetime for merged population reports.
pub const POPULATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default lifetime for accepted card identities.
pub const RESOLVED_CARD_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default lifetime for free-text card search results.
pub const CARD_SEARCH_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    default_ttl: Duration,
}

/// Thread-safe TTL cache.
///
/// Cloning is cheap and clones share the same underlying map.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<RwLock<CacheInner>>,
    key_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CacheStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                default_ttl,
            })),
            key_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cache that never stores anything: every read is a miss.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Read a live entry; an expired entry reads as a miss and is evicted.
    pub async fn get(&self, key: &str) -> Option<String> {
        {
            let store = self.inner.read().await;
            match store.map.get(key) {
                None => return None,
                Some(entry) if Instant::now() <= entry.expires_at => {
                    return Some(entry.body.clone());
                }
                Some(_) => {}
            }
        }

        let mut store = self.inner.write().await;
        if store
            .map
            .get(key)
            .is_some_and(|entry| entry.expires_at < Instant::now())
        {
            debug!(key, "evicting expired cache entry");
            store.map.remove(key);
        }
        None
    }

    /// Store a body under `key`; `ttl_override` replaces the default TTL.
    pub async fn put(&self, key: String, body: String, ttl_override: Option<Duration>) {
        let mut store = self.inner.write().await;

        // A zero default TTL disables the store outright; a zero override
        // just skips this one write.
        let ttl = ttl_override.unwrap_or(store.default_ttl);
        if store.default_ttl == Duration::ZERO || ttl == Duration::ZERO {
            return;
        }

        let expires_at = Instant::now() + ttl;
        store.map.insert(key, CacheEntry { body, expires_at });
    }

    pub async fn remove(&self, key: &str) {
        let mut store = self.inner.write().await;
        store.map.remove(key);
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Drop every expired entry eagerly.
    pub async fn clear_expired(&self) {
        let now = Instant::now();
        let mut store = self.inner.write().await;
        store.map.retain(|_, entry| entry.expires_at > now);
    }

    /// Entry count, including not-yet-evicted expired entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Typed read over the JSON body.
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let body = self.get(key).await?;
        serde_json::from_str(&body).ok()
    }

    /// Typed write; serialization failures drop the write silently since a
    /// cache must never fail the request it memoizes.
    pub async fn put_value<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_string(value) {
            Ok(body) => self.put(key.to_owned(), body, ttl).await,
            Err(error) => debug!(key, %error, "skipping cache write for unserializable value"),
        }
    }

    /// Return the cached value or compute-and-store it.
    ///
    /// A per-key lock serializes concurrent callers so the factory runs
    /// exactly once within the TTL window; late arrivals observe the stored
    /// value on their double-check.
    pub async fn wrap<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get_value(key).await {
            debug!(key, "cache hit");
            return Ok(hit);
        }

        let key_lock = {
            let mut locks = self.key_locks.lock().await;
            Arc::clone(locks.entry(key.to_owned()).or_default())
        };
        let _guard = key_lock.lock().await;

        if let Some(hit) = self.get_value(key).await {
            debug!(key, "cache hit after waiting on in-flight compute");
            return Ok(hit);
        }

        debug!(key, "cache miss, computing");
        let result = factory().await;
        if let Ok(value) = &result {
            self.put_value(key, value, ttl).await;
        }

        self.key_locks.lock().await.remove(key);
        result
    }
}
