//! Push delivery of recomputed aggregates to interested callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::MarketAggregate;

/// Callback invoked with every freshly computed aggregate for a key.
pub type AggregateCallback = Arc<dyn Fn(&MarketAggregate) + Send + Sync>;

type CallbacksByKey = HashMap<String, HashMap<u64, AggregateCallback>>;

/// Registry of aggregate subscribers keyed by market cache key.
///
/// Cloning is cheap; clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct SubscriptionHub {
    callbacks: Arc<RwLock<CallbacksByKey>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `key`; the returned guard unsubscribes when
    /// dropped.
    pub fn subscribe(&self, key: impl Into<String>, callback: AggregateCallback) -> Subscription {
        let key = key.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut callbacks = self
            .callbacks
            .write()
            .expect("subscription lock is not poisoned");
        callbacks.entry(key.clone()).or_default().insert(id, callback);
        debug!(%key, id, "registered aggregate subscriber");

        Subscription {
            hub: self.clone(),
            key,
            id,
        }
    }

    /// Deliver `aggregate` to every subscriber of `key`; returns how many
    /// callbacks fired. Callbacks run outside the lock.
    pub fn publish(&self, key: &str, aggregate: &MarketAggregate) -> usize {
        let snapshot: Vec<AggregateCallback> = {
            let callbacks = self
                .callbacks
                .read()
                .expect("subscription lock is not poisoned");
            callbacks
                .get(key)
                .map(|by_id| by_id.values().cloned().collect())
                .unwrap_or_default()
        };

        for callback in &snapshot {
            callback(aggregate);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.callbacks
            .read()
            .expect("subscription lock is not poisoned")
            .get(key)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    fn remove(&self, key: &str, id: u64) {
        let mut callbacks = self
            .callbacks
            .write()
            .expect("subscription lock is not poisoned");
        if let Some(by_id) = callbacks.get_mut(key) {
            by_id.remove(&id);
            if by_id.is_empty() {
                callbacks.remove(key);
            }
        }
    }
}

/// Active subscription; dropping it (or calling [`Subscription::unsubscribe`])
/// removes the callback.
pub struct Subscription {
    hub: SubscriptionHub,
    key: String,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(key = %self.key, id = self.id, "removing aggregate subscriber");
        self.hub.remove(&self.key, self.id);
    }
}
