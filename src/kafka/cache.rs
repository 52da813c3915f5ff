//! Local cache contract
//!
//! The store materializes the changelog into a [`LocalCache`]. The tailer is
//! the only writer; `get` callers read concurrently.
//!
//! Callers that want state to outlive one store instance keep an
//! `Arc<dyn LocalCache<K, V>>` and hand it to the next store. The next store
//! replays the log over it, which converges because applying a record is
//! idempotent.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::error::Result;

/// Point get/put/delete over the store's keys
pub trait LocalCache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Insert or replace, returning the previous value
    fn put(&self, key: K, value: V) -> Result<Option<V>>;

    /// Remove, returning the previous value
    fn delete(&self, key: &K) -> Result<Option<V>>;
}

/// Ordered map behind a read/write lock
#[derive(Debug)]
pub struct InMemoryCache<K, V> {
    entries: RwLock<BTreeMap<K, V>>,
}

impl<K: Ord, V> InMemoryCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K: Ord, V> Default for InMemoryCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LocalCache<K, V> for InMemoryCache<K, V>
where
    K: Ord + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: K, value: V) -> Result<Option<V>> {
        Ok(self.entries.write().insert(key, value))
    }

    fn delete(&self, key: &K) -> Result<Option<V>> {
        Ok(self.entries.write().remove(key))
    }
}
