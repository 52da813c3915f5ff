//! Update callbacks
//!
//! A [`StoreUpdateHandler`] is told about every record the tailer applies,
//! after the cache has been updated and before the new offset is published.
//! So when a `put` returns, the handler has already seen that write.
//!
//! Handlers run on the tailer task and should not block.

/// Callback for applied changelog records
pub trait StoreUpdateHandler<K, V>: Send + Sync {
    /// `value = None` means the key was deleted
    fn handle_update(&self, key: &K, value: Option<&V>, offset: i64);
}

/// Plain closures work as handlers
impl<K, V, F> StoreUpdateHandler<K, V> for F
where
    F: Fn(&K, Option<&V>, i64) + Send + Sync,
{
    fn handle_update(&self, key: &K, value: Option<&V>, offset: i64) {
        self(key, value, offset)
    }
}
