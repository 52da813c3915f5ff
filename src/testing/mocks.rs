//! Mock configuration and handlers

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::StoreConfig;
use crate::kafka::handler::StoreUpdateHandler;

/// Returns a StoreConfig with test-friendly values
///
/// One replica, 1ms retry backoff, and timeouts long enough that only tests
/// which stall the tailer on purpose ever hit them.
pub fn mock_config() -> StoreConfig {
    StoreConfig::new("localhost:9092")
        .replication_factor(1)
        .timeout_ms(5_000)
        .init_timeout_ms(5_000)
        .retry_backoff_ms(1)
}

/// Update handler that remembers every call
#[derive(Clone)]
pub struct RecordingHandler<K, V> {
    updates: Arc<Mutex<Vec<(K, Option<V>, i64)>>>,
}

impl<K, V> Default for RecordingHandler<K, V> {
    fn default() -> Self {
        Self {
            updates: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<K: Clone, V: Clone> RecordingHandler<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(K, Option<V>, i64)> {
        self.updates.lock().clone()
    }
}

impl<K, V> StoreUpdateHandler<K, V> for RecordingHandler<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn handle_update(&self, key: &K, value: Option<&V>, offset: i64) {
        self.updates
            .lock()
            .push((key.clone(), value.cloned(), offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_config_is_valid() {
        let config = mock_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.replication_factor, 1);
        assert_eq!(config.retry_backoff_ms, 1);
    }

    #[test]
    fn test_recording_handler() {
        let handler = RecordingHandler::<String, String>::new();
        handler.handle_update(&"k".to_string(), Some(&"v".to_string()), 4);
        handler.handle_update(&"k".to_string(), None, 5);

        assert_eq!(
            handler.updates(),
            vec![
                ("k".to_string(), Some("v".to_string()), 4),
                ("k".to_string(), None, 5),
            ]
        );
    }
}
