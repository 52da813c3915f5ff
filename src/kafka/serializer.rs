//! Key and value serialization
//!
//! The changelog stores bytes. A [`Serializer`] converts the store's typed keys
//! and values to and from those bytes. Two are provided:
//!
//! - [`StringSerializer`]: UTF-8 strings as-is
//! - [`JsonSerializer`]: any serde type as JSON

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{Result, StoreError};

/// Converts keys and values of a store to and from changelog bytes
pub trait Serializer<K, V>: Send + Sync {
    fn serialize_key(&self, key: &K) -> Result<Vec<u8>>;

    fn serialize_value(&self, value: &V) -> Result<Vec<u8>>;

    fn deserialize_key(&self, bytes: &[u8]) -> Result<K>;

    fn deserialize_value(&self, bytes: &[u8]) -> Result<V>;
}

/// UTF-8 strings for both keys and values
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl Serializer<String, String> for StringSerializer {
    fn serialize_key(&self, key: &String) -> Result<Vec<u8>> {
        Ok(key.as_bytes().to_vec())
    }

    fn serialize_value(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize_key(&self, bytes: &[u8]) -> Result<String> {
        utf8(bytes)
    }

    fn deserialize_value(&self, bytes: &[u8]) -> Result<String> {
        utf8(bytes)
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// JSON for any serde key and value types
pub struct JsonSerializer<K, V> {
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> JsonSerializer<K, V> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<K, V> Default for JsonSerializer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for JsonSerializer<K, V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for JsonSerializer<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonSerializer")
    }
}

impl<K, V> Serializer<K, V> for JsonSerializer<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    fn serialize_key(&self, key: &K) -> Result<Vec<u8>> {
        serde_json::to_vec(key).map_err(json_error)
    }

    fn serialize_value(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(json_error)
    }

    fn deserialize_key(&self, bytes: &[u8]) -> Result<K> {
        serde_json::from_slice(bytes).map_err(json_error)
    }

    fn deserialize_value(&self, bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes).map_err(json_error)
    }
}

fn json_error(err: serde_json::Error) -> StoreError {
    StoreError::Serialization(err.to_string())
}
