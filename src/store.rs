//! The storage contract every backend implements.
//!
//! A [`Store`] only moves raw bytes keyed by string, plus the time those bytes
//! were last written. Expiry is never delegated to the backend: freshness is
//! decided by [`Data`](crate::Data) from the timestamp the store reports.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;

/// Raw bytes read back from a store along with their last write time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub raw: Vec<u8>,
    pub last_set: SystemTime,
}

impl StoredValue {
    pub fn new(raw: Vec<u8>, last_set: SystemTime) -> Self {
        Self { raw, last_set }
    }

    /// Time elapsed since the value was written, zero if the timestamp lies in the future
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.last_set)
            .unwrap_or(Duration::ZERO)
    }
}

/// A persistent backend that a cached value can be mirrored to.
///
/// `get` returns `Ok(None)` for a clean miss; errors are reserved for genuine
/// I/O failures. Implementations are responsible for their own concurrency
/// safety since one store is typically shared by many cached values.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

    async fn set(&self, key: &str, raw: &[u8]) -> Result<(), StoreError>;

    /// Removes the value for `key`. Stores without deletion support keep the default no-op.
    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Converts an arbitrary key to one made only of `[0-9a-zA-Z\-_.]`.
///
/// The key is base64 encoded (standard alphabet, padded) and `+`, `/`, `=`
/// are replaced by `-`, `_`, `.` respectively.
pub fn safe_key(key: &str) -> String {
    STANDARD
        .encode(key.as_bytes())
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            '=' => '.',
            c => c,
        })
        .collect()
}

/// Wire payload for backends that cannot report a modification time themselves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "lastSet", with = "unix_nanos")]
    pub last_set: SystemTime,
    #[serde(with = "base64_bytes")]
    pub raw: Vec<u8>,
}

impl Envelope {
    /// Wraps `raw` stamped with the current time
    pub fn now(raw: &[u8]) -> Self {
        Self {
            last_set: SystemTime::now(),
            raw: raw.to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

impl From<Envelope> for StoredValue {
    fn from(envelope: Envelope) -> Self {
        StoredValue::new(envelope.raw, envelope.last_set)
    }
}

mod unix_nanos {
    use super::*;

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?
            .as_nanos();
        let nanos = u64::try_from(nanos).map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_nanos(nanos))
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(raw))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_key() {
        assert_eq!(safe_key(""), "");
        assert_eq!(safe_key("key123"), "a2V5MTIz");
        // padding, `+` and `/` substitutions
        assert_eq!(safe_key("a"), "YQ..");
        assert_eq!(safe_key("??>"), "Pz8-");
        assert_eq!(safe_key("???"), "Pz8_");
    }

    #[test]
    fn test_safe_key_charset() {
        let key = safe_key("teams/{\"id\": 42, \"name\": \"ünïcode ~+/=\"}");
        assert!(
            key.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        );
    }

    #[test]
    fn test_envelope_json_shape() {
        let envelope = Envelope {
            last_set: UNIX_EPOCH + Duration::from_secs(2),
            raw: b"\"test\"".to_vec(),
        };
        let json = String::from_utf8(envelope.to_json().unwrap()).unwrap();
        assert_eq!(json, r#"{"lastSet":2000000000,"raw":"InRlc3Qi"}"#);

        let back = Envelope::from_json(json.as_bytes()).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_stored_value_future_timestamp_has_zero_age() {
        let value = StoredValue::new(vec![], SystemTime::now() + Duration::from_secs(60));
        assert_eq!(value.age(), Duration::ZERO);
    }
}
