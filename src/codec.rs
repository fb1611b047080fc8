//! How cached values are turned into bytes for a [`Store`](crate::Store).

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;

/// Encoding strategy for a cached value, picked when the cache is built
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>, BoxError>;

    fn decode(&self, raw: &[u8]) -> Result<T, BoxError>;
}

/// The default codec: plain JSON through serde
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, BoxError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, raw: &[u8]) -> Result<T, BoxError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Codec for values that never leave memory; every call fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCodec;

impl<T> Codec<T> for NoCodec {
    fn encode(&self, _value: &T) -> Result<Vec<u8>, BoxError> {
        Err("value has no byte encoding".into())
    }

    fn decode(&self, _raw: &[u8]) -> Result<T, BoxError> {
        Err("value has no byte encoding".into())
    }
}

/// A type that knows its own byte representation
pub trait Serializable: Sized {
    fn to_bytes(&self) -> Result<Vec<u8>, BoxError>;

    fn from_bytes(raw: &[u8]) -> Result<Self, BoxError>;
}

/// Codec delegating to the value's [`Serializable`] implementation
pub struct BytesCodec<T>(PhantomData<fn() -> T>);

impl<T> BytesCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for BytesCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BytesCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BytesCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BytesCodec")
    }
}

impl<T: Serializable> Codec<T> for BytesCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, BoxError> {
        value.to_bytes()
    }

    fn decode(&self, raw: &[u8]) -> Result<T, BoxError> {
        T::from_bytes(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Csv(Vec<u32>);

    impl Serializable for Csv {
        fn to_bytes(&self) -> Result<Vec<u8>, BoxError> {
            let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
            Ok(parts.join(",").into_bytes())
        }

        fn from_bytes(raw: &[u8]) -> Result<Self, BoxError> {
            let text = std::str::from_utf8(raw)?;
            let values = text
                .split(',')
                .map(str::parse)
                .collect::<Result<Vec<u32>, _>>()?;
            Ok(Csv(values))
        }
    }

    #[test]
    fn test_json_codec() {
        let raw = Codec::<String>::encode(&JsonCodec, &"test".to_string()).unwrap();
        assert_eq!(raw, b"\"test\"");

        let value: Vec<u8> = JsonCodec.decode(b"[1,2,3]").unwrap();
        assert_eq!(value, vec![1, 2, 3]);

        assert!(Codec::<u32>::decode(&JsonCodec, b"not json").is_err());
    }

    #[test]
    fn test_bytes_codec_uses_custom_format() {
        let codec = BytesCodec::<Csv>::new();
        let raw = codec.encode(&Csv(vec![1, 2, 3])).unwrap();
        assert_eq!(raw, b"1,2,3");
        assert_eq!(codec.decode(b"4,5").unwrap(), Csv(vec![4, 5]));
        assert!(codec.decode(b"4,x").is_err());
    }
}
