//! Record (de)serialization: encode to bytes for storage, decode back into
//! a typed record.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// A reversible mapping between a typed record `R` and the bytes a
/// [`crate::storage::Engine`] stores.
pub trait Codec<R>: Clone + Send + Sync {
    fn encode(&self, record: &R) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<R>;
    fn codec_name(&self) -> &'static str;
}

/// Default codec: records are JSON objects.
#[derive(Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        JsonCodec
    }
}

impl<R> Codec<R> for JsonCodec
where
    R: Serialize + DeserializeOwned + Send + Sync,
{
    fn encode(&self, record: &R) -> Result<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<R> {
        serde_json::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))
    }

    fn codec_name(&self) -> &'static str {
        "JsonCodec"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: i16,
    }

    #[test]
    fn round_trips_through_json() {
        let codec = JsonCodec::new();
        let p = Person { name: "ada".into(), age: 30 };
        let bytes = codec.encode(&p).unwrap();
        let back: Person = codec.decode(&bytes).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = JsonCodec::new();
        let err: Result<Person> = codec.decode(b"not json");
        assert!(err.is_err());
    }
}
