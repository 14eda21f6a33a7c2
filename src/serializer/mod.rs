//! Pluggable payload codecs
//!
//! Nothing in the core depends on the encoding; it only moves bytes between
//! the queue and the typed request/push models.

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SerializerError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub trait Serializer: Send + Sync + 'static {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializerError>;

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializerError>;
}

/// JSON over UTF-8; pairs naturally with string-message frames
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializerError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializerError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary encoding for binary-message frames
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializerError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializerError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Move {
        seq: u32,
        dir: String,
    }

    #[test]
    fn json_list_is_a_json_array() {
        let bytes = JsonSerializer
            .serialize(&vec![Move { seq: 1, dir: "n".into() }])
            .unwrap();
        assert_eq!(bytes, br#"[{"seq":1,"dir":"n"}]"#.to_vec());
    }

    #[test]
    fn json_rejects_garbage() {
        let result: Result<Move, _> = JsonSerializer.deserialize(b"\xde\xad\xbe\xef");
        assert!(matches!(result, Err(SerializerError::Json(_))));
    }

    #[test]
    fn bincode_decodes_what_it_encodes() {
        let value = Move { seq: 7, dir: "w".into() };
        let bytes = BincodeSerializer.serialize(&value).unwrap();
        let back: Move = BincodeSerializer.deserialize(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn bincode_rejects_truncated_input() {
        let result: Result<Move, _> = BincodeSerializer.deserialize(&[1, 0]);
        assert!(matches!(result, Err(SerializerError::Bincode(_))));
    }
}
