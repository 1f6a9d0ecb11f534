use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod bincode;
pub mod json;

pub use self::bincode::BincodeCodec;
pub use self::json::JsonCodec;

/// Codec trait for serializing and deserializing messages
pub trait Codec: Send + Sync {
    /// Encode a value into bytes
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes into a value
    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T>;
}

/// Codec chosen at runtime, typically from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Bincode,
    Json,
}

impl Codec for CodecKind {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            CodecKind::Bincode => BincodeCodec.encode(value),
            CodecKind::Json => JsonCodec.encode(value),
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            CodecKind::Bincode => BincodeCodec.decode(bytes),
            CodecKind::Json => JsonCodec.decode(bytes),
        }
    }
}
