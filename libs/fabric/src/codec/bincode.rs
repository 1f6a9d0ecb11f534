use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::transport::MAX_MESSAGE_LEN;

/// Bincode codec for binary serialization
///
/// Fixed-width integers, and decoding refuses to allocate past the
/// transport's message limit even if a length field inside the payload lies.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn options() -> impl Options {
        bincode::options()
            .with_fixint_encoding()
            .with_limit(MAX_MESSAGE_LEN as u64)
    }
}

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Self::options()
            .serialize(value)
            .map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        Self::options()
            .deserialize(bytes)
            .map_err(|e| Error::Codec(e.to_string()))
    }
}
