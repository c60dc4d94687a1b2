//! Replication payload and its serialization strategy.
//!
//! The transport delivers opaque frame bytes; turning those bytes into a
//! [`Payload`] (and back) is delegated to a [`PayloadCodec`] so the wire
//! layout is not fixed by the core. The only requirement is that
//! `encode`/`decode` round-trip a `{key, data}` record. The default codec
//! is bincode.

use crate::error::{MeshError, Result};
use serde::{Deserialize, Serialize};

/// The replication unit carried inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Content key the blob is stored under.
    pub key: String,
    /// The blob bytes.
    pub data: Vec<u8>,
}

/// Pluggable payload serialization.
///
/// Injected at server construction; the same codec instance is used for
/// broadcast encoding and receive-loop decoding.
pub trait PayloadCodec: Send + Sync {
    /// Serialize a payload to wire bytes.
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>>;
    /// Deserialize wire bytes into a payload.
    fn decode(&self, bytes: &[u8]) -> Result<Payload>;
}

/// Default codec: bincode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl PayloadCodec for BincodeCodec {
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        bincode::serialize(payload).map_err(|e| MeshError::Decode(format!("encode payload: {e}")))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Payload> {
        bincode::deserialize(bytes).map_err(|e| MeshError::Decode(format!("decode payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bincode_roundtrip() {
        let codec = BincodeCodec;
        let payload = Payload {
            key: "backup/db".to_string(),
            data: vec![1, 2, 3, 255, 0],
        };

        let bytes = codec.encode(&payload).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let codec = BincodeCodec;
        let err = codec.decode(&[0xff; 3]).unwrap_err();
        assert!(matches!(err, MeshError::Decode(_)));
        assert!(!err.is_connection_fatal());
    }
}
