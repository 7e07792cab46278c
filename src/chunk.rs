//! Self-describing compressed chunk and its binary envelope.
//!
//! # Envelope Format
//! ```text
//! magic:       b"TCHK"
//! version:     u8 (1)
//! header_len:  u32 little-endian
//! header:      bincode { algorithm tag, original_size, compressed_size, metadata }
//! payload:     compressed_size bytes
//! ```
//!
//! The algorithm travels as its string tag so an unrecognised tag surfaces as
//! `UnknownAlgorithm` instead of a generic decode failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{TierError, TierResult};
use crate::types::Algorithm;

const MAGIC: &[u8; 4] = b"TCHK";
const VERSION: u8 = 1;
const PREAMBLE_LEN: usize = MAGIC.len() + 1 + 4;

/// Upper bound on the encoded header, guards against garbage length fields.
const MAX_HEADER_LEN: usize = 64 * 1024;

/// Codec settings and timings recorded alongside a payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Quality/level the strategy used
    pub level: u32,
    /// Wall-clock compression time
    pub compression_time_ms: f64,
    /// Filled in on decompression
    pub decompression_time_ms: Option<f64>,
    /// Shared dictionary id, when one was bound
    pub dictionary: Option<String>,
    /// Block size for block-framed codecs
    pub block_size: Option<u32>,
    /// Window size exponent for windowed codecs
    pub window_log: Option<u32>,
    /// Free-form annotations
    pub extra: BTreeMap<String, String>,
}

/// The persisted unit written to a tier sibling path.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressedChunk {
    pub algorithm: Algorithm,
    pub original_size: u64,
    pub compressed_size: u64,
    pub payload: Vec<u8>,
    pub metadata: ChunkMetadata,
}

#[derive(Serialize, Deserialize)]
struct EnvelopeHeader {
    algorithm: String,
    original_size: u64,
    compressed_size: u64,
    metadata: ChunkMetadata,
}

impl CompressedChunk {
    pub fn new(
        algorithm: Algorithm,
        original_size: u64,
        payload: Vec<u8>,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            algorithm,
            original_size,
            compressed_size: payload.len() as u64,
            payload,
            metadata,
        }
    }

    /// `compressed / original`; 1.0 for empty input.
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.original_size as f64
        }
    }

    /// Check the size invariant before trusting the payload.
    pub fn validate(&self) -> TierResult<()> {
        if self.compressed_size != self.payload.len() as u64 {
            return Err(TierError::corrupt(format!(
                "header says {} compressed bytes, payload has {}",
                self.compressed_size,
                self.payload.len()
            )));
        }
        Ok(())
    }

    /// Serialize into the envelope format.
    pub fn encode(&self) -> TierResult<Vec<u8>> {
        self.encode_tagged(self.algorithm.tag())
    }

    fn encode_tagged(&self, tag: &str) -> TierResult<Vec<u8>> {
        let header = EnvelopeHeader {
            algorithm: tag.to_string(),
            original_size: self.original_size,
            compressed_size: self.compressed_size,
            metadata: self.metadata.clone(),
        };
        let header_bytes = bincode::serialize(&header)
            .map_err(|e| TierError::corrupt(format!("serialize header failed: {}", e)))?;

        let mut out = Vec::with_capacity(PREAMBLE_LEN + header_bytes.len() + self.payload.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parse an envelope. Fails with `UnknownAlgorithm` for an unrecognised
    /// tag and `CorruptChunk` for any structural problem.
    pub fn decode(bytes: &[u8]) -> TierResult<Self> {
        if bytes.len() < PREAMBLE_LEN {
            return Err(TierError::corrupt(format!(
                "envelope is {} bytes, shorter than the {}-byte preamble",
                bytes.len(),
                PREAMBLE_LEN
            )));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(TierError::corrupt("invalid magic"));
        }
        let version = bytes[MAGIC.len()];
        if version != VERSION {
            return Err(TierError::corrupt(format!(
                "unsupported envelope version: {}",
                version
            )));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[MAGIC.len() + 1..PREAMBLE_LEN]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if header_len > MAX_HEADER_LEN || PREAMBLE_LEN + header_len > bytes.len() {
            return Err(TierError::corrupt(format!(
                "header length {} exceeds envelope",
                header_len
            )));
        }

        let header_end = PREAMBLE_LEN + header_len;
        let header: EnvelopeHeader = bincode::deserialize(&bytes[PREAMBLE_LEN..header_end])
            .map_err(|e| TierError::corrupt(format!("deserialize header failed: {}", e)))?;

        let algorithm: Algorithm = header.algorithm.parse()?;

        let chunk = CompressedChunk {
            algorithm,
            original_size: header.original_size,
            compressed_size: header.compressed_size,
            payload: bytes[header_end..].to_vec(),
            metadata: header.metadata,
        };
        chunk.validate()?;
        Ok(chunk)
    }

    /// Envelope with an arbitrary algorithm tag.
    #[cfg(test)]
    pub(crate) fn encode_with_tag(&self, tag: &str) -> Vec<u8> {
        self.encode_tagged(tag).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> CompressedChunk {
        let metadata = ChunkMetadata {
            level: 7,
            compression_time_ms: 1.5,
            dictionary: Some("rust-v1".to_string()),
            ..Default::default()
        };
        CompressedChunk::new(Algorithm::Balanced, 42, vec![1, 2, 3, 4, 5], metadata)
    }

    #[test]
    fn test_envelope_preserves_fields() {
        let chunk = sample_chunk();
        let decoded = CompressedChunk::decode(&chunk.encode().unwrap()).unwrap();
        assert_eq!(decoded, chunk);
        assert_eq!(decoded.compressed_size, 5);
        assert_eq!(decoded.metadata.dictionary.as_deref(), Some("rust-v1"));
    }

    #[test]
    fn test_empty_payload_envelope() {
        let chunk = CompressedChunk::new(Algorithm::Fast, 0, Vec::new(), ChunkMetadata::default());
        let decoded = CompressedChunk::decode(&chunk.encode().unwrap()).unwrap();
        assert_eq!(decoded.original_size, 0);
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.ratio(), 1.0);
    }

    #[test]
    fn test_unknown_tag_fails_with_unknown_algorithm() {
        let bytes = sample_chunk().encode_with_tag("unknown");
        let err = CompressedChunk::decode(&bytes).unwrap_err();
        assert!(matches!(err, TierError::UnknownAlgorithm { ref tag } if tag == "unknown"));
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let mut bytes = sample_chunk().encode().unwrap();
        bytes.pop();
        let err = CompressedChunk::decode(&bytes).unwrap_err();
        assert!(matches!(err, TierError::CorruptChunk { .. }));
    }

    #[test]
    fn test_bad_magic_and_short_input() {
        let mut bytes = sample_chunk().encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            CompressedChunk::decode(&bytes),
            Err(TierError::CorruptChunk { .. })
        ));
        assert!(matches!(
            CompressedChunk::decode(b"TCH"),
            Err(TierError::CorruptChunk { .. })
        ));
    }

    #[test]
    fn test_oversized_header_length_is_corrupt() {
        let mut bytes = sample_chunk().encode().unwrap();
        bytes[5..9].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            CompressedChunk::decode(&bytes),
            Err(TierError::CorruptChunk { .. })
        ));
    }
}
