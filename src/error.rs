//! Error taxonomy for the compression engine and tiered storage.

use crate::types::Algorithm;

/// Errors surfaced by chunk decoding, strategies, the engine and tiering.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    #[error("unknown compression algorithm tag: {tag:?}")]
    UnknownAlgorithm { tag: String },

    #[error("algorithm mismatch: strategy {expected} cannot decode a {found} chunk")]
    AlgorithmMismatch {
        expected: Algorithm,
        found: Algorithm,
    },

    #[error("corrupt chunk: {details}")]
    CorruptChunk { details: String },

    #[error("dictionary {id:?} is not registered")]
    MissingDictionary { id: String },

    #[error("{algorithm} codec failed: {message}")]
    Codec {
        algorithm: Algorithm,
        message: String,
    },

    #[error("tier I/O failure on {path}: {message}")]
    TierIo { path: String, message: String },

    #[error("optimization finished with {failed} of {processed} paths failed")]
    OptimizationPartialFailure { failed: usize, processed: usize },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TierError {
    pub(crate) fn corrupt(details: impl Into<String>) -> Self {
        TierError::CorruptChunk {
            details: details.into(),
        }
    }

    pub(crate) fn tier_io(path: &str, err: impl std::fmt::Display) -> Self {
        TierError::TierIo {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    /// True for errors that invalidate a single object but leave the engine usable.
    pub fn is_object_local(&self) -> bool {
        matches!(
            self,
            TierError::CorruptChunk { .. }
                | TierError::AlgorithmMismatch { .. }
                | TierError::MissingDictionary { .. }
                | TierError::UnknownAlgorithm { .. }
        )
    }
}

pub type TierResult<T> = Result<T, TierError>;
