//! Compression strategies.
//!
//! Three variants share one contract:
//! - **fast**: LZ4 blocks, cheapest CPU, modest ratio
//! - **balanced**: Zstandard with optional ecosystem dictionary
//! - **high-ratio**: Brotli, slowest, best ratio on text
//!
//! Each variant is a [`TunedStrategy`] over a [`Codec`]. The template owns the
//! shared behavior (level selection, ratio lookup, timing, dictionary binding,
//! size validation); codecs supply the byte transform, applicability rule and
//! tuning table.

pub mod balanced;
pub mod dictionary;
pub mod fast;
pub mod high_ratio;

pub use balanced::ZstdCodec;
pub use dictionary::DictionaryRegistry;
pub use fast::Lz4Codec;
pub use high_ratio::BrotliCodec;

use std::io::{self, BufRead, Cursor, Read};
use std::sync::Arc;
use std::time::Instant;

use crate::chunk::{ChunkMetadata, CompressedChunk};
use crate::error::{TierError, TierResult};
use crate::types::{Algorithm, CompressionHints, ContentClass};

/// Payloads below this size are dominated by framing overhead.
const TINY_PAYLOAD: u64 = 64;

/// Block size yielded by [`ChunkDecompressor`] when iterated.
pub const STREAM_BLOCK_SIZE: usize = 64 * 1024;

/// Largest up-front allocation made from an untrusted `original_size`.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

// ================================================================================================
// STRATEGY CONTRACT
// ================================================================================================

/// Uniform interface over the three compression variants.
pub trait CompressionStrategy: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Whether this strategy suits the payload and its access pattern.
    fn should_use(&self, data: &[u8], hints: &CompressionHints) -> bool;

    /// Cheap `compressed / original` guess in (0, 1], used only for ranking.
    fn estimate_ratio(&self, data: &[u8], hints: &CompressionHints) -> f64;

    /// Quality/level for these hints; hot ⇒ cheapest, cold ⇒ strongest.
    fn select_level(&self, hints: &CompressionHints) -> u32;

    fn compress(&self, data: &[u8], hints: &CompressionHints) -> TierResult<CompressedChunk>;

    /// Exact inverse of `compress`. Records the decompression time on the chunk.
    fn decompress(&self, chunk: &mut CompressedChunk) -> TierResult<Vec<u8>>;

    /// Same bytes as `decompress`, produced incrementally.
    fn create_decompressor(&self, chunk: CompressedChunk)
        -> TierResult<ChunkDecompressor<'static>>;
}

// ================================================================================================
// CODEC TEMPLATE
// ================================================================================================

/// Expected `compressed / original` per content class.
#[derive(Clone, Copy, Debug)]
pub struct RatioTable {
    pub structured: f64,
    pub text: f64,
    pub code: f64,
    pub binary: f64,
    pub precompressed: f64,
    pub unknown: f64,
}

impl RatioTable {
    pub fn lookup(&self, class: ContentClass) -> f64 {
        match class {
            ContentClass::Structured => self.structured,
            ContentClass::Text => self.text,
            ContentClass::Code => self.code,
            ContentClass::Binary => self.binary,
            ContentClass::Precompressed => self.precompressed,
            ContentClass::Unknown => self.unknown,
        }
    }
}

/// Level range and ratio estimates for one codec.
#[derive(Clone, Copy, Debug)]
pub struct TuningTable {
    pub min_level: u32,
    pub max_level: u32,
    pub ratios: RatioTable,
}

impl TuningTable {
    /// `max - round((max - min) * heat)`, so the hot marker always maps to `min`.
    pub fn level_for(&self, hints: &CompressionHints) -> u32 {
        let span = self.max_level.saturating_sub(self.min_level) as f64;
        let cheaper = (span * hints.heat()).round() as u32;
        self.max_level.saturating_sub(cheaper).max(self.min_level)
    }
}

/// Settings handed to a codec for one encode call.
pub struct EncodeParams<'a> {
    pub level: u32,
    pub dictionary: Option<&'a [u8]>,
    /// Soft memory ceiling used to size blocks and windows
    pub memory_budget: usize,
}

/// Codec output plus the framing parameters worth recording.
pub struct EncodedPayload {
    pub payload: Vec<u8>,
    pub block_size: Option<u32>,
    pub window_log: Option<u32>,
}

/// A concrete byte transform plugged into [`TunedStrategy`].
pub trait Codec: Send + Sync + 'static {
    fn algorithm(&self) -> Algorithm;

    fn tuning(&self) -> &'static TuningTable;

    fn supports_dictionary(&self) -> bool {
        false
    }

    /// Applicability rule for this codec.
    fn accepts(&self, size: u64, hints: &CompressionHints) -> bool;

    fn encode(&self, data: &[u8], params: &EncodeParams<'_>) -> io::Result<EncodedPayload>;

    /// Reader producing the decoded bytes of `source`.
    fn decoder<'a, R: BufRead + Send + 'a>(
        &self,
        source: R,
        dictionary: Option<&[u8]>,
    ) -> io::Result<Box<dyn Read + Send + 'a>>;
}

/// Strategy generated from a codec and its tuning table.
pub struct TunedStrategy<C: Codec> {
    codec: C,
    dictionaries: Arc<DictionaryRegistry>,
    bind_dictionaries: bool,
    memory_budget: usize,
}

impl<C: Codec> TunedStrategy<C> {
    pub fn new(
        codec: C,
        dictionaries: Arc<DictionaryRegistry>,
        bind_dictionaries: bool,
        memory_budget: usize,
    ) -> Self {
        Self {
            codec,
            dictionaries,
            bind_dictionaries,
            memory_budget,
        }
    }

    fn effective_size(data: &[u8], hints: &CompressionHints) -> u64 {
        if hints.file_size == 0 {
            data.len() as u64
        } else {
            hints.file_size
        }
    }

    fn bound_dictionary(&self, hints: &CompressionHints) -> Option<(&str, &[u8])> {
        if !self.bind_dictionaries || !self.codec.supports_dictionary() {
            return None;
        }
        hints
            .ecosystem
            .as_deref()
            .and_then(|ecosystem| self.dictionaries.resolve(ecosystem))
    }

    fn check_algorithm(&self, chunk: &CompressedChunk) -> TierResult<()> {
        if chunk.algorithm != self.codec.algorithm() {
            return Err(TierError::AlgorithmMismatch {
                expected: self.codec.algorithm(),
                found: chunk.algorithm,
            });
        }
        Ok(())
    }

    /// Validate `chunk` and open a decoded stream over `source`.
    fn open<'a, R: BufRead + Send + 'a>(
        &self,
        chunk: &CompressedChunk,
        source: R,
    ) -> TierResult<ChunkDecompressor<'a>> {
        self.check_algorithm(chunk)?;
        chunk.validate()?;
        self.open_validated(chunk, source)
    }

    fn open_validated<'a, R: BufRead + Send + 'a>(
        &self,
        chunk: &CompressedChunk,
        source: R,
    ) -> TierResult<ChunkDecompressor<'a>> {
        let dictionary = match chunk.metadata.dictionary.as_deref() {
            Some(id) => Some(
                self.dictionaries
                    .get(id)
                    .ok_or_else(|| TierError::MissingDictionary { id: id.to_string() })?,
            ),
            None => None,
        };

        let reader = self
            .codec
            .decoder(source, dictionary)
            .map_err(|e| TierError::corrupt(format!("{} decoder: {}", chunk.algorithm, e)))?;

        Ok(ChunkDecompressor::new(
            reader,
            chunk.algorithm,
            chunk.original_size,
        ))
    }
}

impl<C: Codec> CompressionStrategy for TunedStrategy<C> {
    fn algorithm(&self) -> Algorithm {
        self.codec.algorithm()
    }

    fn should_use(&self, data: &[u8], hints: &CompressionHints) -> bool {
        self.codec.accepts(Self::effective_size(data, hints), hints)
    }

    fn estimate_ratio(&self, data: &[u8], hints: &CompressionHints) -> f64 {
        if Self::effective_size(data, hints) < TINY_PAYLOAD {
            return 1.0;
        }
        self.codec
            .tuning()
            .ratios
            .lookup(hints.content_class())
            .clamp(f64::MIN_POSITIVE, 1.0)
    }

    fn select_level(&self, hints: &CompressionHints) -> u32 {
        self.codec.tuning().level_for(hints)
    }

    fn compress(&self, data: &[u8], hints: &CompressionHints) -> TierResult<CompressedChunk> {
        let start = Instant::now();
        let level = self.select_level(hints);
        let dictionary = self.bound_dictionary(hints);

        let params = EncodeParams {
            level,
            dictionary: dictionary.map(|(_, bytes)| bytes),
            memory_budget: self.memory_budget,
        };
        let encoded = self
            .codec
            .encode(data, &params)
            .map_err(|e| TierError::Codec {
                algorithm: self.codec.algorithm(),
                message: e.to_string(),
            })?;

        let metadata = ChunkMetadata {
            level,
            compression_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            dictionary: dictionary.map(|(id, _)| id.to_string()),
            block_size: encoded.block_size,
            window_log: encoded.window_log,
            ..Default::default()
        };

        Ok(CompressedChunk::new(
            self.codec.algorithm(),
            data.len() as u64,
            encoded.payload,
            metadata,
        ))
    }

    fn decompress(&self, chunk: &mut CompressedChunk) -> TierResult<Vec<u8>> {
        let start = Instant::now();

        let mut out = Vec::with_capacity(chunk.original_size.min(MAX_PREALLOC) as usize);
        {
            let mut stream = self.open(chunk, chunk.payload.as_slice())?;
            stream
                .read_to_end(&mut out)
                .map_err(|e| TierError::corrupt(format!("{} stream: {}", chunk.algorithm, e)))?;
        }

        chunk.metadata.decompression_time_ms = Some(start.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn create_decompressor(
        &self,
        mut chunk: CompressedChunk,
    ) -> TierResult<ChunkDecompressor<'static>> {
        self.check_algorithm(&chunk)?;
        chunk.validate()?;
        let payload = std::mem::take(&mut chunk.payload);
        self.open_validated(&chunk, Cursor::new(payload))
    }
}

// ================================================================================================
// LAZY DECOMPRESSION
// ================================================================================================

/// Single-pass decoded byte stream for one chunk.
///
/// Usable as a [`Read`] or as an iterator of blocks. The stream fails if the
/// decoded length differs from the chunk's `original_size`.
pub struct ChunkDecompressor<'a> {
    inner: Box<dyn Read + Send + 'a>,
    algorithm: Algorithm,
    expected: u64,
    produced: u64,
    finished: bool,
}

impl<'a> ChunkDecompressor<'a> {
    fn new(inner: Box<dyn Read + Send + 'a>, algorithm: Algorithm, expected: u64) -> Self {
        Self {
            inner,
            algorithm,
            expected,
            produced: 0,
            finished: false,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Decoded bytes produced so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn size_error(&self, what: &str) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{}: decoded {} bytes, chunk declares {}",
                what, self.produced, self.expected
            ),
        )
    }
}

impl std::fmt::Debug for ChunkDecompressor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkDecompressor")
            .field("algorithm", &self.algorithm)
            .field("expected", &self.expected)
            .field("produced", &self.produced)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Read for ChunkDecompressor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }

        let n = self.inner.read(buf)?;
        self.produced += n as u64;

        if self.produced > self.expected {
            self.finished = true;
            return Err(self.size_error("overrun"));
        }
        if n == 0 {
            self.finished = true;
            if self.produced != self.expected {
                return Err(self.size_error("truncated"));
            }
        }
        Ok(n)
    }
}

impl Iterator for ChunkDecompressor<'_> {
    type Item = TierResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut block = vec![0u8; STREAM_BLOCK_SIZE];
        let mut filled = 0;
        while filled < block.len() {
            match self.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(TierError::corrupt(format!(
                        "{} stream: {}",
                        self.algorithm, e
                    ))));
                }
            }
        }

        if filled == 0 {
            return None;
        }
        block.truncate(filled);
        Some(Ok(block))
    }
}

// ================================================================================================
// CONSTRUCTORS
// ================================================================================================

pub type FastStrategy = TunedStrategy<Lz4Codec>;
pub type BalancedStrategy = TunedStrategy<ZstdCodec>;
pub type HighRatioStrategy = TunedStrategy<BrotliCodec>;

/// Build the full strategy table, indexed by [`Algorithm::index`].
pub fn strategy_table(
    dictionaries: Arc<DictionaryRegistry>,
    enable_dictionary: bool,
    memory_budget: usize,
) -> [Arc<dyn CompressionStrategy>; 3] {
    [
        Arc::new(TunedStrategy::new(
            Lz4Codec,
            Arc::clone(&dictionaries),
            enable_dictionary,
            memory_budget,
        )),
        Arc::new(TunedStrategy::new(
            ZstdCodec,
            Arc::clone(&dictionaries),
            enable_dictionary,
            memory_budget,
        )),
        Arc::new(TunedStrategy::new(
            BrotliCodec,
            dictionaries,
            enable_dictionary,
            memory_budget,
        )),
    ]
}
