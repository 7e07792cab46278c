//! High-ratio strategy - Brotli.

use std::io::{self, BufRead, Read, Write};

use super::{Codec, EncodeParams, EncodedPayload, RatioTable, TuningTable};
use crate::types::{Algorithm, CompressionHints};

const MIN_LGWIN: u32 = 16;
const MAX_LGWIN: u32 = 24;
const IO_BUFFER: usize = 4096;

const SMALL_HOT_SIZE: u64 = 64 * 1024;
const LARGE_COLD_SIZE: u64 = 100 * 1024;

static HIGH_RATIO_TUNING: TuningTable = TuningTable {
    min_level: 4,
    max_level: 11,
    ratios: RatioTable {
        structured: 0.22,
        text: 0.30,
        code: 0.28,
        binary: 0.82,
        precompressed: 0.98,
        unknown: 0.55,
    },
};

/// Brotli codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrotliCodec;

impl BrotliCodec {
    /// Sliding window exponent, a sixteenth of the budget.
    pub fn lgwin_for(memory_budget: usize) -> u32 {
        let target = (memory_budget / 16).max(1);
        let log = usize::BITS - 1 - target.leading_zeros();
        log.clamp(MIN_LGWIN, MAX_LGWIN)
    }
}

impl Codec for BrotliCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::HighRatio
    }

    fn tuning(&self) -> &'static TuningTable {
        &HIGH_RATIO_TUNING
    }

    fn accepts(&self, size: u64, hints: &CompressionHints) -> bool {
        let class = hints.content_class();
        if hints.is_hot && size < SMALL_HOT_SIZE && class.is_binary() {
            return false;
        }
        class.is_textual()
            || (size >= LARGE_COLD_SIZE && hints.frequency() < 0.3 && !hints.is_hot)
    }

    fn encode(&self, data: &[u8], params: &EncodeParams<'_>) -> io::Result<EncodedPayload> {
        let lgwin = Self::lgwin_for(params.memory_budget);

        let sink = Vec::with_capacity(data.len() / 3 + 64);
        let mut writer = brotli::CompressorWriter::new(sink, IO_BUFFER, params.level, lgwin);
        writer.write_all(data)?;
        writer.flush()?;
        let payload = writer.into_inner();

        Ok(EncodedPayload {
            payload,
            block_size: None,
            window_log: Some(lgwin),
        })
    }

    fn decoder<'a, R: BufRead + Send + 'a>(
        &self,
        source: R,
        _dictionary: Option<&[u8]>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(brotli::Decompressor::new(source, IO_BUFFER)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_text_and_large_cold_payloads() {
        let codec = BrotliCodec;
        let markdown = CompressionHints::new("text/markdown", 512).with_frequency(0.7);
        assert!(codec.accepts(512, &markdown));

        let cold_blob = CompressionHints::new("application/octet-stream", 512 * 1024)
            .with_frequency(0.05);
        assert!(codec.accepts(512 * 1024, &cold_blob));
    }

    #[test]
    fn test_rejects_small_hot_binary() {
        let codec = BrotliCodec;
        let hot_png = CompressionHints::new("image/png", 2048).hot(true);
        assert!(!codec.accepts(2048, &hot_png));
    }

    #[test]
    fn test_lgwin_follows_budget() {
        assert_eq!(BrotliCodec::lgwin_for(0), MIN_LGWIN);
        assert_eq!(BrotliCodec::lgwin_for(64 * 1024 * 1024), 22);
        assert_eq!(BrotliCodec::lgwin_for(usize::MAX), MAX_LGWIN);
    }
}
