//! Balanced strategy - Zstandard with optional shared dictionary.

use std::io::{self, BufRead, Read, Write};
use zstd::stream::raw::CParameter;

use super::{Codec, EncodeParams, EncodedPayload, RatioTable, TuningTable};
use crate::types::{Algorithm, CompressionHints};

const MIN_WINDOW_LOG: u32 = 17;
const MAX_WINDOW_LOG: u32 = 24;

static BALANCED_TUNING: TuningTable = TuningTable {
    min_level: 1,
    max_level: 19,
    ratios: RatioTable {
        structured: 0.30,
        text: 0.38,
        code: 0.35,
        binary: 0.85,
        precompressed: 0.99,
        unknown: 0.60,
    },
};

/// Zstandard codec with checksummed frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZstdCodec;

impl ZstdCodec {
    /// Window exponent that keeps the match window near an eighth of the budget.
    pub fn window_log_for(memory_budget: usize) -> u32 {
        let target = (memory_budget / 8).max(1);
        let log = usize::BITS - 1 - target.leading_zeros();
        log.clamp(MIN_WINDOW_LOG, MAX_WINDOW_LOG)
    }
}

impl Codec for ZstdCodec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Balanced
    }

    fn tuning(&self) -> &'static TuningTable {
        &BALANCED_TUNING
    }

    fn supports_dictionary(&self) -> bool {
        true
    }

    /// Mid-range hotness or structured text. Both extremes are left to the
    /// fast and high-ratio strategies.
    fn accepts(&self, _size: u64, hints: &CompressionHints) -> bool {
        let frequency = hints.frequency();
        if hints.is_hot || frequency > 0.9 || frequency < 0.1 {
            return false;
        }
        hints.content_class().is_textual() || (0.2..=0.8).contains(&frequency)
    }

    fn encode(&self, data: &[u8], params: &EncodeParams<'_>) -> io::Result<EncodedPayload> {
        let window_log = Self::window_log_for(params.memory_budget);
        let level = params.level as i32;

        let sink = Vec::with_capacity(data.len() / 2 + 64);
        let mut encoder = match params.dictionary {
            Some(dictionary) => zstd::stream::write::Encoder::with_dictionary(sink, level, dictionary)?,
            None => zstd::stream::write::Encoder::new(sink, level)?,
        };
        encoder.include_checksum(true)?;
        encoder.set_parameter(CParameter::WindowLog(window_log))?;
        encoder.write_all(data)?;
        let payload = encoder.finish()?;

        Ok(EncodedPayload {
            payload,
            block_size: None,
            window_log: Some(window_log),
        })
    }

    fn decoder<'a, R: BufRead + Send + 'a>(
        &self,
        source: R,
        dictionary: Option<&[u8]>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        let decoder = match dictionary {
            Some(dictionary) => zstd::stream::read::Decoder::with_dictionary(source, dictionary)?,
            None => zstd::stream::read::Decoder::with_buffer(source)?,
        };
        Ok(Box::new(decoder))
    }
}
