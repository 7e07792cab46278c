//! Fast strategy - LZ4 block codec.
//!
//! The payload is a sequence of independently compressed blocks so the
//! decoder only ever holds one block in memory:
//! ```text
//! [frame_len: u32 LE][lz4 block with prepended u32 size] ...
//! ```

use lz4::block::{self, CompressionMode};
use std::io::{self, BufRead, Read};

use super::{Codec, EncodeParams, EncodedPayload, RatioTable, TuningTable};
use crate::types::{Algorithm, CompressionHints};

const MIN_BLOCK_SIZE: usize = 64 * 1024;
const MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Worst-case LZ4 expansion of a full block plus the prepended size.
const MAX_FRAME_LEN: usize = MAX_BLOCK_SIZE + MAX_BLOCK_SIZE / 255 + 16 + 4;

const MAX_HOT_SIZE: u64 = 16 * 1024 * 1024;
const LARGE_COLD_SIZE: u64 = 1024 * 1024;

static FAST_TUNING: TuningTable = TuningTable {
    min_level: 0,
    max_level: 9,
    ratios: RatioTable {
        structured: 0.45,
        text: 0.55,
        code: 0.50,
        binary: 0.90,
        precompressed: 1.0,
        unknown: 0.70,
    },
};

/// LZ4 block codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lz4Codec;

impl Lz4Codec {
    /// Level 0 is accelerated mode, 1 the default mode, higher levels use LZ4-HC.
    fn mode(level: u32) -> CompressionMode {
        match level {
            0 => CompressionMode::FAST(4),
            1 => CompressionMode::DEFAULT,
            hc => CompressionMode::HIGHCOMPRESSION(hc as i32),
        }
    }

    pub fn block_size_for(memory_budget: usize) -> usize {
        (memory_budget / 64).clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
    }
}

impl Codec for Lz4Codec {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Fast
    }

    fn tuning(&self) -> &'static TuningTable {
        &FAST_TUNING
    }

    fn accepts(&self, size: u64, hints: &CompressionHints) -> bool {
        let frequency = hints.frequency();
        let class = hints.content_class();

        if size > LARGE_COLD_SIZE && !hints.is_hot && frequency < 0.3 && class.is_binary() {
            return false;
        }
        (hints.is_hot || frequency >= 0.8) && size <= MAX_HOT_SIZE
    }

    fn encode(&self, data: &[u8], params: &EncodeParams<'_>) -> io::Result<EncodedPayload> {
        let block_size = Self::block_size_for(params.memory_budget);

        let mut payload = Vec::with_capacity(data.len() / 2 + 16);
        for input in data.chunks(block_size) {
            let frame = block::compress(input, Some(Self::mode(params.level)), true)?;
            payload.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            payload.extend_from_slice(&frame);
        }

        Ok(EncodedPayload {
            payload,
            block_size: Some(block_size as u32),
            window_log: None,
        })
    }

    fn decoder<'a, R: BufRead + Send + 'a>(
        &self,
        source: R,
        _dictionary: Option<&[u8]>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(Lz4BlockReader::new(source)))
    }
}

// ================================================================================================
// BLOCK READER
// ================================================================================================

/// Decodes one LZ4 frame at a time from `source`.
struct Lz4BlockReader<R> {
    source: R,
    block: Vec<u8>,
    pos: usize,
}

impl<R: Read> Lz4BlockReader<R> {
    fn new(source: R) -> Self {
        Self {
            source,
            block: Vec::new(),
            pos: 0,
        }
    }

    /// Load the next block. `Ok(false)` at a clean end of stream.
    fn next_block(&mut self) -> io::Result<bool> {
        let mut len_bytes = [0u8; 4];
        let mut got = 0;
        while got < len_bytes.len() {
            match self.source.read(&mut len_bytes[got..]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if got == 0 {
            return Ok(false);
        }
        if got < len_bytes.len() {
            return Err(invalid("truncated frame header"));
        }

        let frame_len = u32::from_le_bytes(len_bytes) as usize;
        if frame_len < 4 || frame_len > MAX_FRAME_LEN {
            return Err(invalid(format!("frame length {} out of range", frame_len)));
        }

        let mut frame = vec![0u8; frame_len];
        self.source.read_exact(&mut frame)?;

        let declared = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        if declared < 0 || declared as usize > MAX_BLOCK_SIZE {
            return Err(invalid(format!("block size {} out of range", declared)));
        }

        self.block = block::decompress(&frame, None)?;
        self.pos = 0;
        Ok(true)
    }
}

impl<R: Read> Read for Lz4BlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.block.len() {
            if !self.next_block()? {
                return Ok(0);
            }
        }

        let n = buf.len().min(self.block.len() - self.pos);
        buf[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}
