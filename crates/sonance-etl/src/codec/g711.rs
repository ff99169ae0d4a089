//! ITU-T G.711 mu-law and A-law expansion.

use crate::codec::pcm::DataChunk;
use crate::error::{CodecError, CodecResult};

/// Companding law of an 8-bit G.711 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Law {
    MuLaw,
    ALaw,
}

impl Law {
    /// Expand one companded byte to 16-bit linear PCM.
    #[must_use]
    pub fn expand(self, byte: u8) -> i16 {
        match self {
            Self::MuLaw => MULAW_TABLE[usize::from(byte)],
            Self::ALaw => ALAW_TABLE[usize::from(byte)],
        }
    }
}

static MULAW_TABLE: [i16; 256] = build_mulaw_table();
static ALAW_TABLE: [i16; 256] = build_alaw_table();

const fn mulaw_expand(byte: u8) -> i16 {
    let u = !byte;
    let mut t = (((u & 0x0F) as i32) << 3) + 0x84;
    t <<= ((u & 0x70) >> 4) as i32;
    (if u & 0x80 != 0 { 0x84 - t } else { t - 0x84 }) as i16
}

const fn alaw_expand(byte: u8) -> i16 {
    let a = byte ^ 0x55;
    let mut t = ((a & 0x0F) as i32) << 4;
    let segment = ((a & 0x70) >> 4) as i32;
    match segment {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= segment - 1;
        }
    }
    (if a & 0x80 != 0 { t } else { -t }) as i16
}

const fn build_mulaw_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = mulaw_expand(i as u8);
        i += 1;
    }
    table
}

const fn build_alaw_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = alaw_expand(i as u8);
        i += 1;
    }
    table
}

/// Expands a companded data chunk into little-endian 16-bit PCM bytes.
#[derive(Debug)]
pub struct G711Reader {
    chunk: DataChunk,
    law: Law,
    block_align: usize,
    scratch: Vec<u8>,
}

impl G711Reader {
    pub fn new(chunk: DataChunk, law: Law, block_align: u16) -> CodecResult<Self> {
        if block_align == 0 {
            return Err(CodecError::format("G.711 block align is zero"));
        }
        Ok(Self {
            chunk,
            law,
            block_align: usize::from(block_align),
            scratch: Vec::new(),
        })
    }

    #[must_use]
    pub const fn law(&self) -> Law {
        self.law
    }

    /// Fill `out` with expanded samples, returning the number of bytes
    /// written. Always exactly twice the number of companded bytes consumed;
    /// zero at the end of the chunk.
    ///
    /// The read count starts at `out.len()` and is halved when its expansion
    /// would not fit, then truncated to whole blocks.
    pub fn read(&mut self, out: &mut [u8]) -> CodecResult<usize> {
        let mut count = out.len();
        if count * 2 > out.len() {
            count /= 2;
        }
        count -= count % self.block_align;
        if count == 0 && !out.is_empty() && self.chunk.remaining() > 0 {
            return Err(CodecError::argument(format!(
                "buffer of {} bytes cannot hold one {}-byte G.711 block",
                out.len(),
                self.block_align
            )));
        }

        self.scratch.resize(count, 0);
        let read = self.chunk.read_block(&mut self.scratch)?;
        let read = read - read % self.block_align;

        for (src, dst) in self.scratch[..read].iter().zip(out.chunks_exact_mut(2)) {
            dst.copy_from_slice(&self.law.expand(*src).to_le_bytes());
        }
        Ok(read * 2)
    }

    pub(crate) fn chunk_mut(&mut self) -> &mut DataChunk {
        &mut self.chunk
    }

    pub(crate) const fn chunk(&self) -> &DataChunk {
        &self.chunk
    }
}
