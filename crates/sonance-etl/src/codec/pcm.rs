//! Uncompressed and companded sample data shared by the WAV and AIFF parsers.

use log::debug;

use crate::codec::g711::{G711Reader, Law};
use crate::codec::source::ByteStream;
use crate::codec::{AudioFormat, AudioSource, ByteOrder, Encoding};
use crate::error::{CodecError, CodecResult};

/// The sample data chunk of a container, bounded to its declared length.
#[derive(Debug)]
pub struct DataChunk {
    stream: ByteStream,
    start: u64,
    len: u64,
    pos: u64,
}

impl DataChunk {
    /// Bound `stream` to the next `len` bytes.
    ///
    /// Fails with `TruncatedData` up front when the stream length is known
    /// and shorter than the declared chunk.
    pub fn new(stream: ByteStream, len: u64) -> CodecResult<Self> {
        stream.ensure_available("data chunk", len)?;
        Ok(Self {
            start: stream.position(),
            stream,
            len,
            pos: 0,
        })
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute stream offsets covered by the chunk.
    #[must_use]
    pub const fn range(&self) -> std::ops::Range<u64> {
        self.start..self.start + self.len
    }

    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.len - self.pos
    }

    #[must_use]
    pub const fn can_seek(&self) -> bool {
        self.stream.can_seek()
    }

    /// Read up to `buf.len()` bytes, never past the end of the chunk.
    ///
    /// Returns 0 at the end of the chunk; a stream that ends early inside the
    /// chunk is `TruncatedData`.
    pub fn read_block(&mut self, buf: &mut [u8]) -> CodecResult<usize> {
        let n = usize::try_from(self.remaining()).map_or(buf.len(), |r| r.min(buf.len()));
        self.stream
            .read_exact_or_truncated("sample data", &mut buf[..n])?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Move to byte `offset` within the chunk.
    ///
    /// Sequential streams can only move forward.
    pub fn seek_to(&mut self, offset: u64) -> CodecResult<()> {
        if offset > self.len {
            return Err(CodecError::argument(format!(
                "offset {offset} is past the end of a {}-byte data chunk",
                self.len
            )));
        }

        if self.stream.can_seek() {
            self.stream.seek_to(self.start + offset)?;
        } else if offset >= self.pos {
            self.stream.skip("sample data", offset - self.pos)?;
        } else {
            return Err(CodecError::argument(
                "cannot seek backwards on a sequential stream",
            ));
        }
        self.pos = offset;
        Ok(())
    }
}

enum Body {
    Linear(DataChunk),
    Companded(G711Reader),
}

/// Reads interleaved samples from a WAV or AIFF data chunk.
pub struct PcmReader {
    format: AudioFormat,
    body: Body,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for PcmReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmReader")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl PcmReader {
    /// Build a reader over `chunk` for a format parsed from the container.
    pub fn new(mut format: AudioFormat, chunk: DataChunk) -> CodecResult<Self> {
        if format.channels == 0 {
            return Err(CodecError::format("channel count is zero"));
        }
        if format.sample_rate == 0 {
            return Err(CodecError::format("sample rate is zero"));
        }

        let min_align = u32::from(format.channels) * u32::from(bytes_per_sample(&format)?);
        if u32::from(format.block_align) < min_align {
            return Err(CodecError::format(format!(
                "block align {} is smaller than one frame ({min_align} bytes)",
                format.block_align
            )));
        }

        format.data_range = Some(chunk.range());
        format.frames = Some(chunk.len() / u64::from(format.block_align));

        let body = match format.encoding {
            Encoding::MuLaw => Body::Companded(G711Reader::new(chunk, Law::MuLaw, format.block_align)?),
            Encoding::ALaw => Body::Companded(G711Reader::new(chunk, Law::ALaw, format.block_align)?),
            _ => Body::Linear(chunk),
        };

        debug!(
            "PCM stream: {:?}, {} ch, {} Hz, {} bits, {:?} frames",
            format.encoding, format.channels, format.sample_rate, format.bits_per_sample, format.frames
        );

        Ok(Self {
            format,
            body,
            scratch: Vec::new(),
        })
    }

    fn chunk(&self) -> &DataChunk {
        match &self.body {
            Body::Linear(chunk) => chunk,
            Body::Companded(reader) => reader.chunk(),
        }
    }

    fn read_linear(&mut self, out: &mut [f32]) -> CodecResult<usize> {
        let Body::Linear(chunk) = &mut self.body else {
            return Ok(0);
        };
        let width = usize::from(self.format.bits_per_sample.div_ceil(8));
        let channels = usize::from(self.format.channels);
        let stride = usize::from(self.format.block_align);

        let frames = out.len() / channels;
        self.scratch.resize(frames * stride, 0);
        let read = chunk.read_block(&mut self.scratch)?;
        let frames = read / stride;

        let decode = sample_decoder(self.format.encoding, self.format.bits_per_sample)?;
        for frame in 0..frames {
            let base = frame * stride;
            for ch in 0..channels {
                let at = base + ch * width;
                out[frame * channels + ch] = decode(&self.scratch[at..at + width]);
            }
        }
        Ok(frames * channels)
    }

    fn read_companded(&mut self, out: &mut [f32]) -> CodecResult<usize> {
        let Body::Companded(reader) = &mut self.body else {
            return Ok(0);
        };
        let channels = usize::from(self.format.channels);
        let samples = out.len() / channels * channels;

        self.scratch.resize(samples * 2, 0);
        let written = reader.read(&mut self.scratch)?;
        let decoded = written / 2;
        for (dst, pair) in out[..decoded].iter_mut().zip(self.scratch.chunks_exact(2)) {
            *dst = f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0;
        }
        Ok(decoded)
    }
}

impl AudioSource for PcmReader {
    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn read(&mut self, out: &mut [f32]) -> CodecResult<usize> {
        if out.len() < usize::from(self.format.channels) {
            return Err(CodecError::argument(format!(
                "output buffer of {} samples is smaller than one {}-channel frame",
                out.len(),
                self.format.channels
            )));
        }
        match self.body {
            Body::Linear(_) => self.read_linear(out),
            Body::Companded(_) => self.read_companded(out),
        }
    }

    fn seek(&mut self, frame: u64) -> CodecResult<()> {
        let offset = frame
            .checked_mul(u64::from(self.format.block_align))
            .ok_or_else(|| CodecError::argument(format!("frame {frame} is out of range")))?;
        match &mut self.body {
            Body::Linear(chunk) => chunk.seek_to(offset),
            Body::Companded(reader) => reader.chunk_mut().seek_to(offset),
        }
    }

    fn can_seek(&self) -> bool {
        self.chunk().can_seek()
    }
}

fn bytes_per_sample(format: &AudioFormat) -> CodecResult<u16> {
    match (format.encoding, format.bits_per_sample) {
        (Encoding::MuLaw | Encoding::ALaw, 8)
        | (Encoding::PcmUnsigned, 8)
        | (Encoding::Pcm(_), 8 | 16 | 24 | 32)
        | (Encoding::Float(_), 32 | 64) => Ok(format.bits_per_sample / 8),
        (encoding, bits) => Err(CodecError::format(format!(
            "{bits}-bit {encoding:?} samples are not supported"
        ))),
    }
}

type SampleDecoder = fn(&[u8]) -> f32;

fn sample_decoder(encoding: Encoding, bits: u16) -> CodecResult<SampleDecoder> {
    let decoder: SampleDecoder = match (encoding, bits) {
        (Encoding::PcmUnsigned, 8) => |b| (f32::from(b[0]) - 128.0) / 128.0,
        (Encoding::Pcm(_), 8) => |b| f32::from(b[0] as i8) / 128.0,
        (Encoding::Pcm(ByteOrder::Little), 16) => |b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0,
        (Encoding::Pcm(ByteOrder::Big), 16) => |b| f32::from(i16::from_be_bytes([b[0], b[1]])) / 32768.0,
        (Encoding::Pcm(ByteOrder::Little), 24) => {
            |b| (i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8) as f32 / 8_388_608.0
        }
        (Encoding::Pcm(ByteOrder::Big), 24) => {
            |b| (i32::from_be_bytes([b[0], b[1], b[2], 0]) >> 8) as f32 / 8_388_608.0
        }
        (Encoding::Pcm(ByteOrder::Little), 32) => {
            |b| (f64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])) / 2_147_483_648.0) as f32
        }
        (Encoding::Pcm(ByteOrder::Big), 32) => {
            |b| (f64::from(i32::from_be_bytes([b[0], b[1], b[2], b[3]])) / 2_147_483_648.0) as f32
        }
        (Encoding::Float(ByteOrder::Little), 32) => {
            |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]).clamp(-1.0, 1.0)
        }
        (Encoding::Float(ByteOrder::Big), 32) => {
            |b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]).clamp(-1.0, 1.0)
        }
        (Encoding::Float(ByteOrder::Little), 64) => |b| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&b[..8]);
            (f64::from_le_bytes(raw) as f32).clamp(-1.0, 1.0)
        },
        (Encoding::Float(ByteOrder::Big), 64) => |b| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&b[..8]);
            (f64::from_be_bytes(raw) as f32).clamp(-1.0, 1.0)
        },
        (encoding, bits) => {
            return Err(CodecError::format(format!(
                "{bits}-bit {encoding:?} samples are not supported"
            )))
        }
    };
    Ok(decoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn format(encoding: Encoding, channels: u16, bits: u16) -> AudioFormat {
        AudioFormat {
            encoding,
            channels,
            sample_rate: 8000,
            bits_per_sample: bits,
            block_align: channels * bits.div_ceil(8),
            data_range: None,
            frames: None,
        }
    }

    fn reader(encoding: Encoding, channels: u16, bits: u16, data: Vec<u8>) -> PcmReader {
        let len = data.len() as u64;
        let chunk = DataChunk::new(ByteStream::from_bytes(data), len).unwrap();
        PcmReader::new(format(encoding, channels, bits), chunk).unwrap()
    }

    #[test]
    fn test_declared_chunk_longer_than_stream() {
        let result = DataChunk::new(ByteStream::from_bytes(vec![0u8; 4]), 16);
        assert!(matches!(
            result,
            Err(CodecError::TruncatedData {
                expected: 16,
                available: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_sequential_stream_truncated_mid_chunk() {
        let chunk = DataChunk::new(ByteStream::from_reader(Cursor::new(vec![0u8; 6])), 16).unwrap();
        let mut reader = PcmReader::new(format(Encoding::Pcm(ByteOrder::Little), 1, 16), chunk).unwrap();
        let mut out = [0f32; 8];
        assert!(matches!(
            reader.read(&mut out),
            Err(CodecError::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_read_16_bit_stereo() {
        let mut data = Vec::new();
        for sample in [16384i16, -16384, 0, i16::MIN] {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        let mut reader = reader(Encoding::Pcm(ByteOrder::Little), 2, 16, data);
        assert_eq!(reader.format().frames, Some(2));

        let mut out = [0f32; 8];
        assert_eq!(reader.read(&mut out).unwrap(), 4);
        assert_eq!(&out[..4], &[0.5, -0.5, 0.0, -1.0]);
        assert_eq!(reader.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_read_24_bit_big_endian() {
        let data = vec![0x40, 0x00, 0x00, 0xC0, 0x00, 0x00];
        let mut reader = reader(Encoding::Pcm(ByteOrder::Big), 1, 24, data);
        let mut out = [0f32; 2];
        assert_eq!(reader.read(&mut out).unwrap(), 2);
        assert_eq!(out, [0.5, -0.5]);
    }

    #[test]
    fn test_read_unsigned_8_bit() {
        let mut reader = reader(Encoding::PcmUnsigned, 1, 8, vec![128, 0, 192]);
        let mut out = [0f32; 3];
        assert_eq!(reader.read(&mut out).unwrap(), 3);
        assert_eq!(out, [0.0, -1.0, 0.5]);
    }

    #[test]
    fn test_read_companded() {
        let mut reader = reader(Encoding::MuLaw, 1, 8, vec![0xFF, 0x80]);
        let mut out = [0f32; 4];
        assert_eq!(reader.read(&mut out).unwrap(), 2);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 32124.0 / 32768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_seek_and_reread() {
        let data: Vec<u8> = [0i16, 8192, 16384]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mut reader = reader(Encoding::Pcm(ByteOrder::Little), 1, 16, data);
        assert!(reader.can_seek());

        reader.seek(2).unwrap();
        let mut out = [0f32; 1];
        reader.read(&mut out).unwrap();
        assert_eq!(out[0], 0.5);

        reader.seek(1).unwrap();
        reader.read(&mut out).unwrap();
        assert_eq!(out[0], 0.25);

        assert!(matches!(reader.seek(4), Err(CodecError::Argument(_))));
    }

    #[test]
    fn test_sequential_seek_forward_only() {
        let data: Vec<u8> = [0i16, 8192, 16384, 24576]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let chunk = DataChunk::new(ByteStream::from_reader(Cursor::new(data)), 8).unwrap();
        let mut reader = PcmReader::new(format(Encoding::Pcm(ByteOrder::Little), 1, 16), chunk).unwrap();
        assert!(!reader.can_seek());

        reader.seek(2).unwrap();
        let mut out = [0f32; 1];
        reader.read(&mut out).unwrap();
        assert_eq!(out[0], 0.5);

        assert!(matches!(reader.seek(0), Err(CodecError::Argument(_))));
    }

    #[test]
    fn test_unsupported_width_rejected() {
        let chunk = DataChunk::new(ByteStream::from_bytes(vec![0u8; 4]), 4).unwrap();
        let result = PcmReader::new(format(Encoding::Pcm(ByteOrder::Little), 1, 12), chunk);
        assert!(matches!(result, Err(CodecError::Format(_))));
    }
}
