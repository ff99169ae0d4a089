//! Container parsing and decoding into interleaved `f32` PCM.
//!
//! Each supported container is read through one [`AudioSource`]
//! implementation, chosen by [`ContainerKind`]:
//!
//! - WAV and AIFF/AIFC are parsed here and read by [`PcmReader`], including
//!   G.711 companded data.
//! - MP3 and Ogg Vorbis are delegated to symphonia through
//!   [`CompressedReader`].

pub mod aiff;
pub mod compressed;
pub mod extended;
pub mod g711;
pub mod pcm;
pub mod source;
pub mod wav;

use std::ops::Range;
use std::path::Path;

use log::debug;

pub use compressed::CompressedReader;
pub use g711::{G711Reader, Law};
pub use pcm::{DataChunk, PcmReader};
pub use source::ByteStream;

use crate::error::{CodecError, CodecResult};

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Sample encoding of a stream, as declared by its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Signed integer PCM.
    Pcm(ByteOrder),
    /// Unsigned 8-bit PCM (WAV).
    PcmUnsigned,
    /// IEEE float PCM.
    Float(ByteOrder),
    MuLaw,
    ALaw,
    Mp3,
    Vorbis,
}

/// Decode descriptor derived from container headers. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormat {
    pub encoding: Encoding,
    pub channels: u16,
    pub sample_rate: u32,
    /// Bits per encoded sample; 0 for compressed codecs.
    pub bits_per_sample: u16,
    /// Bytes per interleaved frame; 0 for compressed codecs.
    pub block_align: u16,
    /// Stream offsets of the sample data, for uncompressed containers.
    pub data_range: Option<Range<u64>>,
    /// Frame count, when the container declares it.
    pub frames: Option<u64>,
}

/// Container variants understood by [`open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Aiff,
    Wav,
    Mp3,
    Ogg,
}

impl ContainerKind {
    /// Number of leading bytes [`ContainerKind::detect`] inspects.
    pub const MAGIC_LEN: usize = 12;

    /// Identify a container from its leading bytes.
    #[must_use]
    pub fn detect(magic: &[u8]) -> Option<Self> {
        match magic {
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(Self::Wav),
            [b'F', b'O', b'R', b'M', _, _, _, _, b'A', b'I', b'F', b'F' | b'C', ..] => Some(Self::Aiff),
            [b'O', b'g', b'g', b'S', ..] => Some(Self::Ogg),
            [b'I', b'D', b'3', ..] => Some(Self::Mp3),
            [0xFF, sync, ..] if sync & 0xE0 == 0xE0 => Some(Self::Mp3),
            _ => None,
        }
    }

    /// Guess a container from a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "aif" | "aiff" | "aifc" => Some(Self::Aiff),
            "mp3" => Some(Self::Mp3),
            "ogg" | "oga" => Some(Self::Ogg),
            _ => None,
        }
    }

    /// Canonical extension, used as a probe hint.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Aiff => "aiff",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }
}

/// A decoder presenting any container as interleaved `f32` samples.
pub trait AudioSource: Send {
    fn format(&self) -> &AudioFormat;

    /// Read up to `buf.len()` interleaved samples, rounded down to whole
    /// frames. Returns the number of samples written; 0 at end of stream.
    fn read(&mut self, buf: &mut [f32]) -> CodecResult<usize>;

    /// Position the stream at `frame`. Sequential streams only move forward.
    fn seek(&mut self, frame: u64) -> CodecResult<()>;

    fn can_seek(&self) -> bool;
}

/// Fully decoded audio.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples in `[-1, 1]`.
    pub samples: Vec<f32>,
    pub format: AudioFormat,
}

impl DecodedAudio {
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.format.channels.max(1))
    }

    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.format.sample_rate.max(1))
    }
}

/// Open a decoder for `stream`.
///
/// The container is identified from its magic bytes; `hint` (usually the
/// file extension's kind) is used only when the magic is unrecognized.
pub fn open(
    mut stream: ByteStream,
    hint: Option<ContainerKind>,
) -> CodecResult<Box<dyn AudioSource>> {
    let magic = stream.peek(ContainerKind::MAGIC_LEN)?;
    if magic.is_empty() {
        return Err(CodecError::argument("stream is empty"));
    }

    let kind = ContainerKind::detect(magic)
        .or(hint)
        .ok_or_else(|| CodecError::format(format!("unrecognized container magic {magic:02X?}")))?;
    debug!("Detected {kind:?} container");

    let source: Box<dyn AudioSource> = match kind {
        ContainerKind::Wav => Box::new(wav::open(stream)?),
        ContainerKind::Aiff => Box::new(aiff::open(stream)?),
        ContainerKind::Mp3 | ContainerKind::Ogg => Box::new(CompressedReader::open(stream, kind)?),
    };
    Ok(source)
}

/// Read every remaining sample from `source`.
pub fn read_to_end(source: &mut dyn AudioSource) -> CodecResult<Vec<f32>> {
    const CHUNK_FRAMES: usize = 4096;

    let channels = usize::from(source.format().channels.max(1));
    let mut buf = vec![0f32; CHUNK_FRAMES * channels];
    let mut samples = Vec::new();
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        samples.extend_from_slice(&buf[..n]);
    }
    Ok(samples)
}

/// Decode a whole stream into PCM.
pub fn decode(stream: ByteStream, hint: Option<ContainerKind>) -> CodecResult<DecodedAudio> {
    let mut source = open(stream, hint)?;
    let samples = read_to_end(source.as_mut())?;
    let mut format = source.format().clone();
    if format.frames.is_none() {
        format.frames = Some((samples.len() / usize::from(format.channels.max(1))) as u64);
    }
    Ok(DecodedAudio { samples, format })
}

/// Decode a file, using its extension as the container hint.
pub fn decode_file(path: &Path) -> CodecResult<DecodedAudio> {
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ContainerKind::from_extension);
    decode(ByteStream::open(path)?, hint)
}
