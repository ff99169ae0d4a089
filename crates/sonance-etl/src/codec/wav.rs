//! RIFF/WAVE parsing.

use log::debug;

use crate::codec::pcm::{DataChunk, PcmReader};
use crate::codec::source::ByteStream;
use crate::codec::{AudioFormat, ByteOrder, Encoding};
use crate::error::{CodecError, CodecResult};

const TAG_PCM: u16 = 0x0001;
const TAG_IEEE_FLOAT: u16 = 0x0003;
const TAG_ALAW: u16 = 0x0006;
const TAG_MULAW: u16 = 0x0007;
const TAG_EXTENSIBLE: u16 = 0xFFFE;

const MAX_FMT_SIZE: u32 = 1024;

/// Parse a WAV header and position a reader at the start of the data chunk.
pub fn open(mut stream: ByteStream) -> CodecResult<PcmReader> {
    let mut header = [0u8; 12];
    stream.read_exact_or_truncated("RIFF header", &mut header)?;
    if &header[..4] != b"RIFF" || &header[8..] != b"WAVE" {
        return Err(CodecError::format("not a RIFF/WAVE stream"));
    }

    let mut format = None;
    loop {
        let Some((id, size)) = next_chunk(&mut stream)? else {
            return Err(CodecError::format(if format.is_some() {
                "WAV stream has no data chunk"
            } else {
                "WAV stream has no fmt chunk"
            }));
        };

        match &id {
            b"fmt " => {
                if size > MAX_FMT_SIZE {
                    return Err(CodecError::format(format!("fmt chunk of {size} bytes")));
                }
                stream.ensure_available("fmt chunk", u64::from(size))?;
                let mut body = vec![0u8; size as usize];
                stream.read_exact_or_truncated("fmt chunk", &mut body)?;
                skip_pad(&mut stream, size)?;
                format = Some(parse_fmt(&body)?);
            }
            b"data" => {
                let Some(format) = format else {
                    return Err(CodecError::format("WAV data chunk precedes fmt chunk"));
                };
                let chunk = DataChunk::new(stream, u64::from(size))?;
                return PcmReader::new(format, chunk);
            }
            _ => {
                debug!("Skipping WAV chunk {:?} ({size} bytes)", String::from_utf8_lossy(&id));
                stream.skip("WAV chunk", u64::from(size) + u64::from(size & 1))?;
            }
        }
    }
}

/// Read the next chunk header, or `None` at a clean end of stream.
fn next_chunk(stream: &mut ByteStream) -> CodecResult<Option<([u8; 4], u32)>> {
    if stream.peek(1)?.is_empty() {
        return Ok(None);
    }
    let mut header = [0u8; 8];
    stream.read_exact_or_truncated("chunk header", &mut header)?;
    let id = [header[0], header[1], header[2], header[3]];
    let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    Ok(Some((id, size)))
}

fn skip_pad(stream: &mut ByteStream, size: u32) -> CodecResult<()> {
    if size & 1 == 1 && !stream.peek(1)?.is_empty() {
        stream.skip("chunk padding", 1)?;
    }
    Ok(())
}

fn parse_fmt(body: &[u8]) -> CodecResult<AudioFormat> {
    if body.len() < 16 {
        return Err(CodecError::TruncatedData {
            context: "fmt chunk",
            expected: 16,
            available: body.len() as u64,
        });
    }
    let u16_at = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);
    let u32_at = |at: usize| u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]]);

    let mut tag = u16_at(0);
    let channels = u16_at(2);
    let sample_rate = u32_at(4);
    let block_align = u16_at(12);
    let bits_per_sample = u16_at(14);

    if tag == TAG_EXTENSIBLE {
        // cbSize(2) validBits(2) channelMask(4) then the sub-format GUID,
        // whose first two bytes are the effective format tag.
        if body.len() < 26 {
            return Err(CodecError::TruncatedData {
                context: "WAVE_FORMAT_EXTENSIBLE fmt chunk",
                expected: 26,
                available: body.len() as u64,
            });
        }
        tag = u16_at(24);
    }

    let encoding = match (tag, bits_per_sample) {
        (TAG_PCM, 8) => Encoding::PcmUnsigned,
        (TAG_PCM, _) => Encoding::Pcm(ByteOrder::Little),
        (TAG_IEEE_FLOAT, _) => Encoding::Float(ByteOrder::Little),
        (TAG_ALAW, _) => Encoding::ALaw,
        (TAG_MULAW, _) => Encoding::MuLaw,
        (other, _) => {
            return Err(CodecError::format(format!(
                "unsupported WAV encoding tag 0x{other:04X}"
            )))
        }
    };

    Ok(AudioFormat {
        encoding,
        channels,
        sample_rate,
        bits_per_sample,
        block_align,
        data_range: None,
        frames: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AudioSource;

    fn wav_bytes(tag: u16, channels: u16, bits: u16, extra_chunk: bool, data: &[u8]) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&tag.to_le_bytes());
        fmt.extend_from_slice(&channels.to_le_bytes());
        fmt.extend_from_slice(&8000u32.to_le_bytes());
        fmt.extend_from_slice(&(8000 * u32::from(block_align)).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());

        let mut out = b"RIFF\0\0\0\0WAVE".to_vec();
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        out.extend_from_slice(&fmt);
        if extra_chunk {
            out.extend_from_slice(b"LIST\x03\0\0\0abc\0");
        }
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_parse_mulaw_with_unknown_chunk() {
        let bytes = wav_bytes(TAG_MULAW, 1, 8, true, &[0xFF, 0x80]);
        let mut reader = open(ByteStream::from_bytes(bytes)).unwrap();
        assert_eq!(reader.format().encoding, Encoding::MuLaw);
        assert_eq!(reader.format().frames, Some(2));

        let mut out = [0f32; 2];
        assert_eq!(reader.read(&mut out).unwrap(), 2);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_unsupported_tag() {
        let bytes = wav_bytes(0x0055, 1, 16, false, &[0, 0]);
        assert!(matches!(
            open(ByteStream::from_bytes(bytes)),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn test_missing_data_chunk() {
        let mut bytes = wav_bytes(TAG_PCM, 1, 16, false, &[]);
        bytes.truncate(bytes.len() - 8);
        assert!(matches!(
            open(ByteStream::from_bytes(bytes)),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn test_data_chunk_longer_than_stream() {
        let mut bytes = wav_bytes(TAG_PCM, 1, 16, false, &[0; 8]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            open(ByteStream::from_bytes(bytes)),
            Err(CodecError::TruncatedData {
                expected: 8,
                available: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_not_riff() {
        assert!(matches!(
            open(ByteStream::from_bytes(b"FORM\0\0\0\0AIFF".to_vec())),
            Err(CodecError::Format(_))
        ));
    }
}
