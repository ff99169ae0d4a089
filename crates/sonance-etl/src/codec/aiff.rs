//! AIFF and AIFF-C parsing.
//!
//! Chunks are big-endian and word aligned. `COMM` carries the channel
//! count, frame count, sample size and an 80-bit extended sample rate;
//! AIFF-C adds a compression type. `SSND` carries an offset and block size
//! followed by the sample data.

use log::debug;

use crate::codec::extended::extended_to_f64;
use crate::codec::pcm::{DataChunk, PcmReader};
use crate::codec::source::ByteStream;
use crate::codec::{AudioFormat, ByteOrder, Encoding};
use crate::error::{CodecError, CodecResult};

const MAX_COMM_SIZE: u32 = 1024;

/// Parse an AIFF/AIFC header and position a reader at the sample data.
///
/// `SSND` may precede `COMM` on seekable streams; sequential streams must
/// declare `COMM` first.
pub fn open(mut stream: ByteStream) -> CodecResult<PcmReader> {
    let mut header = [0u8; 12];
    stream.read_exact_or_truncated("FORM header", &mut header)?;
    if &header[..4] != b"FORM" {
        return Err(CodecError::format("not an IFF FORM stream"));
    }
    let aifc = match &header[8..] {
        b"AIFF" => false,
        b"AIFC" => true,
        other => {
            return Err(CodecError::format(format!(
                "unsupported FORM type {:?}",
                String::from_utf8_lossy(other)
            )))
        }
    };

    let mut comm: Option<(AudioFormat, u32)> = None;
    let mut deferred_ssnd: Option<(u64, u64)> = None;

    loop {
        let Some((id, size)) = next_chunk(&mut stream)? else {
            return Err(CodecError::format(if comm.is_some() {
                "AIFF stream has no SSND chunk"
            } else {
                "AIFF stream has no COMM chunk"
            }));
        };

        match &id {
            b"COMM" => {
                if size > MAX_COMM_SIZE {
                    return Err(CodecError::format(format!("COMM chunk of {size} bytes")));
                }
                stream.ensure_available("COMM chunk", u64::from(size))?;
                let mut body = vec![0u8; size as usize];
                stream.read_exact_or_truncated("COMM chunk", &mut body)?;
                skip_pad(&mut stream, u64::from(size))?;

                let (format, frames) = parse_comm(&body, aifc)?;
                if let Some((data_start, data_len)) = deferred_ssnd {
                    stream.seek_to(data_start)?;
                    return sample_reader(format, frames, stream, data_len);
                }
                comm = Some((format, frames));
            }
            b"SSND" => {
                let data_len = read_ssnd_header(&mut stream, size)?;
                if let Some((format, frames)) = comm {
                    return sample_reader(format, frames, stream, data_len);
                }
                if !stream.can_seek() {
                    return Err(CodecError::format(
                        "SSND chunk precedes COMM on a sequential stream",
                    ));
                }
                deferred_ssnd = Some((stream.position(), data_len));
                stream.skip("SSND chunk", data_len + (data_len & 1))?;
            }
            _ => {
                debug!("Skipping AIFF chunk {:?} ({size} bytes)", String::from_utf8_lossy(&id));
                stream.skip("AIFF chunk", u64::from(size) + u64::from(size & 1))?;
            }
        }
    }
}

fn next_chunk(stream: &mut ByteStream) -> CodecResult<Option<([u8; 4], u32)>> {
    if stream.peek(1)?.is_empty() {
        return Ok(None);
    }
    let mut header = [0u8; 8];
    stream.read_exact_or_truncated("chunk header", &mut header)?;
    let id = [header[0], header[1], header[2], header[3]];
    let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Ok(Some((id, size)))
}

fn skip_pad(stream: &mut ByteStream, size: u64) -> CodecResult<()> {
    if size & 1 == 1 && !stream.peek(1)?.is_empty() {
        stream.skip("chunk padding", 1)?;
    }
    Ok(())
}

/// Consume the SSND offset/block-size header and the leading offset bytes,
/// returning the length of the sample data that follows.
fn read_ssnd_header(stream: &mut ByteStream, size: u32) -> CodecResult<u64> {
    let mut header = [0u8; 8];
    stream.read_exact_or_truncated("SSND header", &mut header)?;
    let offset = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);

    let data_len = size
        .checked_sub(8)
        .and_then(|rest| rest.checked_sub(offset))
        .ok_or_else(|| {
            CodecError::format(format!("SSND offset {offset} exceeds chunk size {size}"))
        })?;
    stream.skip("SSND offset", u64::from(offset))?;
    Ok(u64::from(data_len))
}

fn sample_reader(
    format: AudioFormat,
    frames: u32,
    stream: ByteStream,
    data_len: u64,
) -> CodecResult<PcmReader> {
    // COMM's frame count bounds the data; SSND may carry trailing padding.
    let declared = u64::from(frames) * u64::from(format.block_align);
    let chunk = DataChunk::new(stream, data_len.min(declared))?;
    PcmReader::new(format, chunk)
}

fn parse_comm(body: &[u8], aifc: bool) -> CodecResult<(AudioFormat, u32)> {
    let required = if aifc { 22 } else { 18 };
    if body.len() < required {
        return Err(CodecError::TruncatedData {
            context: "COMM chunk",
            expected: required as u64,
            available: body.len() as u64,
        });
    }

    let channels = u16::from_be_bytes([body[0], body[1]]);
    let frames = u32::from_be_bytes([body[2], body[3], body[4], body[5]]);
    let bits = u16::from_be_bytes([body[6], body[7]]);
    let mut rate_bytes = [0u8; 10];
    rate_bytes.copy_from_slice(&body[8..18]);
    let rate = extended_to_f64(rate_bytes);
    if !rate.is_finite() || rate < 1.0 || rate > f64::from(u32::MAX) {
        return Err(CodecError::format(format!("invalid AIFF sample rate {rate}")));
    }

    let compression: [u8; 4] = if aifc {
        [body[18], body[19], body[20], body[21]]
    } else {
        *b"NONE"
    };

    // Integer samples are left-justified in whole bytes.
    let (encoding, bits_per_sample) = match &compression {
        b"NONE" | b"twos" => (Encoding::Pcm(ByteOrder::Big), bits.div_ceil(8) * 8),
        b"sowt" => (Encoding::Pcm(ByteOrder::Little), bits.div_ceil(8) * 8),
        b"fl32" | b"FL32" => (Encoding::Float(ByteOrder::Big), 32),
        b"fl64" | b"FL64" => (Encoding::Float(ByteOrder::Big), 64),
        b"ulaw" | b"ULAW" => (Encoding::MuLaw, 8),
        b"alaw" | b"ALAW" => (Encoding::ALaw, 8),
        other => {
            return Err(CodecError::format(format!(
                "unsupported AIFC compression {:?}",
                String::from_utf8_lossy(other)
            )))
        }
    };

    let block_align = u16::try_from(u32::from(channels) * u32::from(bits_per_sample / 8))
        .map_err(|_| CodecError::format(format!("{channels} channels is too many")))?;

    let format = AudioFormat {
        encoding,
        channels,
        sample_rate: rate.round() as u32,
        bits_per_sample,
        block_align,
        data_range: None,
        frames: None,
    };
    Ok((format, frames))
}
