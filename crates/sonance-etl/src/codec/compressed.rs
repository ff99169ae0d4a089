//! MP3 and Ogg Vorbis decoding through symphonia.

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_MP3, CODEC_TYPE_VORBIS};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::codec::source::ByteStream;
use crate::codec::{AudioFormat, AudioSource, ContainerKind, Encoding};
use crate::error::{CodecError, CodecResult};

fn map_err(err: SymphoniaError) -> CodecError {
    match err {
        SymphoniaError::Unsupported(what) => CodecError::format(what),
        SymphoniaError::IoError(e) => CodecError::Io(e),
        other => CodecError::Decoder(other.to_string()),
    }
}

/// Adapts a symphonia format reader and decoder to [`AudioSource`].
pub struct CompressedReader {
    format: AudioFormat,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    seekable: bool,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<f32>,
    pending_pos: usize,
    /// Frames handed to the caller since the start or the last seek.
    position: u64,
    finished: bool,
}

impl std::fmt::Debug for CompressedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedReader")
            .field("format", &self.format)
            .field("track_id", &self.track_id)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl CompressedReader {
    pub fn open(stream: ByteStream, kind: ContainerKind) -> CodecResult<Self> {
        let seekable = stream.can_seek();
        let mss = MediaSourceStream::new(Box::new(stream), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        hint.with_extension(kind.extension());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(map_err)?;
        let reader = probed.format;

        let track = reader
            .default_track()
            .ok_or_else(|| CodecError::format("no audio track found"))?;
        let params = track.codec_params.clone();
        let track_id = track.id;

        let encoding = match params.codec {
            c if c == CODEC_TYPE_MP3 => Encoding::Mp3,
            c if c == CODEC_TYPE_VORBIS => Encoding::Vorbis,
            other => {
                return Err(CodecError::format(format!(
                    "unsupported codec {other:?} in {kind:?} container"
                )))
            }
        };

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| CodecError::format("stream does not declare a sample rate"))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .filter(|&c| c > 0)
            .ok_or_else(|| CodecError::format("stream does not declare its channels"))?;
        let channels = u16::try_from(channels)
            .map_err(|_| CodecError::format(format!("{channels} channels is too many")))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(map_err)?;

        debug!("{encoding:?} stream: {channels} ch, {sample_rate} Hz, {:?} frames", params.n_frames);

        Ok(Self {
            format: AudioFormat {
                encoding,
                channels,
                sample_rate,
                bits_per_sample: 0,
                block_align: 0,
                data_range: None,
                frames: params.n_frames,
            },
            reader,
            decoder,
            track_id,
            seekable,
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            position: 0,
            finished: false,
        })
    }

    /// Decode the next packet of our track into `pending`. Returns false at
    /// end of stream.
    fn decode_next(&mut self) -> CodecResult<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(map_err(e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = *audio_buf.spec();
                    let frames = audio_buf.capacity() as u64;
                    let buf = self
                        .sample_buf
                        .get_or_insert_with(|| SampleBuffer::<f32>::new(frames, spec));
                    buf.copy_interleaved_ref(audio_buf);
                    self.pending.clear();
                    self.pending.extend_from_slice(buf.samples());
                    self.pending_pos = 0;
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {e}");
                }
                Err(e) => return Err(map_err(e)),
            }
        }
    }

    /// Decode and drop `frames` frames.
    fn discard(&mut self, frames: u64) -> CodecResult<()> {
        let channels = usize::from(self.format.channels);
        let mut scratch = vec![0f32; 4096 * channels];
        let mut left = frames;
        while left > 0 {
            let want = usize::try_from(left).map_or(4096, |l| l.min(4096)) * channels;
            let n = self.read(&mut scratch[..want])?;
            if n == 0 {
                break;
            }
            left -= (n / channels) as u64;
        }
        Ok(())
    }
}

impl AudioSource for CompressedReader {
    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn read(&mut self, out: &mut [f32]) -> CodecResult<usize> {
        let channels = usize::from(self.format.channels);
        let wanted = out.len() / channels * channels;
        if wanted == 0 {
            return Err(CodecError::argument(format!(
                "output buffer of {} samples is smaller than one {channels}-channel frame",
                out.len()
            )));
        }

        let mut written = 0;
        while written < wanted {
            if self.pending_pos >= self.pending.len() {
                if self.finished || !self.decode_next()? {
                    self.finished = true;
                    break;
                }
                continue;
            }
            let n = (self.pending.len() - self.pending_pos).min(wanted - written);
            out[written..written + n]
                .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
            self.pending_pos += n;
            written += n;
        }

        self.position += (written / channels) as u64;
        Ok(written)
    }

    fn seek(&mut self, frame: u64) -> CodecResult<()> {
        if !self.seekable {
            if frame < self.position {
                return Err(CodecError::argument(
                    "cannot seek backwards on a sequential stream",
                ));
            }
            return self.discard(frame - self.position);
        }

        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(map_err)?;
        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        self.finished = false;
        self.position = seeked.actual_ts;

        // Packet boundaries rarely land on the requested frame.
        self.discard(seeked.required_ts.saturating_sub(seeked.actual_ts))?;
        self.position = frame;
        Ok(())
    }

    fn can_seek(&self) -> bool {
        self.seekable
    }
}
