//! Byte-level input for the codec adapters.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use symphonia::core::io::MediaSource;

use crate::error::{CodecError, CodecResult};

/// A readable, seekable, thread-safe byte source.
pub trait ReadSeek: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> ReadSeek for T {}

enum Inner {
    Seekable(Box<dyn ReadSeek>),
    Sequential(Box<dyn Read + Send + Sync>),
}

/// An input stream handed to a codec adapter.
///
/// Seekable streams (files, in-memory buffers) know their length, so chunk
/// sizes can be checked before reading. Sequential streams can only move
/// forward; skipping discards bytes. Both support peeking a few bytes so
/// the container kind can be sniffed without consuming them.
pub struct ByteStream {
    inner: Inner,
    /// Offset of logical position 0 in a seekable source.
    base: u64,
    /// Bytes read ahead of `position` by `peek`.
    peeked: Vec<u8>,
    peek_pos: usize,
    position: u64,
    len: Option<u64>,
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("seekable", &self.can_seek())
            .field("position", &self.position)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl ByteStream {
    /// Open a file for decoding.
    pub fn open(path: impl AsRef<Path>) -> CodecResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CodecError::argument(format!("cannot open {}: {e}", path.display()))
        })?;
        let len = file.metadata()?.len();
        Ok(Self::new(Inner::Seekable(Box::new(file)), 0, Some(len)))
    }

    /// Decode from an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self::new(Inner::Seekable(Box::new(Cursor::new(bytes))), 0, Some(len))
    }

    /// Wrap any seekable reader, starting at its current position.
    pub fn from_seekable<R: ReadSeek + 'static>(mut reader: R) -> CodecResult<Self> {
        let base = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(base))?;
        Ok(Self::new(
            Inner::Seekable(Box::new(reader)),
            base,
            Some(end.saturating_sub(base)),
        ))
    }

    /// Wrap a forward-only reader (pipe, socket, decompressor).
    pub fn from_reader<R: Read + Send + Sync + 'static>(reader: R) -> Self {
        Self::new(Inner::Sequential(Box::new(reader)), 0, None)
    }

    fn new(inner: Inner, base: u64, len: Option<u64>) -> Self {
        Self {
            inner,
            base,
            peeked: Vec::new(),
            peek_pos: 0,
            position: 0,
            len,
        }
    }

    #[must_use]
    pub const fn can_seek(&self) -> bool {
        matches!(self.inner, Inner::Seekable(_))
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Total length, when known.
    #[must_use]
    pub const fn len(&self) -> Option<u64> {
        self.len
    }

    /// Bytes left before the end of the stream, when known.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.len.map(|len| len.saturating_sub(self.position))
    }

    /// Look at up to `n` upcoming bytes without consuming them.
    ///
    /// Returns fewer than `n` bytes only at end of stream.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        let mut chunk = [0u8; 64];
        while self.peeked.len() - self.peek_pos < n {
            let want = (n - (self.peeked.len() - self.peek_pos)).min(chunk.len());
            let read = match &mut self.inner {
                Inner::Seekable(r) => r.read(&mut chunk[..want])?,
                Inner::Sequential(r) => r.read(&mut chunk[..want])?,
            };
            if read == 0 {
                break;
            }
            self.peeked.extend_from_slice(&chunk[..read]);
        }
        let end = (self.peek_pos + n).min(self.peeked.len());
        Ok(&self.peeked[self.peek_pos..end])
    }

    /// Fail with `TruncatedData` if fewer than `declared` bytes are known to
    /// remain. Sequential streams are checked when the bytes are read.
    pub fn ensure_available(&self, context: &'static str, declared: u64) -> CodecResult<()> {
        match self.remaining() {
            Some(available) if available < declared => Err(CodecError::TruncatedData {
                context,
                expected: declared,
                available,
            }),
            _ => Ok(()),
        }
    }

    /// Fill `buf` completely or fail with `TruncatedData`.
    pub fn read_exact_or_truncated(
        &mut self,
        context: &'static str,
        buf: &mut [u8],
    ) -> CodecResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(CodecError::TruncatedData {
                        context,
                        expected: buf.len() as u64,
                        available: filled as u64,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Move forward `n` bytes: seek when possible, otherwise discard.
    pub fn skip(&mut self, context: &'static str, n: u64) -> CodecResult<()> {
        if self.can_seek() {
            self.ensure_available(context, n)?;
            self.seek_to(self.position + n)?;
            return Ok(());
        }

        let discarded = io::copy(&mut self.by_ref().take(n), &mut io::sink())?;
        if discarded < n {
            return Err(CodecError::TruncatedData {
                context,
                expected: n,
                available: discarded,
            });
        }
        Ok(())
    }

    /// Seek to an absolute logical position (seekable streams only).
    pub fn seek_to(&mut self, target: u64) -> io::Result<()> {
        match &mut self.inner {
            Inner::Seekable(r) => {
                r.seek(SeekFrom::Start(self.base + target))?;
                self.peeked.clear();
                self.peek_pos = 0;
                self.position = target;
                Ok(())
            }
            Inner::Sequential(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream is not seekable",
            )),
        }
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = if self.peek_pos < self.peeked.len() {
            let n = (self.peeked.len() - self.peek_pos).min(buf.len());
            buf[..n].copy_from_slice(&self.peeked[self.peek_pos..self.peek_pos + n]);
            self.peek_pos += n;
            if self.peek_pos == self.peeked.len() {
                self.peeked.clear();
                self.peek_pos = 0;
            }
            n
        } else {
            match &mut self.inner {
                Inner::Seekable(r) => r.read(buf)?,
                Inner::Sequential(r) => r.read(buf)?,
            }
        };

        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ByteStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self
                .len
                .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "unknown length"))?
                .checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.seek_to(target)?;
        Ok(target)
    }
}

impl MediaSource for ByteStream {
    fn is_seekable(&self) -> bool {
        self.can_seek()
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}
