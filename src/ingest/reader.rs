//! Frame reader
//!
//! Splits a producer byte stream into discrete values for a hub. An encoder
//! pipeline emitting multipart JPEG is relayed in chunks as they arrive; a raw
//! camera feed is cut into frames of exactly one image each.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Largest chunk taken from a relayed byte stream in one read
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// How a byte stream is cut into values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Each read yields one chunk of at most `max_size` bytes
    Chunked {
        /// Upper bound for a single chunk
        max_size: usize,
    },
    /// Each value is exactly `frame_size` bytes
    Fixed {
        /// Bytes per frame, e.g. width * height * channels
        frame_size: usize,
    },
}

impl FrameMode {
    /// Raw pixel frames of the given geometry
    pub fn raw_frames(width: usize, height: usize, channels: usize) -> Self {
        FrameMode::Fixed {
            frame_size: width * height * channels,
        }
    }
}

impl Default for FrameMode {
    fn default() -> Self {
        FrameMode::Chunked {
            max_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Reads values out of a producer byte stream
///
/// Frames are split off one shared `BytesMut`. Its memory is only reused once
/// every `Bytes` handed out from it has been dropped, so a slow subscriber
/// can never see a frame overwritten under it.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    mode: FrameMode,
    buf: BytesMut,
    frames_read: u64,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with the given framing
    pub fn new(reader: R, mode: FrameMode) -> Self {
        Self {
            reader,
            mode,
            buf: BytesMut::new(),
            frames_read: 0,
            bytes_read: 0,
        }
    }

    /// Read the next value.
    ///
    /// Returns `Ok(None)` when the stream ends on a frame boundary. A fixed
    /// frame size of zero yields no frames at all.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let frame = match self.mode {
            FrameMode::Chunked { max_size } => self.read_chunk(max_size).await?,
            FrameMode::Fixed { frame_size } => self.read_fixed(frame_size).await?,
        };

        if let Some(ref frame) = frame {
            self.frames_read += 1;
            self.bytes_read += frame.len() as u64;
        }
        Ok(frame)
    }

    async fn read_chunk(&mut self, max_size: usize) -> Result<Option<Bytes>> {
        self.buf.resize(max_size.max(1), 0);
        let n = self.reader.read(&mut self.buf[..]).await?;
        if n == 0 {
            self.buf.clear();
            return Ok(None);
        }

        self.buf.truncate(n);
        Ok(Some(self.buf.split().freeze()))
    }

    async fn read_fixed(&mut self, frame_size: usize) -> Result<Option<Bytes>> {
        // Empty frames carry nothing and would never reach end of stream
        if frame_size == 0 {
            return Ok(None);
        }
        self.buf.resize(frame_size, 0);

        let mut filled = 0;
        while filled < frame_size {
            let n = self.reader.read(&mut self.buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.buf.clear();
            return Ok(None);
        }
        if filled < frame_size {
            self.buf.clear();
            return Err(Error::TruncatedFrame {
                expected: frame_size,
                got: filled,
            });
        }

        Ok(Some(self.buf.split().freeze()))
    }

    /// Framing in use
    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Values read so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Payload bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Get back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}
