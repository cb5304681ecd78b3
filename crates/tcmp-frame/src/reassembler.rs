//! Stream reassembly: turns an append-only byte stream into validated frames.
//!
//! Scanning works on a single `BytesMut`. Each step looks for the start
//! marker, validates the header at that position and either
//! - extracts the frame (the consumed span and any noise before it leave
//!   the buffer),
//! - waits for more bytes, keeping the candidate start in place,
//! - steps one byte past a start marker whose computed end position does
//!   not hold an end marker (a payload byte equal to the marker), or
//! - reports a corrupt header and applies the [`Resync`] policy.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{Header, END_MARKER, MIN_FRAME_SIZE, START_MARKER};
use crate::error::{FrameError, Result};
use crate::frame::{Frame, Response};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Default cap on buffered, not-yet-framed input: 128 KiB.
pub const DEFAULT_MAX_BUFFER: usize = 128 * 1024;

/// What to do with buffered input after a corrupt header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resync {
    /// Drop everything buffered.
    #[default]
    DiscardBuffer,
    /// Drop only the corrupt start marker and keep scanning after it.
    SkipMarker,
}

/// Outcome of one extraction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// A complete, validated frame was removed from the buffer.
    Frame(Frame),
    /// The buffer holds no complete frame yet.
    NeedMoreData,
    /// The header at the candidate start failed validation.
    Corrupt(Header),
}

/// Run one extraction step over `src`.
///
/// Bytes ahead of the first viable start marker are dropped: they cannot
/// begin a frame. A candidate whose header is valid but whose frame is not
/// yet complete stays at the front of `src`.
pub fn extract_frame(src: &mut BytesMut, resync: Resync) -> Extraction {
    let mut pos = 0usize;
    loop {
        let Some(offset) = src[pos..].iter().position(|&b| b == START_MARKER) else {
            if !src.is_empty() {
                trace!(discarded = src.len(), "no start marker in buffer");
                src.clear();
            }
            return Extraction::NeedMoreData;
        };
        let start = pos + offset;
        let available = src.len() - start;

        if available < MIN_FRAME_SIZE {
            src.advance(start);
            return Extraction::NeedMoreData;
        }

        let header = Header::from_bytes(src[start + 1], src[start + 2], src[start + 3]);
        if !header.is_valid() {
            match resync {
                Resync::DiscardBuffer => src.clear(),
                Resync::SkipMarker => src.advance(start + 1),
            }
            return Extraction::Corrupt(header);
        }

        let frame_size = header.frame_size();
        if available < frame_size {
            src.advance(start);
            return Extraction::NeedMoreData;
        }

        if src[start + frame_size - 1] != END_MARKER {
            trace!(
                position = start,
                frame_size,
                "start marker without matching end marker; skipping one byte"
            );
            pos = start + 1;
            continue;
        }

        src.advance(start);
        let raw = src.split_to(frame_size).freeze();
        return Extraction::Frame(Frame::from_wire(raw));
    }
}

/// Configuration for the [`Reassembler`].
#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    /// Maximum buffered bytes before the buffer is cleared. Default: 128 KiB.
    pub max_buffer_size: usize,
    /// Recovery policy after a corrupt header. Default: discard the buffer.
    pub resync: Resync,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER,
            resync: Resync::default(),
        }
    }
}

/// Counters describing what the reassembler has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    pub frames: u64,
    pub corrupt_headers: u64,
    pub overflows: u64,
    pub discarded_bytes: u64,
}

/// Buffers transport input and extracts classified responses.
///
/// Owns the only copy of not-yet-consumed input for one connection.
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
    config: ReassemblerConfig,
    stats: ReassemblerStats,
}

impl Reassembler {
    /// Create a reassembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(ReassemblerConfig::default())
    }

    /// Create a reassembler with explicit configuration.
    pub fn with_config(config: ReassemblerConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            stats: ReassemblerStats::default(),
        }
    }

    /// Append `data` and extract every complete frame.
    ///
    /// Corrupt headers and overflows show up as `Err` items in stream order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<Response>> {
        self.extend(data);
        let mut out = Vec::new();
        while let Some(item) = self.next_response() {
            out.push(item);
        }
        out
    }

    /// Append `data` without extracting.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next response from what is already buffered.
    ///
    /// Returns `None` when more input is needed.
    pub fn next_response(&mut self) -> Option<Result<Response>> {
        let before = self.buf.len();
        let extraction = extract_frame(&mut self.buf, self.config.resync);
        let consumed = before - self.buf.len();

        match extraction {
            Extraction::Frame(frame) => {
                self.stats.frames += 1;
                self.stats.discarded_bytes += (consumed - frame.wire_len()) as u64;
                debug!(
                    family = frame.family().value(),
                    code = frame.response_code(),
                    payload_len = frame.payload().len(),
                    "extracted frame"
                );
                Some(Ok(Response::classify(frame)))
            }
            Extraction::NeedMoreData => {
                self.stats.discarded_bytes += consumed as u64;
                if self.buf.len() > self.config.max_buffer_size {
                    let size = self.buf.len();
                    warn!(
                        size,
                        max = self.config.max_buffer_size,
                        "reassembly buffer overflow; clearing"
                    );
                    self.buf.clear();
                    self.stats.overflows += 1;
                    self.stats.discarded_bytes += size as u64;
                    return Some(Err(FrameError::BufferOverflow {
                        size,
                        max: self.config.max_buffer_size,
                    }));
                }
                None
            }
            Extraction::Corrupt(header) => {
                self.stats.corrupt_headers += 1;
                self.stats.discarded_bytes += consumed as u64;
                warn!(
                    len1 = header.len1,
                    len0 = header.len0,
                    lcs = header.lcs,
                    resync = ?self.config.resync,
                    "corrupt frame header"
                );
                Some(Err(FrameError::HeaderCorruption {
                    len1: header.len1,
                    len0: header.len0,
                    lcs: header.lcs,
                }))
            }
        }
    }

    /// Drop all buffered input.
    pub fn reset(&mut self) {
        if !self.buf.is_empty() {
            debug!(discarded = self.buf.len(), "reassembler reset");
            self.stats.discarded_bytes += self.buf.len() as u64;
        }
        self.buf.clear();
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The buffered bytes.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    pub fn config(&self) -> &ReassemblerConfig {
        &self.config
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
