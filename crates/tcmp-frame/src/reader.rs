use std::io::{ErrorKind, Read};

use crate::error::{FrameError, Result};
use crate::frame::Response;
use crate::reassembler::{Reassembler, ReassemblerConfig, ReassemblerStats};

const READ_CHUNK_SIZE: usize = 1024;

/// Reads classified responses from any `Read` stream.
///
/// Handles partial reads internally. Callers always get complete frames, or
/// the header-corruption and overflow errors the reassembler reports.
pub struct FrameReader<T> {
    inner: T,
    reassembler: Reassembler,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, ReassemblerConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: ReassemblerConfig) -> Self {
        Self {
            inner,
            reassembler: Reassembler::with_config(config),
        }
    }

    /// Read the next complete response (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some(item) = self.reassembler.next_response() {
                return item;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.reassembler.extend(&chunk[..read]);
        }
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.reassembler.reset();
    }

    /// Reassembly counters.
    pub fn stats(&self) -> ReassemblerStats {
        self.reassembler.stats()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Response>;

    /// Yields responses until the stream is closed.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_response() {
            Err(FrameError::ConnectionClosed) => None,
            other => Some(other),
        }
    }
}
