use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::FrameError;
use crate::frame::{Command, Response};
use crate::reassembler::{extract_frame, Extraction, ReassemblerConfig};

/// `tokio_util` codec: decodes [`Response`]s, encodes [`Command`]s.
///
/// Decoding shares the scanning routine of the blocking reassembler. Note
/// that `FramedRead` ends the stream after the first decode error.
#[derive(Debug, Clone, Default)]
pub struct TcmpCodec {
    config: ReassemblerConfig,
}

impl TcmpCodec {
    /// Create a codec with default reassembly configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with explicit reassembly configuration.
    pub fn with_config(config: ReassemblerConfig) -> Self {
        Self { config }
    }
}

impl Decoder for TcmpCodec {
    type Item = Response;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match extract_frame(src, self.config.resync) {
            Extraction::Frame(frame) => Ok(Some(Response::classify(frame))),
            Extraction::NeedMoreData => {
                if src.len() > self.config.max_buffer_size {
                    let size = src.len();
                    warn!(size, "codec buffer overflow; clearing");
                    src.clear();
                    return Err(FrameError::BufferOverflow {
                        size,
                        max: self.config.max_buffer_size,
                    });
                }
                Ok(None)
            }
            Extraction::Corrupt(header) => Err(FrameError::HeaderCorruption {
                len1: header.len1,
                len0: header.len0,
                lcs: header.lcs,
            }),
        }
    }
}

impl Encoder<Command> for TcmpCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}
