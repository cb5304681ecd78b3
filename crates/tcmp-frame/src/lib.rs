//! TCMP framing: frame model, header codec and stream reassembly.
//!
//! Every message on the wire is delimited and length-checked:
//! - a `0x7E` start marker and a `0x7E` end marker
//! - two big-endian length bytes plus an additive length checksum (LCS)
//! - a 2-byte command family, a 1-byte code, the payload and a 2-byte trailer
//!
//! The [`Reassembler`] turns a fragmented, possibly noisy byte stream into
//! classified [`Response`]s without ever mistaking a payload byte for a
//! delimiter.

pub mod codec;
pub mod error;
pub mod family;
pub mod frame;
pub mod reassembler;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    crc16_a, encode_frame, encode_header, validate_header, Header, END_MARKER, MAX_PAYLOAD,
    MIN_FRAME_SIZE, START_MARKER,
};
pub use error::{FrameError, Result};
pub use family::{family_name, CommandFamily, APPLICATION_ERROR};
pub use frame::{ApplicationError, Command, ErrorFrame, Frame, Response};
pub use reader::FrameReader;
pub use reassembler::{
    extract_frame, Extraction, Reassembler, ReassemblerConfig, ReassemblerStats, Resync,
};
pub use writer::CommandWriter;

#[cfg(feature = "async")]
pub use async_codec::TcmpCodec;
