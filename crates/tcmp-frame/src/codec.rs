use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::family::CommandFamily;

/// Frame start marker.
pub const START_MARKER: u8 = 0x7E;

/// Frame end marker.
pub const END_MARKER: u8 = 0x7E;

/// Bytes counted by the declared length on top of the payload:
/// family (2) + response code (1) + trailer (2).
pub const LENGTH_OVERHEAD: usize = 5;

/// Bytes of a frame outside the declared length: start marker, len1, len0,
/// lcs and end marker.
pub const ENVELOPE_SIZE: usize = 5;

/// Smallest possible frame (empty payload).
pub const MIN_FRAME_SIZE: usize = LENGTH_OVERHEAD + ENVELOPE_SIZE;

/// Largest payload the 16-bit declared length can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - LENGTH_OVERHEAD;

/// Offset of the first payload byte within a frame.
pub const PAYLOAD_OFFSET: usize = 7;

/// The three length bytes following the start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub len1: u8,
    pub len0: u8,
    pub lcs: u8,
}

impl Header {
    /// Construct from raw wire bytes without validating.
    pub const fn from_bytes(len1: u8, len0: u8, lcs: u8) -> Self {
        Self { len1, len0, lcs }
    }

    /// `len1 * 256 + len0`: payload length plus [`LENGTH_OVERHEAD`].
    pub fn declared_length(&self) -> usize {
        usize::from(u16::from_be_bytes([self.len1, self.len0]))
    }

    /// Total bytes on the wire for a frame carrying this header.
    pub fn frame_size(&self) -> usize {
        self.declared_length() + ENVELOPE_SIZE
    }

    /// Payload length, or `None` if the declared length is too short.
    pub fn payload_len(&self) -> Option<usize> {
        self.declared_length().checked_sub(LENGTH_OVERHEAD)
    }

    /// Whether the checksum holds and the declared length can hold a frame.
    pub fn is_valid(&self) -> bool {
        validate_header(self.len1, self.len0, self.lcs) && self.payload_len().is_some()
    }

    /// The header as wire bytes.
    pub fn to_bytes(self) -> [u8; 3] {
        [self.len1, self.len0, self.lcs]
    }
}

/// Compute the length bytes and checksum for a payload of `payload_len` bytes.
pub fn encode_header(payload_len: usize) -> Result<Header> {
    if payload_len > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: MAX_PAYLOAD,
        });
    }
    let declared = (payload_len + LENGTH_OVERHEAD) as u16;
    let [len1, len0] = declared.to_be_bytes();
    Ok(Header {
        len1,
        len0,
        lcs: length_checksum(len1, len0),
    })
}

/// True when `(lcs + len1 + len0) mod 256 == 0`.
pub fn validate_header(len1: u8, len0: u8, lcs: u8) -> bool {
    lcs.wrapping_add(len1).wrapping_add(len0) == 0
}

/// Additive complement of the two length bytes.
pub fn length_checksum(len1: u8, len0: u8) -> u8 {
    len1.wrapping_add(len0).wrapping_neg()
}

/// CRC-16/ISO-IEC-14443-3-A over `data`.
pub fn crc16_a(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut bt = byte ^ (crc as u8);
        bt ^= bt << 4;
        let bt = u16::from(bt);
        crc = (crc >> 8) ^ (bt << 8) ^ (bt << 3) ^ (bt >> 4);
    }
    crc
}

/// Serialize one frame into `dst`.
///
/// Wire format:
/// ```text
/// ┌──────┬──────┬──────┬─────┬──────────┬──────┬─────────┬─────────┬──────┐
/// │ 0x7E │ len1 │ len0 │ lcs │ family   │ code │ payload │ trailer │ 0x7E │
/// │      │      │      │     │ (2B BE)  │ (1B) │ (N B)   │ (2B)    │      │
/// └──────┴──────┴──────┴─────┴──────────┴──────┴─────────┴─────────┴──────┘
/// ```
/// `len1*256+len0 = N + 5`. The trailer is the CRC-A of `len1..=payload`,
/// least significant byte first.
pub fn encode_frame(
    family: CommandFamily,
    code: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let header = encode_header(payload.len())?;
    dst.reserve(header.frame_size());

    let body_start = dst.len() + 1;
    dst.put_u8(START_MARKER);
    dst.put_slice(&header.to_bytes());
    dst.put_slice(&family.to_bytes());
    dst.put_u8(code);
    dst.put_slice(payload);
    let crc = crc16_a(&dst[body_start..]);
    dst.put_u16_le(crc);
    dst.put_u8(END_MARKER);
    Ok(())
}

/// Serialize one frame into a fresh buffer.
pub fn frame_bytes(family: CommandFamily, code: u8, payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    encode_frame(family, code, payload, &mut buf)?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_for_empty_payload() {
        let header = encode_header(0).unwrap();
        assert_eq!(header, Header::from_bytes(0x00, 0x05, 0xFB));
        assert_eq!(header.declared_length(), 5);
        assert_eq!(header.frame_size(), MIN_FRAME_SIZE);
    }

    #[test]
    fn header_round_trips_for_every_payload_length() {
        for n in 0..=MAX_PAYLOAD {
            let header = encode_header(n).unwrap();
            assert!(
                validate_header(header.len1, header.len0, header.lcs),
                "length {n}"
            );
            assert_eq!(header.payload_len(), Some(n));
        }
    }

    #[test]
    fn header_rejects_oversized_payload() {
        let err = encode_header(MAX_PAYLOAD + 1).unwrap_err();
        match err {
            FrameError::PayloadTooLarge { size, max } => {
                assert_eq!(size, MAX_PAYLOAD + 1);
                assert_eq!(max, MAX_PAYLOAD);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn flipped_checksum_is_invalid() {
        let header = encode_header(12).unwrap();
        assert!(!validate_header(header.len1, header.len0, header.lcs ^ 0x01));
    }

    #[test]
    fn short_declared_length_is_invalid() {
        // 0 + 0 + 0 passes the checksum but cannot hold family and code.
        let header = Header::from_bytes(0x00, 0x00, 0x00);
        assert!(validate_header(0, 0, 0));
        assert!(!header.is_valid());
    }

    #[test]
    fn crc_matches_iso14443a_halt() {
        // HLTA is transmitted as 50 00 57 CD.
        assert_eq!(crc16_a(&[0x50, 0x00]).to_le_bytes(), [0x57, 0xCD]);
    }

    #[test]
    fn encode_frame_layout() {
        let wire = frame_bytes(CommandFamily::from_bytes([0x01, 0x02]), 0x00, b"").unwrap();
        assert_eq!(wire.len(), MIN_FRAME_SIZE);
        assert_eq!(&wire[..7], &[0x7E, 0x00, 0x05, 0xFB, 0x01, 0x02, 0x00]);
        assert_eq!(wire[9], END_MARKER);

        let crc = crc16_a(&wire[1..7]);
        assert_eq!(&wire[7..9], &crc.to_le_bytes());
    }

    #[test]
    fn encode_frame_appends_to_existing_buffer() {
        let mut buf = BytesMut::new();
        encode_frame(CommandFamily::SYSTEM, 0x01, b"ab", &mut buf).unwrap();
        encode_frame(CommandFamily::SYSTEM, 0x02, b"cd", &mut buf).unwrap();
        assert_eq!(buf.len(), 2 * (MIN_FRAME_SIZE + 2));
        assert_eq!(buf[12], START_MARKER);
        assert_eq!(&buf[12 + 7..12 + 9], b"cd");
    }
}
