use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::codec::{encode_frame, frame_bytes, ENVELOPE_SIZE, LENGTH_OVERHEAD, PAYLOAD_OFFSET};
use crate::error::Result;
use crate::family::{is_application_error, CommandFamily};

/// One validated inbound frame.
///
/// Backed by the raw wire bytes, so payload and trailer are zero-copy slices.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    family: CommandFamily,
    response_code: u8,
    payload: Bytes,
    raw: Bytes,
}

impl Frame {
    /// Build a frame from its family, code and payload.
    pub fn new(family: CommandFamily, response_code: u8, payload: &[u8]) -> Result<Self> {
        Ok(Self::from_wire(frame_bytes(family, response_code, payload)?))
    }

    /// Wrap raw bytes the reassembler has already validated.
    ///
    /// `raw` must span start marker to end marker of a frame whose header
    /// validated and whose length is at least the minimum frame size.
    pub(crate) fn from_wire(raw: Bytes) -> Self {
        let family = CommandFamily::from_bytes([raw[4], raw[5]]);
        let response_code = raw[6];
        let payload = raw.slice(PAYLOAD_OFFSET..raw.len() - 3);
        Self {
            family,
            response_code,
            payload,
            raw,
        }
    }

    /// The subsystem the frame belongs to.
    pub fn family(&self) -> CommandFamily {
        self.family
    }

    /// Response (or command) code within the family.
    pub fn response_code(&self) -> u8 {
        self.response_code
    }

    /// Frame payload, `declared length - 5` bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The two trailing integrity bytes, as received.
    pub fn trailer(&self) -> [u8; 2] {
        let end = self.raw.len();
        [self.raw[end - 3], self.raw[end - 2]]
    }

    /// The complete wire representation, markers included.
    pub fn as_bytes(&self) -> &Bytes {
        &self.raw
    }

    /// Total wire size of this frame.
    pub fn wire_len(&self) -> usize {
        self.raw.len()
    }

    /// Whether the response code is the reserved application-error code.
    pub fn is_application_error(&self) -> bool {
        is_application_error(self.response_code)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("family", &self.family)
            .field("response_code", &format_args!("{:#04x}", self.response_code))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// An outbound request: family, command code and opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    family: CommandFamily,
    code: u8,
    payload: Bytes,
}

impl Command {
    /// A command with an empty payload.
    pub fn new(family: CommandFamily, code: u8) -> Self {
        Self {
            family,
            code,
            payload: Bytes::new(),
        }
    }

    /// Replace the payload.
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn family(&self) -> CommandFamily {
        self.family
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Total wire size of the serialized command.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + ENVELOPE_SIZE + LENGTH_OVERHEAD
    }

    /// Serialize into `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        encode_frame(self.family, self.code, &self.payload, dst)
    }

    /// Serialize into a fresh buffer.
    pub fn to_wire(&self) -> Result<Bytes> {
        frame_bytes(self.family, self.code, &self.payload)
    }
}

/// A device-reported failure carried by an application error frame.
///
/// Payload layout: error code, internal error code, reader status, then a
/// UTF-8 message. Missing fields decode as zero / empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationError {
    pub error_code: u8,
    pub internal_error_code: u8,
    pub reader_status: u8,
    pub message: String,
}

impl ApplicationError {
    /// Decode from an application error payload. Never fails.
    pub fn decode(payload: &[u8]) -> Self {
        let byte = |i: usize| payload.get(i).copied().unwrap_or(0);
        let message = payload
            .get(3..)
            .map(|rest| String::from_utf8_lossy(rest).into_owned())
            .unwrap_or_default();
        Self {
            error_code: byte(0),
            internal_error_code: byte(1),
            reader_status: byte(2),
            message,
        }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device error {:#04x} (internal {:#04x}, status {:#04x})",
            self.error_code, self.internal_error_code, self.reader_status
        )?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// A structurally valid frame whose payload reports a device-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    frame: Frame,
    error: ApplicationError,
}

impl ErrorFrame {
    /// The decoded application error.
    pub fn error(&self) -> &ApplicationError {
        &self.error
    }

    /// The underlying frame.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// The family that reported the error.
    pub fn family(&self) -> CommandFamily {
        self.frame.family()
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// An ordinary response carrying requested data.
    Frame(Frame),
    /// A device-reported failure.
    Error(ErrorFrame),
}

impl Response {
    /// Classify a frame as ordinary or application error.
    pub fn classify(frame: Frame) -> Self {
        if frame.is_application_error() {
            let error = ApplicationError::decode(frame.payload());
            Response::Error(ErrorFrame { frame, error })
        } else {
            Response::Frame(frame)
        }
    }

    /// The underlying frame regardless of classification.
    pub fn frame(&self) -> &Frame {
        match self {
            Response::Frame(frame) => frame,
            Response::Error(error) => error.frame(),
        }
    }

    /// The application error, if this is an error frame.
    pub fn application_error(&self) -> Option<&ApplicationError> {
        match self {
            Response::Frame(_) => None,
            Response::Error(error) => Some(error.error()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// Convert into the frame, turning application errors into `Err`.
    pub fn into_result(self) -> std::result::Result<Frame, ErrorFrame> {
        match self {
            Response::Frame(frame) => Ok(frame),
            Response::Error(error) => Err(error),
        }
    }
}

impl From<Frame> for Response {
    fn from(frame: Frame) -> Self {
        Response::classify(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MIN_FRAME_SIZE;
    use crate::family::APPLICATION_ERROR;

    #[test]
    fn frame_accessors() {
        let frame = Frame::new(CommandFamily::BASIC_NFC, 0x05, b"\x04\x01\x02").unwrap();
        assert_eq!(frame.family(), CommandFamily::BASIC_NFC);
        assert_eq!(frame.response_code(), 0x05);
        assert_eq!(frame.payload().as_ref(), b"\x04\x01\x02");
        assert_eq!(frame.wire_len(), MIN_FRAME_SIZE + 3);
        assert_eq!(frame.as_bytes()[0], 0x7E);
    }

    #[test]
    fn command_wire_matches_frame_wire() {
        let command = Command::new(CommandFamily::SYSTEM, 0x01).with_payload(&b"hi"[..]);
        let wire = command.to_wire().unwrap();
        let frame = Frame::new(CommandFamily::SYSTEM, 0x01, b"hi").unwrap();
        assert_eq!(&wire, frame.as_bytes());
        assert_eq!(command.wire_len(), wire.len());
    }

    #[test]
    fn classify_ordinary_frame() {
        let frame = Frame::new(CommandFamily::SYSTEM, 0x02, b"ok").unwrap();
        let response = Response::classify(frame.clone());
        assert_eq!(response, Response::Frame(frame));
        assert!(response.application_error().is_none());
    }

    #[test]
    fn classify_application_error() {
        let mut payload = vec![0x03, 0x10, 0x01];
        payload.extend_from_slice(b"no tag detected");
        let frame = Frame::new(CommandFamily::BASIC_NFC, APPLICATION_ERROR, &payload).unwrap();

        let response = Response::classify(frame);
        let err = response.application_error().expect("should be an error frame");
        assert_eq!(err.error_code, 0x03);
        assert_eq!(err.internal_error_code, 0x10);
        assert_eq!(err.reader_status, 0x01);
        assert_eq!(err.message, "no tag detected");
        assert!(err.to_string().ends_with(": no tag detected"));
    }

    #[test]
    fn short_application_error_payload_still_classifies() {
        let frame = Frame::new(CommandFamily::SYSTEM, APPLICATION_ERROR, &[0x09]).unwrap();
        let response = Response::classify(frame);
        let err = response.application_error().unwrap();
        assert_eq!(err.error_code, 0x09);
        assert_eq!(err.internal_error_code, 0);
        assert!(err.message.is_empty());
    }

    #[test]
    fn into_result_splits_classifications() {
        let ok = Response::classify(Frame::new(CommandFamily::SYSTEM, 0x01, b"").unwrap());
        assert!(ok.into_result().is_ok());

        let err =
            Response::classify(Frame::new(CommandFamily::SYSTEM, APPLICATION_ERROR, b"").unwrap());
        assert!(err.into_result().is_err());
    }
}
