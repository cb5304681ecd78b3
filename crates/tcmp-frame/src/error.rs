/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length checksum does not match the length bytes, or the declared
    /// length is too short to hold a frame.
    #[error("corrupt frame header (len1={len1:#04x} len0={len0:#04x} lcs={lcs:#04x})")]
    HeaderCorruption { len1: u8, len0: u8, lcs: u8 },

    /// The payload exceeds what the 16-bit length field can describe.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Buffered input grew past the configured limit without yielding a frame.
    #[error("reassembly buffer overflow ({size} bytes, max {max})")]
    BufferOverflow { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
