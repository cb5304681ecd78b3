//! Protocol engine for NFC readers speaking TCMP over a serial link.
//!
//! tcmp pairs each command with exactly one outcome, reassembling responses
//! out of a fragmented and possibly noisy byte stream.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte-stream transport boundary (serial port behind `serial` feature)
//! - [`frame`]: Wire framing, header checksum and stream reassembly
//! - [`device`]: Command/response correlation (behind `device` feature)

/// Re-export transport types.
pub mod transport {
    pub use tcmp_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use tcmp_frame::*;
}

/// Re-export device types (requires `device` feature).
#[cfg(feature = "device")]
pub mod device {
    pub use tcmp_device::*;
}
