//! Byte-stream transport boundary for TCMP readers.
//!
//! The protocol engine never talks to hardware directly. It needs a
//! collaborator that can:
//! - enumerate attached readers and open one of them
//! - write a fully serialized command
//! - hand back inbound bytes, either pushed as [`TransportEvent::Data`] or
//!   pulled on demand with [`Transport::read`]
//!
//! This is the lowest layer of tcmp. A `serialport`-backed implementation
//! ships behind the `serial` feature.

pub mod error;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use error::{Result, TransportError};
pub use traits::{DeviceId, Transport, TransportEvent};

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialTransport};
