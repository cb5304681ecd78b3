//! Command/response correlation for TCMP readers.
//!
//! This is the "just works" layer. A [`Device`] pairs a [`Transport`] with a
//! [`Correlator`] so that every command sent gets exactly one outcome: the
//! reader's response, a stream or transport error, or a timeout.
//!
//! The [`Correlator`] itself performs no I/O and never blocks; use it
//! directly when the host already owns an event loop.

pub mod correlator;
pub mod device;
pub mod error;

pub use correlator::{
    complete_all, Completion, Correlator, CorrelatorStats, ExchangeId, ExchangeOutcome,
    PendingExchange, Resolution,
};
pub use device::{Device, DeviceConfig};
pub use error::{DeviceError, ExchangeError, Result};

pub use tcmp_frame::{Command, CommandFamily, Response};
pub use tcmp_transport::{DeviceId, Transport, TransportError, TransportEvent};
