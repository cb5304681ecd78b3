use std::fmt;

use bytes::Bytes;

use crate::error::Result;

/// Opaque identifier of an attached reader (a serial port name on most hosts).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Events a push-model transport delivers to the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Newly available inbound bytes.
    Data(Bytes),
    /// A reader was attached to the host.
    DeviceAttached(DeviceId),
    /// A reader was detached from the host.
    DeviceDetached(DeviceId),
}

/// The contract the protocol engine requires from a physical transport.
///
/// Implementations own device I/O; the engine only ever calls these methods
/// while holding its per-connection lock, so they need not be reentrant.
pub trait Transport: Send {
    /// List the readers currently attached.
    fn enumerate_devices(&self) -> Result<Vec<DeviceId>>;

    /// Open a connection to `device`, replacing any open connection.
    fn connect(&mut self, device: &DeviceId) -> Result<()>;

    /// Close the open connection. Closing an already closed transport is a no-op.
    fn disconnect(&mut self);

    /// Whether a connection is currently open.
    fn is_open(&self) -> bool;

    /// Write all of `bytes` to the open connection.
    ///
    /// Returns [`TransportError::NotOpen`](crate::TransportError::NotOpen)
    /// when no connection is open.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever bytes are available into `buf`.
    ///
    /// Returns `Ok(0)` when nothing arrived within the transport's own
    /// read timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn enumerate_devices(&self) -> Result<Vec<DeviceId>> {
        (**self).enumerate_devices()
    }

    fn connect(&mut self, device: &DeviceId) -> Result<()> {
        (**self).connect(device)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}
