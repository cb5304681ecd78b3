/// Errors that can occur in reader transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A write or read was attempted while no device is connected.
    #[error("transport is not open")]
    NotOpen,

    /// The requested device is not present.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to open the specified device.
    #[error("failed to connect to {device}: {source}")]
    Connect {
        device: String,
        source: std::io::Error,
    },

    /// Enumerating attached devices failed.
    #[error("device enumeration failed: {0}")]
    Enumerate(String),

    /// An I/O error occurred on the open connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device was removed while the connection was open.
    #[error("device removed: {0}")]
    DeviceRemoved(String),
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        TransportError::Io(err.into())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
