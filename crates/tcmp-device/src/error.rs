use std::sync::Arc;
use std::time::Duration;

/// Why a pending exchange was resolved without a response.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The inbound stream was corrupt (bad header checksum, overflow).
    #[error("frame error: {0}")]
    Frame(#[from] tcmp_frame::FrameError),

    /// The transport failed or is closed.
    #[error("transport error: {0}")]
    Transport(Arc<tcmp_transport::TransportError>),

    /// A newer command was sent before this one was answered.
    #[error("superseded by a newer command")]
    Superseded,

    /// No response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl From<tcmp_transport::TransportError> for ExchangeError {
    fn from(err: tcmp_transport::TransportError) -> Self {
        ExchangeError::Transport(Arc::new(err))
    }
}

/// Errors that can occur in device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] tcmp_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] tcmp_frame::FrameError),

    /// Reading from the transport failed; any pending exchange got the same error.
    #[error("transport read failed: {0}")]
    Read(Arc<tcmp_transport::TransportError>),

    /// The exchange was resolved with an error.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The exchange was dropped by a reset before it resolved.
    #[error("exchange cancelled by reset")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DeviceError>;
