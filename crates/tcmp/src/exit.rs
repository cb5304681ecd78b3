use std::fmt;
use std::io;

use tcmp_device::{DeviceError, ExchangeError};
use tcmp_frame::FrameError;
use tcmp_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        _ => INTERNAL,
    }
}

fn transport_code(err: &TransportError) -> i32 {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => io_code(source),
        TransportError::DeviceNotFound(_) => USAGE,
        _ => TRANSPORT_ERROR,
    }
}

fn frame_code(err: &FrameError) -> i32 {
    match err {
        FrameError::Io(source) => io_code(source),
        FrameError::PayloadTooLarge { .. }
        | FrameError::HeaderCorruption { .. }
        | FrameError::BufferOverflow { .. } => DATA_INVALID,
        FrameError::ConnectionClosed => FAILURE,
    }
}

fn exchange_code(err: &ExchangeError) -> i32 {
    match err {
        ExchangeError::Frame(err) => frame_code(err),
        ExchangeError::Transport(err) => transport_code(err),
        ExchangeError::Timeout(_) => TIMEOUT,
        ExchangeError::Superseded => FAILURE,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(&err), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    CliError::new(transport_code(&err), format!("{context}: {err}"))
}

pub fn device_error(context: &str, err: DeviceError) -> CliError {
    let code = match &err {
        DeviceError::Transport(err) => transport_code(err),
        DeviceError::Read(err) => transport_code(err),
        DeviceError::Frame(err) => frame_code(err),
        DeviceError::Exchange(err) => exchange_code(err),
        DeviceError::Cancelled => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}
