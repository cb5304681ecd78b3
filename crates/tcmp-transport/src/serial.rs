use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{DeviceId, Transport};

/// Default line speed of TCMP readers.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Configuration for [`SerialTransport`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Line speed in baud. Default: 115200.
    pub baud_rate: u32,
    /// Per-read timeout. A read that times out yields zero bytes.
    pub timeout: Duration,
    /// Only enumerate USB ports with this vendor id.
    pub usb_vid: Option<u16>,
    /// Only enumerate USB ports with this product id.
    pub usb_pid: Option<u16>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(50),
            usb_vid: None,
            usb_pid: None,
        }
    }
}

impl SerialConfig {
    /// Restrict enumeration to one USB vendor/product pair.
    pub fn with_usb_filter(mut self, vid: u16, pid: u16) -> Self {
        self.usb_vid = Some(vid);
        self.usb_pid = Some(pid);
        self
    }

    fn accepts(&self, port_type: &SerialPortType) -> bool {
        match port_type {
            SerialPortType::UsbPort(usb) => {
                self.usb_vid.is_none_or(|vid| vid == usb.vid)
                    && self.usb_pid.is_none_or(|pid| pid == usb.pid)
            }
            _ => self.usb_vid.is_none() && self.usb_pid.is_none(),
        }
    }
}

/// USB serial transport backed by the `serialport` crate.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
    device: Option<DeviceId>,
}

impl SerialTransport {
    /// Create a closed transport with default configuration.
    pub fn new() -> Self {
        Self::with_config(SerialConfig::default())
    }

    /// Create a closed transport with explicit configuration.
    pub fn with_config(config: SerialConfig) -> Self {
        Self {
            config,
            port: None,
            device: None,
        }
    }

    /// The device the transport is connected to, if any.
    pub fn device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    /// Current configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SerialTransport {
    fn enumerate_devices(&self) -> Result<Vec<DeviceId>> {
        let ports =
            serialport::available_ports().map_err(|e| TransportError::Enumerate(e.to_string()))?;
        let devices: Vec<DeviceId> = ports
            .into_iter()
            .filter(|port| self.config.accepts(&port.port_type))
            .map(|port| DeviceId::new(port.port_name))
            .collect();
        debug!(count = devices.len(), "enumerated serial devices");
        Ok(devices)
    }

    fn connect(&mut self, device: &DeviceId) -> Result<()> {
        self.disconnect();
        let port = serialport::new(device.as_str(), self.config.baud_rate)
            .timeout(self.config.timeout)
            .open()
            .map_err(|e| {
                if e.kind() == serialport::ErrorKind::NoDevice {
                    TransportError::DeviceNotFound(device.to_string())
                } else {
                    TransportError::Connect {
                        device: device.to_string(),
                        source: e.into(),
                    }
                }
            })?;
        info!(%device, baud = self.config.baud_rate, "opened serial device");
        self.port = Some(port);
        self.device = Some(device.clone());
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.port.take().is_some() {
            if let Some(device) = self.device.take() {
                info!(%device, "closed serial device");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        let mut offset = 0usize;
        while offset < bytes.len() {
            match port.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::NotOpen),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        loop {
            match port.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        loop {
            match port.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(0),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}
