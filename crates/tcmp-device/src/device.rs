use std::fmt;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tcmp_frame::{Command, ReassemblerConfig, ReassemblerStats, Response};
use tcmp_transport::{DeviceId, Transport, TransportError, TransportEvent};
use tracing::{debug, info, warn};

use crate::correlator::{
    complete_all, Correlator, CorrelatorStats, ExchangeId, ExchangeOutcome, Resolution,
};
use crate::error::{DeviceError, Result};

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_CHUNK_SIZE: usize = 1024;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Runtime configuration for a [`Device`].
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// How long [`Device::request`] waits when no timeout is given.
    pub response_timeout: Duration,
    /// Size of the buffer handed to [`Transport::read`] per poll.
    pub read_chunk_size: usize,
    /// Pause between polls that returned no data.
    pub poll_interval: Duration,
    /// Inbound stream reassembly settings.
    pub reassembler: ReassemblerConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reassembler: ReassemblerConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Override the default response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Override the per-poll read size. Zero is raised to one byte.
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Override the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override reassembly settings.
    pub fn with_reassembler(mut self, config: ReassemblerConfig) -> Self {
        self.reassembler = config;
        self
    }
}

struct Inner<T> {
    transport: T,
    correlator: Correlator,
    connected: Option<DeviceId>,
    read_buf: Vec<u8>,
}

/// One reader connection: a transport plus its correlator behind one lock.
///
/// Every method takes `&self`, so a `Device` can be shared between a thread
/// pumping inbound bytes and threads issuing commands. Completions always run
/// after the lock is released and may call back into the device.
pub struct Device<T> {
    inner: Mutex<Inner<T>>,
    config: DeviceConfig,
}

impl<T: Transport> Device<T> {
    /// Wrap `transport` with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DeviceConfig::default())
    }

    /// Wrap `transport` with explicit configuration.
    pub fn with_config(transport: T, config: DeviceConfig) -> Self {
        let correlator = Correlator::with_config(config.reassembler.clone());
        let read_buf = vec![0u8; config.read_chunk_size.max(1)];
        Self {
            inner: Mutex::new(Inner {
                transport,
                correlator,
                connected: None,
                read_buf,
            }),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// List the readers the transport can see.
    pub fn enumerate_devices(&self) -> Result<Vec<DeviceId>> {
        Ok(self.lock().transport.enumerate_devices()?)
    }

    /// Open `device`, dropping any state left from a previous connection.
    pub fn connect(&self, device: &DeviceId) -> Result<()> {
        let mut inner = self.lock();
        inner.correlator.reset();
        inner.connected = None;
        inner.transport.connect(device)?;
        inner.connected = Some(device.clone());
        info!(device = %device, "reader connected");
        Ok(())
    }

    /// Close the connection and reset the correlator.
    ///
    /// A pending exchange is dropped without being notified.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        inner.transport.disconnect();
        inner.correlator.reset();
        if let Some(device) = inner.connected.take() {
            info!(device = %device, "reader disconnected");
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().transport.is_open()
    }

    /// The device passed to the last successful [`connect`](Self::connect).
    pub fn connected_device(&self) -> Option<DeviceId> {
        self.lock().connected.clone()
    }

    /// Send `command`; `on_complete` runs exactly once unless a reset drops it.
    pub fn send<F>(&self, command: &Command, on_complete: F) -> ExchangeId
    where
        F: FnOnce(ExchangeOutcome) + Send + 'static,
    {
        let (id, resolutions) = {
            let mut inner = self.lock();
            let Inner {
                transport,
                correlator,
                ..
            } = &mut *inner;
            correlator.send(transport, command, on_complete)
        };
        complete_all(resolutions);
        id
    }

    /// Push newly arrived bytes into the correlator.
    pub fn deliver(&self, data: &[u8]) {
        let resolutions = self.lock().correlator.on_bytes(data);
        complete_all(resolutions);
    }

    /// Dispatch one push-model transport event.
    ///
    /// Detaching the connected reader closes the connection and fails the
    /// pending exchange with [`TransportError::DeviceRemoved`].
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Data(bytes) => self.deliver(&bytes),
            TransportEvent::DeviceAttached(device) => {
                info!(device = %device, "reader attached");
            }
            TransportEvent::DeviceDetached(device) => {
                let resolution = {
                    let mut inner = self.lock();
                    if inner.connected.as_ref() != Some(&device) {
                        debug!(device = %device, "unrelated reader detached");
                        return;
                    }
                    warn!(device = %device, "connected reader detached");
                    inner.transport.disconnect();
                    inner.connected = None;
                    let resolution = inner
                        .correlator
                        .on_transport_error(TransportError::DeviceRemoved(device.to_string()));
                    inner.correlator.reset();
                    resolution
                };
                complete_all(resolution);
            }
        }
    }

    /// Read one chunk from the transport and feed it to the correlator.
    ///
    /// Returns the number of bytes read. A read failure also resolves the
    /// pending exchange.
    pub fn poll(&self) -> Result<usize> {
        let (read, resolutions) = {
            let mut guard = self.lock();
            let Inner {
                transport,
                correlator,
                read_buf,
                ..
            } = &mut *guard;
            match transport.read(read_buf) {
                Ok(0) => (Ok(0), Vec::new()),
                Ok(n) => (Ok(n), correlator.on_bytes(&read_buf[..n])),
                Err(err) => {
                    let err = Arc::new(err);
                    let resolution = correlator.on_transport_error(Arc::clone(&err));
                    (Err(err), resolution.into_iter().collect())
                }
            }
        };
        complete_all(resolutions);
        read.map_err(DeviceError::Read)
    }

    /// Drop buffered input and any pending exchange without notifying it.
    pub fn reset(&self) {
        self.lock().correlator.reset();
    }

    /// Send `command` and block until its response arrives.
    ///
    /// Drives [`poll`](Self::poll) on the calling thread. When `timeout`
    /// (or the configured default) elapses first, the exchange resolves with
    /// a timeout and the correlator is reset. A timeout too large to form a
    /// deadline waits until the exchange resolves.
    pub fn request(&self, command: &Command, timeout: Option<Duration>) -> Result<Response> {
        let timeout = timeout.unwrap_or(self.config.response_timeout);
        let (tx, rx) = mpsc::channel();
        let id = self.send(command, move |outcome| {
            let _ = tx.send(outcome);
        });
        let deadline = Instant::now().checked_add(timeout);

        loop {
            match rx.try_recv() {
                Ok(outcome) => return Ok(outcome?),
                Err(TryRecvError::Disconnected) => return Err(DeviceError::Cancelled),
                Err(TryRecvError::Empty) => {}
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let expired: Option<Resolution> = self.lock().correlator.expire(id, timeout);
                complete_all(expired);
                // Either resolved above, resolved elsewhere, or dropped by a reset.
                return match rx.recv() {
                    Ok(outcome) => Ok(outcome?),
                    Err(_) => Err(DeviceError::Cancelled),
                };
            }

            match self.poll() {
                Ok(0) => thread::sleep(self.config.poll_interval),
                Ok(_) => {}
                Err(err) => debug!(exchange = %id, error = %err, "poll failed during request"),
            }
        }
    }

    /// The exchange awaiting a response, if any.
    pub fn pending_exchange(&self) -> Option<ExchangeId> {
        self.lock().correlator.pending().map(|pending| pending.id())
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.lock().correlator.stats()
    }

    pub fn reassembler_stats(&self) -> ReassemblerStats {
        self.lock().correlator.reassembler_stats()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the transport.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock().transport)
    }

    /// Consume the device and return the transport.
    pub fn into_transport(self) -> T {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .transport
    }
}

impl<T> fmt::Debug for Device<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
