//! Binds one in-flight command to the next inbound frame.
//!
//! The protocol is strictly half-duplex: at most one [`PendingExchange`]
//! exists at a time. Every exchange is resolved exactly once, unless it is
//! dropped by [`Correlator::reset`]. Resolution is deferred: methods return
//! [`Resolution`]s and the caller runs them with [`Resolution::complete`],
//! typically after releasing whatever lock guards the correlator.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tcmp_frame::{
    Command, CommandFamily, Reassembler, ReassemblerConfig, ReassemblerStats, Response,
};
use tcmp_transport::{Transport, TransportError};
use tracing::{debug, warn};

use crate::error::ExchangeError;

/// Result handed to a completion.
pub type ExchangeOutcome = std::result::Result<Response, ExchangeError>;

/// Completion notification for one exchange.
pub type Completion = Box<dyn FnOnce(ExchangeOutcome) + Send + 'static>;

/// Identifies one exchange for the lifetime of a correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(u64);

impl ExchangeId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The single in-flight command awaiting a response.
pub struct PendingExchange {
    id: ExchangeId,
    family: CommandFamily,
    code: u8,
    created_at: Instant,
    completion: Completion,
}

impl PendingExchange {
    fn new(id: ExchangeId, command: &Command, completion: Completion) -> Self {
        Self {
            id,
            family: command.family(),
            code: command.code(),
            created_at: Instant::now(),
            completion,
        }
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Family of the command that opened the exchange.
    pub fn family(&self) -> CommandFamily {
        self.family
    }

    /// Code of the command that opened the exchange.
    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the command was sent.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl fmt::Debug for PendingExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingExchange")
            .field("id", &self.id)
            .field("family", &self.family)
            .field("code", &self.code)
            .field("elapsed", &self.elapsed())
            .finish_non_exhaustive()
    }
}

/// A resolved exchange whose completion has not run yet.
#[must_use = "a resolution does nothing until `complete` is called"]
pub struct Resolution {
    exchange: PendingExchange,
    outcome: ExchangeOutcome,
}

impl Resolution {
    fn new(exchange: PendingExchange, outcome: ExchangeOutcome) -> Self {
        Self { exchange, outcome }
    }

    /// The exchange being resolved.
    pub fn id(&self) -> ExchangeId {
        self.exchange.id
    }

    pub fn outcome(&self) -> &ExchangeOutcome {
        &self.outcome
    }

    /// Invoke the completion with the outcome.
    pub fn complete(self) {
        let Resolution { exchange, outcome } = self;
        (exchange.completion)(outcome);
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("exchange", &self.exchange)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Run every resolution in order.
pub fn complete_all(resolutions: impl IntoIterator<Item = Resolution>) {
    for resolution in resolutions {
        resolution.complete();
    }
}

/// Exchange counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub sent: u64,
    pub resolved: u64,
    pub superseded: u64,
    pub unsolicited: u64,
    pub cancelled: u64,
}

/// Correlates outbound commands with inbound frames for one connection.
#[derive(Debug)]
pub struct Correlator {
    reassembler: Reassembler,
    pending: Option<PendingExchange>,
    next_id: u64,
    stats: CorrelatorStats,
}

impl Correlator {
    /// Create a correlator with default reassembly configuration.
    pub fn new() -> Self {
        Self::with_config(ReassemblerConfig::default())
    }

    /// Create a correlator with explicit reassembly configuration.
    pub fn with_config(config: ReassemblerConfig) -> Self {
        Self {
            reassembler: Reassembler::with_config(config),
            pending: None,
            next_id: 1,
            stats: CorrelatorStats::default(),
        }
    }

    /// Serialize `command`, write it to `transport` and await its response.
    ///
    /// An exchange that is still outstanding is resolved with
    /// [`ExchangeError::Superseded`] first. Serialization and write failures
    /// resolve the new exchange immediately.
    pub fn send<T, F>(
        &mut self,
        transport: &mut T,
        command: &Command,
        on_complete: F,
    ) -> (ExchangeId, Vec<Resolution>)
    where
        T: Transport + ?Sized,
        F: FnOnce(ExchangeOutcome) + Send + 'static,
    {
        let mut resolutions = Vec::new();
        if let Some(previous) = self.pending.take() {
            warn!(superseded = %previous.id, "command sent while another is outstanding");
            self.stats.superseded += 1;
            resolutions.push(self.resolve(previous, Err(ExchangeError::Superseded)));
        }

        let id = ExchangeId(self.next_id);
        self.next_id += 1;
        let exchange = PendingExchange::new(id, command, Box::new(on_complete));

        let wire = match command.to_wire() {
            Ok(wire) => wire,
            Err(err) => {
                resolutions.push(self.resolve(exchange, Err(err.into())));
                return (id, resolutions);
            }
        };

        if !transport.is_open() {
            resolutions.push(self.resolve(exchange, Err(TransportError::NotOpen.into())));
            return (id, resolutions);
        }

        match transport.write(&wire) {
            Ok(()) => {
                self.stats.sent += 1;
                debug!(
                    exchange = %id,
                    family = command.family().value(),
                    code = command.code(),
                    bytes = wire.len(),
                    "command sent"
                );
                self.pending = Some(exchange);
            }
            Err(err) => {
                warn!(exchange = %id, error = %err, "command write failed");
                resolutions.push(self.resolve(exchange, Err(err.into())));
            }
        }
        (id, resolutions)
    }

    /// Feed newly delivered transport bytes.
    ///
    /// The first frame or stream error resolves the pending exchange. Frames
    /// arriving with nothing pending are dropped; stream errors with nothing
    /// pending are logged and swallowed.
    pub fn on_bytes(&mut self, data: &[u8]) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        for item in self.reassembler.push(data) {
            match (item, self.pending.take()) {
                (Ok(response), Some(exchange)) => {
                    resolutions.push(self.resolve(exchange, Ok(response)));
                }
                (Err(err), Some(exchange)) => {
                    resolutions.push(self.resolve(exchange, Err(err.into())));
                }
                (Ok(response), None) => {
                    self.stats.unsolicited += 1;
                    warn!(
                        family = response.frame().family().value(),
                        code = response.frame().response_code(),
                        "dropping unsolicited frame"
                    );
                }
                (Err(err), None) => {
                    debug!(error = %err, "stream error with no pending exchange");
                }
            }
        }
        resolutions
    }

    /// Resolve the pending exchange, if any, with a transport failure.
    pub fn on_transport_error(
        &mut self,
        err: impl Into<Arc<TransportError>>,
    ) -> Option<Resolution> {
        let exchange = self.pending.take()?;
        let err = err.into();
        warn!(exchange = %exchange.id, error = %err, "transport failure");
        Some(self.resolve(exchange, Err(ExchangeError::Transport(err))))
    }

    /// Time out exchange `id` if it is still pending, then reset.
    ///
    /// Returns `None` when `id` already resolved; nothing is reset then.
    pub fn expire(&mut self, id: ExchangeId, timeout: Duration) -> Option<Resolution> {
        if self.pending.as_ref().map(PendingExchange::id) != Some(id) {
            return None;
        }
        let exchange = self.pending.take()?;
        warn!(exchange = %id, ?timeout, "exchange timed out");
        let resolution = self.resolve(exchange, Err(ExchangeError::Timeout(timeout)));
        self.reset();
        Some(resolution)
    }

    /// Clear buffered input and drop any pending exchange without notifying it.
    pub fn reset(&mut self) {
        if let Some(exchange) = self.pending.take() {
            debug!(exchange = %exchange.id, "dropping pending exchange on reset");
            self.stats.cancelled += 1;
        }
        self.reassembler.reset();
    }

    /// The exchange awaiting a response, if any.
    pub fn pending(&self) -> Option<&PendingExchange> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Bytes buffered towards the next frame.
    pub fn buffered_len(&self) -> usize {
        self.reassembler.len()
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }

    pub fn reassembler_stats(&self) -> ReassemblerStats {
        self.reassembler.stats()
    }

    fn resolve(&mut self, exchange: PendingExchange, outcome: ExchangeOutcome) -> Resolution {
        self.stats.resolved += 1;
        debug!(
            exchange = %exchange.id,
            ok = outcome.is_ok(),
            elapsed = ?exchange.elapsed(),
            "exchange resolved"
        );
        Resolution::new(exchange, outcome)
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tcmp_frame::{Frame, FrameError, APPLICATION_ERROR, MAX_PAYLOAD};
    use tcmp_transport::{DeviceId, Result as TransportResult};

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        open: bool,
        fail_writes: bool,
        written: Vec<u8>,
    }

    impl RecordingTransport {
        fn open() -> Self {
            Self {
                open: true,
                ..Self::default()
            }
        }
    }

    impl Transport for RecordingTransport {
        fn enumerate_devices(&self) -> TransportResult<Vec<DeviceId>> {
            Ok(vec![DeviceId::new("test")])
        }

        fn connect(&mut self, _device: &DeviceId) -> TransportResult<()> {
            self.open = true;
            Ok(())
        }

        fn disconnect(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn write(&mut self, bytes: &[u8]) -> TransportResult<()> {
            if self.fail_writes {
                return Err(TransportError::Io(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )));
            }
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn read(&mut self, _buf: &mut [u8]) -> TransportResult<usize> {
            Ok(0)
        }
    }

    type Outcomes = Arc<Mutex<Vec<(u32, ExchangeOutcome)>>>;

    fn recorder(outcomes: &Outcomes, tag: u32) -> impl FnOnce(ExchangeOutcome) + Send + 'static {
        let outcomes = Arc::clone(outcomes);
        move |outcome| outcomes.lock().unwrap().push((tag, outcome))
    }

    fn ping() -> Command {
        Command::new(CommandFamily::SYSTEM, 0x01)
    }

    fn response_wire(code: u8, payload: &[u8]) -> Vec<u8> {
        Frame::new(CommandFamily::SYSTEM, code, payload)
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    #[test]
    fn send_writes_serialized_command() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();

        let (id, resolutions) = correlator.send(&mut transport, &ping(), recorder(&outcomes, 1));

        assert!(resolutions.is_empty());
        assert_eq!(transport.written, ping().to_wire().unwrap().to_vec());
        assert_eq!(correlator.pending().map(PendingExchange::id), Some(id));
        assert!(outcomes.lock().unwrap().is_empty());
    }

    #[test]
    fn frame_resolves_pending_exactly_once() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();

        let (_, resolutions) = correlator.send(&mut transport, &ping(), recorder(&outcomes, 1));
        complete_all(resolutions);

        let mut burst = response_wire(0x01, b"pong");
        burst.extend(response_wire(0x01, b"stray"));
        complete_all(correlator.on_bytes(&burst));

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        let (tag, outcome) = &outcomes[0];
        assert_eq!(*tag, 1);
        let response = outcome.as_ref().expect("should resolve with a frame");
        assert_eq!(response.frame().payload().as_ref(), b"pong");
        assert!(!correlator.has_pending());
        assert_eq!(correlator.stats().unsolicited, 1);
    }

    #[test]
    fn fragmented_response_resolves_on_completion() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();
        complete_all(correlator.send(&mut transport, &ping(), recorder(&outcomes, 1)).1);

        let wire = response_wire(0x01, b"split");
        assert!(correlator.on_bytes(&wire[..5]).is_empty());
        assert!(correlator.has_pending());
        complete_all(correlator.on_bytes(&wire[5..]));

        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[test]
    fn application_error_resolves_as_response() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();
        complete_all(correlator.send(&mut transport, &ping(), recorder(&outcomes, 1)).1);

        complete_all(correlator.on_bytes(&response_wire(APPLICATION_ERROR, &[0x05, 0, 0])));

        let outcomes = outcomes.lock().unwrap();
        let response = outcomes[0].1.as_ref().unwrap();
        assert_eq!(response.application_error().unwrap().error_code, 0x05);
    }

    #[test]
    fn unsolicited_frame_is_dropped() {
        let mut correlator = Correlator::new();
        assert!(correlator.on_bytes(&response_wire(0x02, b"")).is_empty());
        assert_eq!(correlator.stats().unsolicited, 1);
    }

    #[test]
    fn corrupt_header_resolves_with_error_and_resets_buffer() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();
        complete_all(correlator.send(&mut transport, &ping(), recorder(&outcomes, 1)).1);

        let mut bad = response_wire(0x01, b"x");
        bad[3] ^= 0x01;
        complete_all(correlator.on_bytes(&bad));

        {
            let outcomes = outcomes.lock().unwrap();
            assert!(matches!(
                outcomes[0].1,
                Err(ExchangeError::Frame(FrameError::HeaderCorruption { .. }))
            ));
        }
        assert_eq!(correlator.buffered_len(), 0);

        complete_all(correlator.send(&mut transport, &ping(), recorder(&outcomes, 2)).1);
        complete_all(correlator.on_bytes(&response_wire(0x01, b"ok")));
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[1].1.is_ok());
    }

    #[test]
    fn write_failure_resolves_immediately() {
        let mut transport = RecordingTransport::open();
        transport.fail_writes = true;
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();

        let (_, resolutions) = correlator.send(&mut transport, &ping(), recorder(&outcomes, 1));
        assert_eq!(resolutions.len(), 1);
        complete_all(resolutions);

        assert!(!correlator.has_pending());
        let outcomes = outcomes.lock().unwrap();
        assert!(matches!(outcomes[0].1, Err(ExchangeError::Transport(_))));
    }

    #[test]
    fn closed_transport_resolves_with_not_open() {
        let mut transport = RecordingTransport::default();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();

        complete_all(correlator.send(&mut transport, &ping(), recorder(&outcomes, 1)).1);

        let outcomes = outcomes.lock().unwrap();
        match &outcomes[0].1 {
            Err(ExchangeError::Transport(err)) => {
                assert!(matches!(**err, TransportError::NotOpen))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(transport.written.is_empty());
    }

    #[test]
    fn oversized_command_resolves_with_frame_error() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();
        let command = ping().with_payload(vec![0u8; MAX_PAYLOAD + 1]);

        complete_all(correlator.send(&mut transport, &command, recorder(&outcomes, 1)).1);

        let outcomes = outcomes.lock().unwrap();
        assert!(matches!(
            outcomes[0].1,
            Err(ExchangeError::Frame(FrameError::PayloadTooLarge { .. }))
        ));
        assert!(transport.written.is_empty());
    }

    #[test]
    fn second_send_supersedes_first() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();

        complete_all(correlator.send(&mut transport, &ping(), recorder(&outcomes, 1)).1);
        let (_, resolutions) = correlator.send(&mut transport, &ping(), recorder(&outcomes, 2));
        assert_eq!(resolutions.len(), 1);
        complete_all(resolutions);
        complete_all(correlator.on_bytes(&response_wire(0x01, b"")));

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], (1, Err(ExchangeError::Superseded))));
        assert!(matches!(outcomes[1], (2, Ok(_))));
        assert_eq!(correlator.stats().superseded, 1);
    }

    #[test]
    fn transport_error_resolves_pending() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();
        complete_all(correlator.send(&mut transport, &ping(), recorder(&outcomes, 1)).1);

        let resolution = correlator
            .on_transport_error(TransportError::DeviceRemoved("test".into()))
            .expect("pending exchange should resolve");
        resolution.complete();

        assert!(correlator.on_transport_error(TransportError::NotOpen).is_none());
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[test]
    fn reset_drops_pending_without_notifying() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();
        complete_all(correlator.send(&mut transport, &ping(), recorder(&outcomes, 1)).1);
        assert!(correlator.on_bytes(&response_wire(0x01, b"partial")[..6]).is_empty());

        correlator.reset();
        correlator.reset();

        assert!(!correlator.has_pending());
        assert_eq!(correlator.buffered_len(), 0);
        assert!(outcomes.lock().unwrap().is_empty());
        assert_eq!(correlator.stats().cancelled, 1);
    }

    #[test]
    fn expire_times_out_matching_exchange_only() {
        let mut transport = RecordingTransport::open();
        let mut correlator = Correlator::new();
        let outcomes = Outcomes::default();
        let (first, _) = correlator.send(&mut transport, &ping(), recorder(&outcomes, 1));
        let (second, superseded) = correlator.send(&mut transport, &ping(), recorder(&outcomes, 2));
        complete_all(superseded);

        assert!(correlator.expire(first, Duration::from_millis(10)).is_none());
        assert!(correlator.has_pending());

        correlator
            .expire(second, Duration::from_millis(10))
            .expect("second exchange is pending")
            .complete();

        let outcomes = outcomes.lock().unwrap();
        assert!(matches!(outcomes[1], (2, Err(ExchangeError::Timeout(_)))));
        assert!(!correlator.has_pending());
    }
}
