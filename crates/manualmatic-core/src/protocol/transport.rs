//! Connection management
//!
//! Owns the pendant link: opening, closing, rate-limited reconnects and
//! framed writes. The transport never blocks for longer than a read timeout
//! (plus the settle delay right after a successful open).

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::{
    encode_frame,
    serial::{discover_pendant, open_port, PendantSignature},
    CommandCode, ProtocolError,
};

/// Largest chunk requested from the port in one read call
const READ_CHUNK: usize = 64;

/// A byte stream to the pendant.
///
/// Reads are expected to return within a short timeout; a timeout is reported
/// as `ErrorKind::TimedOut` (or `WouldBlock`) and means "no more input for now".
pub trait Link: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Link for T {}

/// Finds and opens the pendant's port
pub trait Connector {
    /// Look for a pendant when no port is configured
    fn discover(&mut self) -> Option<String>;

    /// Open the port at `path`
    fn open(&mut self, path: &str) -> Result<Box<dyn Link>, ProtocolError>;
}

/// Connector for real serial ports
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
    read_timeout: Duration,
    signature: PendantSignature,
}

impl SerialConnector {
    /// Create a connector with the given line settings
    pub fn new(baud_rate: u32, read_timeout: Duration, signature: PendantSignature) -> Self {
        Self {
            baud_rate,
            read_timeout,
            signature,
        }
    }
}

impl Connector for SerialConnector {
    fn discover(&mut self) -> Option<String> {
        discover_pendant(&self.signature)
    }

    fn open(&mut self, path: &str) -> Result<Box<dyn Link>, ProtocolError> {
        let port = open_port(path, self.baud_rate, self.read_timeout)?;
        Ok(Box::new(port))
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected; the next poll attempts a connection immediately
    Disconnected,
    /// Waiting between connection attempts
    Connecting {
        /// Attempts made since the last disconnect
        attempts: u32,
    },
    /// Connected and ready
    Connected,
}

/// Connect/disconnect notifications, drained by the owner after each call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A link was opened
    Connected,
    /// The link was closed or lost
    Disconnected,
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Fixed port path; `None` enables discovery
    pub port: Option<String>,
    /// Minimum time between connection attempts
    pub retry_interval: Duration,
    /// Delay after a successful open before the link is reported up
    pub settle_delay: Duration,
    /// Upper bound on bytes returned by one `poll_input` call
    pub max_read_per_poll: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: None,
            retry_interval: Duration::from_secs(3),
            settle_delay: Duration::from_millis(100),
            max_read_per_poll: 256,
        }
    }
}

enum LinkState {
    Disconnected,
    Connecting { attempts: u32, last_attempt: Instant },
    Connected(Box<dyn Link>),
}

/// Supervises the pendant link
pub struct Transport<C: Connector> {
    config: TransportConfig,
    connector: C,
    state: LinkState,
    events: Vec<LinkEvent>,
    /// Metrics: cumulative bytes/frames sent & bytes received
    tx_bytes: u64,
    rx_bytes: u64,
    tx_frames: u64,
}

/// Log the first few attempts, then every fifth
fn should_log_attempt(attempt: u32) -> bool {
    attempt < 5 || attempt % 5 == 0
}

impl<C: Connector> Transport<C> {
    /// Create a transport (not yet connected)
    pub fn new(config: TransportConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            state: LinkState::Disconnected,
            events: Vec::new(),
            tx_bytes: 0,
            rx_bytes: 0,
            tx_frames: 0,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        match &self.state {
            LinkState::Disconnected => ConnectionState::Disconnected,
            LinkState::Connecting { attempts, .. } => ConnectionState::Connecting {
                attempts: *attempts,
            },
            LinkState::Connected(_) => ConnectionState::Connected,
        }
    }

    /// Check if the link is up
    pub fn is_connected(&self) -> bool {
        matches!(self.state, LinkState::Connected(_))
    }

    /// Get cumulative tx bytes, rx bytes and tx frames
    pub fn counters(&self) -> (u64, u64, u64) {
        (self.tx_bytes, self.rx_bytes, self.tx_frames)
    }

    /// Access the connector
    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Take pending connect/disconnect notifications
    pub fn take_events(&mut self) -> Vec<LinkEvent> {
        std::mem::take(&mut self.events)
    }

    /// Open the link now if no attempt was made within the retry interval
    pub fn open(&mut self, now: Instant) {
        let attempts = match self.state {
            LinkState::Connected(_) => return,
            LinkState::Disconnected => 1,
            LinkState::Connecting {
                attempts,
                last_attempt,
            } => {
                if now.saturating_duration_since(last_attempt) < self.config.retry_interval {
                    return;
                }
                attempts + 1
            }
        };
        self.state = LinkState::Connecting {
            attempts,
            last_attempt: now,
        };
        let verbose = should_log_attempt(attempts);
        if verbose {
            info!(attempt = attempts, "Connection attempt {}", attempts);
        }

        let path = match self.config.port.clone() {
            Some(path) => path,
            None => match self.connector.discover() {
                Some(path) => path,
                None => {
                    if verbose {
                        warn!("Manualmatic pendant not found");
                    }
                    return;
                }
            },
        };

        match self.connector.open(&path) {
            Ok(link) => {
                if !self.config.settle_delay.is_zero() {
                    std::thread::sleep(self.config.settle_delay);
                }
                info!(port = %path, "Connected");
                self.state = LinkState::Connected(link);
                self.events.push(LinkEvent::Connected);
            }
            Err(e) => {
                if verbose {
                    error!(port = %path, "Connection failed - {}", e);
                }
            }
        }
    }

    /// Close the link. The next poll reconnects without waiting.
    pub fn close(&mut self) {
        if matches!(self.state, LinkState::Connected(_)) {
            info!("Disconnected");
            self.events.push(LinkEvent::Disconnected);
        }
        self.state = LinkState::Disconnected;
    }

    fn fail(&mut self, context: &str, e: std::io::Error) {
        error!("Serial {} failed: {}", context, e);
        self.close();
    }

    /// Read whatever input is buffered, attempting a connection if down.
    ///
    /// Returns once a read times out or `max_read_per_poll` bytes were read.
    pub fn poll_input(&mut self, now: Instant) -> Vec<u8> {
        let mut input = Vec::new();
        if !self.is_connected() {
            self.open(now);
            return input;
        }
        let LinkState::Connected(link) = &mut self.state else {
            return input;
        };

        let mut chunk = [0u8; READ_CHUNK];
        let mut failure = None;
        while input.len() < self.config.max_read_per_poll {
            match link.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => input.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    break
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        self.rx_bytes += input.len() as u64;
        if let Some(e) = failure {
            self.fail("read", e);
        }
        input
    }

    /// Write raw bytes. Returns false (and drops the data) when disconnected
    /// or when the write fails, in which case the link is closed.
    pub fn write(&mut self, data: &[u8]) -> bool {
        let LinkState::Connected(link) = &mut self.state else {
            return false;
        };
        match link.write_all(data).and_then(|_| link.flush()) {
            Ok(()) => {
                self.tx_bytes += data.len() as u64;
                true
            }
            Err(e) => {
                self.fail("write", e);
                false
            }
        }
    }

    /// Encode and write one frame
    pub fn send(&mut self, code: &str, payload: &str) -> bool {
        if !code.starts_with(CommandCode::Heartbeat.selector() as char) {
            trace!(code, payload, "outgoing");
        }
        let sent = self.write(&encode_frame(code, payload));
        if sent {
            self.tx_frames += 1;
        } else {
            debug!(code, "frame dropped");
        }
        sent
    }
}
