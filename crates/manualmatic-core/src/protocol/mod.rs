//! Pendant Serial Protocol
//!
//! Implements the STX/ETX framed text protocol spoken by the Manualmatic pendant.
//!
//! Frame format:
//! - 1 byte: STX (0x02)
//! - 2 bytes: command code (single-character codes are space padded)
//! - 0..20 bytes: payload, 8-bit text
//! - 1 byte: ETX (0x03)

pub mod commands;
mod error;
mod frame;
pub mod serial;
mod transport;

pub use commands::{CommandCode, IniKey};
pub use error::{FrameError, ProtocolError};
pub use frame::{encode_frame, CommandRecord, FrameDecoder};
pub use serial::{discover_pendant, list_ports, open_port, PendantSignature, PortInfo};
pub use transport::{
    ConnectionState, Connector, Link, LinkEvent, SerialConnector, Transport, TransportConfig,
};

/// Start of frame marker
pub const STX: u8 = 0x02;

/// End of frame marker
pub const ETX: u8 = 0x03;

/// Maximum number of bytes between STX and ETX (code + payload)
pub const MAX_FRAME_BODY: usize = 22;

/// Default baud rate for the pendant link
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default per-read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 20;
