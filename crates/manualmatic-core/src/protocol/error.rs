//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the pendant over the serial link
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No port matched the pendant signature
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Reading or writing the port failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Framing diagnostics raised by the frame decoder.
///
/// None of these are fatal: the decoder has already re-synchronised by the
/// time one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A new frame started before the previous one ended
    #[error("Possible truncated packet")]
    Truncated,

    /// Frame ended before a full command code
    #[error("Command too short")]
    TooShort,

    /// Frame body exceeded the maximum length
    #[error("Command too long")]
    TooLong,

    /// ETX outside of a frame
    #[error("Unexpected ETX")]
    UnexpectedEtx,

    /// Byte outside of a frame
    #[error("Unexpected input character: {0:#04x}")]
    UnexpectedCharacter(u8),
}
