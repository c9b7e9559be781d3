//! Frame encoding/decoding
//!
//! The decoder is fed one byte at a time and holds at most one partial frame.

use super::{FrameError, ETX, MAX_FRAME_BODY, STX};

/// A decoded frame from the pendant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    /// Two-byte command code. A frame carrying a single byte has a NUL second byte.
    pub code: [u8; 2],
    /// Payload text with trailing NUL padding removed
    pub payload: String,
}

impl CommandRecord {
    /// Build a record from a code string and payload, as the debug console does
    pub fn new(code: &str, payload: &str) -> Self {
        let bytes = code.as_bytes();
        let code = [
            bytes.first().copied().unwrap_or(b' '),
            bytes.get(1).copied().unwrap_or(b' '),
        ];
        Self {
            code,
            payload: payload.to_string(),
        }
    }

    /// Primary selector (first code byte)
    pub fn selector(&self) -> u8 {
        self.code[0]
    }

    /// Secondary code byte, often an axis index or an inline value
    pub fn qualifier(&self) -> u8 {
        self.code[1]
    }

    /// Code rendered as text, for logging
    pub fn code_str(&self) -> String {
        self.code.iter().map(|&b| b as char).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DecodeState {
    Idle,
    InFrame { overflowed: bool },
}

/// Byte-at-a-time frame decoder
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    buffer: Vec<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create an idle decoder
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
            buffer: Vec::with_capacity(MAX_FRAME_BODY),
        }
    }

    /// Whether a frame is currently being assembled
    pub fn in_frame(&self) -> bool {
        matches!(self.state, DecodeState::InFrame { .. })
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.buffer.clear();
    }

    /// Feed a single byte.
    ///
    /// Returns `Ok(Some(record))` when the byte completes a frame, `Ok(None)` when
    /// more input is needed and `Err` for a framing diagnostic.
    pub fn push(&mut self, byte: u8) -> Result<Option<CommandRecord>, FrameError> {
        match byte {
            STX => {
                let was_in_frame = self.in_frame();
                self.buffer.clear();
                self.state = DecodeState::InFrame { overflowed: false };
                if was_in_frame {
                    return Err(FrameError::Truncated);
                }
                Ok(None)
            }
            ETX => match self.state {
                DecodeState::Idle => Err(FrameError::UnexpectedEtx),
                DecodeState::InFrame { overflowed } => {
                    self.state = DecodeState::Idle;
                    if overflowed {
                        // Already reported as too long
                        self.buffer.clear();
                        return Ok(None);
                    }
                    if self.buffer.is_empty() {
                        return Err(FrameError::TooShort);
                    }
                    let record = decode_body(&self.buffer);
                    self.buffer.clear();
                    Ok(Some(record))
                }
            },
            _ => match self.state {
                DecodeState::Idle => Err(FrameError::UnexpectedCharacter(byte)),
                DecodeState::InFrame { .. } => {
                    if self.buffer.len() < MAX_FRAME_BODY {
                        self.buffer.push(byte);
                        Ok(None)
                    } else {
                        self.state = DecodeState::InFrame { overflowed: true };
                        Err(FrameError::TooLong)
                    }
                }
            },
        }
    }
}

/// Split a frame body into code and payload.
/// Bytes are mapped 1:1 to chars (ISO-8859-1) so line noise never fails decoding.
fn decode_body(body: &[u8]) -> CommandRecord {
    let code = [body[0], body.get(1).copied().unwrap_or(0)];
    let payload: String = body
        .get(2..)
        .unwrap_or(&[])
        .iter()
        .map(|&b| b as char)
        .collect();
    CommandRecord {
        code,
        payload: payload.trim_end_matches('\0').to_string(),
    }
}

/// Encode an outbound frame.
///
/// Single-character codes are padded with a space. Characters outside the
/// 8-bit range are replaced with `?`.
pub fn encode_frame(code: &str, payload: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(code.len() + payload.len() + 3);
    frame.push(STX);
    frame.extend(code.chars().map(latin1));
    if code.chars().count() == 1 {
        frame.push(b' ');
    }
    frame.extend(payload.chars().map(latin1));
    frame.push(ETX);
    frame
}

fn latin1(c: char) -> u8 {
    u8::try_from(u32::from(c)).unwrap_or(b'?')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pads_single_char_code() {
        assert_eq!(encode_frame("b", ""), vec![STX, b'b', b' ', ETX]);
        assert_eq!(encode_frame("E4", ""), vec![STX, b'E', b'4', ETX]);
        assert_eq!(
            encode_frame("j", "1500"),
            vec![STX, b'j', b' ', b'1', b'5', b'0', b'0', ETX]
        );
    }

    #[test]
    fn test_encode_replaces_wide_chars() {
        assert_eq!(encode_frame("DD", "\u{263a}"), vec![STX, b'D', b'D', b'?', ETX]);
        assert_eq!(encode_frame("DD", "\u{b0}"), vec![STX, b'D', b'D', 0xb0, ETX]);
    }

    #[test]
    fn test_single_byte_body() {
        let record = decode_body(b"!");
        assert_eq!(record.code, [b'!', 0]);
        assert_eq!(record.payload, "");
    }

    #[test]
    fn test_record_new_pads_code() {
        let record = CommandRecord::new("b", "");
        assert_eq!(record.code, [b'b', b' ']);
        assert_eq!(record.code_str(), "b ");
    }
}
