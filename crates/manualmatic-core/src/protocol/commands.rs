//! Protocol commands
//!
//! Defines the command codes understood by the Manualmatic pendant.

use serde::{Deserialize, Serialize};

/// Command selectors (first byte of a frame's code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandCode {
    /// Absolute position per axis ('A', out)
    AbsolutePosition,
    /// Commanded spindle speed ('S', in)
    SpindleSpeed,
    /// Spindle override ('s', in/out)
    SpindleOverride,
    /// Actual spindle RPM including override ('R', out)
    SpindleRpm,
    /// Spindle direction ('G', out)
    SpindleDirection,
    /// Feed override ('f', in/out)
    FeedOverride,
    /// Rapid override ('r', in/out)
    RapidOverride,
    /// Incremental jog ('J', in)
    Jog,
    /// Jog velocity in units per minute ('j', in/out)
    JogVelocity,
    /// Continuous jog, payload is velocity ('N', in)
    JogContinuous,
    /// Jog stop ('n', in)
    JogStop,
    /// Task mode ('M', in/out)
    TaskMode,
    /// Task power state ('E', in/out)
    TaskState,
    /// Interpreter state ('I', out)
    InterpState,
    /// Current velocity ('v', out)
    CurrentVelocity,
    /// Motion type ('t', out)
    MotionType,
    /// Active work coordinate system ('W', out)
    G5xIndex,
    /// Work offset per axis ('5', in/out)
    G5xOffset,
    /// G92 offset per axis ('9', out)
    G92Offset,
    /// Tool offset per axis ('T', out)
    ToolOffset,
    /// Distance to go per axis ('D', out)
    DistanceToGo,
    /// Homed flag per axis ('h', out)
    Homed,
    /// All axes homed ('H', out)
    AllHomed,
    /// Ini parameter ('i', out)
    IniValue,
    /// Flood coolant ('C', in/out)
    Flood,
    /// Mist coolant ('c', in/out)
    Mist,
    /// Execution state ('e', out)
    ExecState,
    /// Program state ('p', out)
    ProgramState,
    /// Program control: run, step, pause, resume ('a', in)
    Auto,
    /// Heartbeat ('b', in/out)
    Heartbeat,
    /// Abort ('!', in)
    Abort,
    /// Debug text ('D' with qualifier 'D', in)
    Debug,
}

impl CommandCode {
    /// Get the selector byte
    pub fn selector(&self) -> u8 {
        match self {
            CommandCode::AbsolutePosition => b'A',
            CommandCode::SpindleSpeed => b'S',
            CommandCode::SpindleOverride => b's',
            CommandCode::SpindleRpm => b'R',
            CommandCode::SpindleDirection => b'G',
            CommandCode::FeedOverride => b'f',
            CommandCode::RapidOverride => b'r',
            CommandCode::Jog => b'J',
            CommandCode::JogVelocity => b'j',
            CommandCode::JogContinuous => b'N',
            CommandCode::JogStop => b'n',
            CommandCode::TaskMode => b'M',
            CommandCode::TaskState => b'E',
            CommandCode::InterpState => b'I',
            CommandCode::CurrentVelocity => b'v',
            CommandCode::MotionType => b't',
            CommandCode::G5xIndex => b'W',
            CommandCode::G5xOffset => b'5',
            CommandCode::G92Offset => b'9',
            CommandCode::ToolOffset => b'T',
            CommandCode::DistanceToGo => b'D',
            CommandCode::Homed => b'h',
            CommandCode::AllHomed => b'H',
            CommandCode::IniValue => b'i',
            CommandCode::Flood => b'C',
            CommandCode::Mist => b'c',
            CommandCode::ExecState => b'e',
            CommandCode::ProgramState => b'p',
            CommandCode::Auto => b'a',
            CommandCode::Heartbeat => b'b',
            CommandCode::Abort => b'!',
            CommandCode::Debug => b'D',
        }
    }

    /// Decode the two code bytes of an inbound frame.
    ///
    /// Returns `None` for codes the bridge does not know. `"DD"` is the debug
    /// command; any other `D?` is distance-to-go.
    pub fn from_wire(code: [u8; 2]) -> Option<Self> {
        let command = match code[0] {
            b'A' => CommandCode::AbsolutePosition,
            b'S' => CommandCode::SpindleSpeed,
            b's' => CommandCode::SpindleOverride,
            b'R' => CommandCode::SpindleRpm,
            b'G' => CommandCode::SpindleDirection,
            b'f' => CommandCode::FeedOverride,
            b'r' => CommandCode::RapidOverride,
            b'J' => CommandCode::Jog,
            b'j' => CommandCode::JogVelocity,
            b'N' => CommandCode::JogContinuous,
            b'n' => CommandCode::JogStop,
            b'M' => CommandCode::TaskMode,
            b'E' => CommandCode::TaskState,
            b'I' => CommandCode::InterpState,
            b'v' => CommandCode::CurrentVelocity,
            b't' => CommandCode::MotionType,
            b'W' => CommandCode::G5xIndex,
            b'5' => CommandCode::G5xOffset,
            b'9' => CommandCode::G92Offset,
            b'T' => CommandCode::ToolOffset,
            b'D' if code[1] == b'D' => CommandCode::Debug,
            b'D' => CommandCode::DistanceToGo,
            b'h' => CommandCode::Homed,
            b'H' => CommandCode::AllHomed,
            b'i' => CommandCode::IniValue,
            b'C' => CommandCode::Flood,
            b'c' => CommandCode::Mist,
            b'e' => CommandCode::ExecState,
            b'p' => CommandCode::ProgramState,
            b'a' => CommandCode::Auto,
            b'b' => CommandCode::Heartbeat,
            b'!' => CommandCode::Abort,
            _ => return None,
        };
        Some(command)
    }

    /// Single-character code string, for outbound frames
    pub fn code(&self) -> String {
        (self.selector() as char).to_string()
    }

    /// Code string with an appended qualifier (axis index, inline value, ini key)
    pub fn with(&self, qualifier: impl std::fmt::Display) -> String {
        format!("{}{}", self.selector() as char, qualifier)
    }

    /// Check if this is one of the jog commands
    pub fn is_jog(&self) -> bool {
        matches!(
            self,
            CommandCode::Jog | CommandCode::JogContinuous | CommandCode::JogStop
        )
    }
}

/// Ini parameter keys (second byte of an `i` frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IniKey {
    /// Number of configured axes
    Axes,
    /// Feed override ceiling
    MaxFeedOverride,
    /// Spindle override floor
    MinSpindleOverride,
    /// Spindle override ceiling
    MaxSpindleOverride,
    /// Spindle speed step
    SpindleIncrement,
    /// Initial spindle speed
    DefaultSpindleSpeed,
    /// Spindle speed limit
    MaxSpindleSpeed,
    /// Linear units name
    LinearUnits,
    /// Angular units name
    AngularUnits,
    /// Initial linear velocity
    DefaultLinearVelocity,
    /// Linear velocity limit
    MaxLinearVelocity,
    /// MDI allowed before homing
    NoForceHoming,
    /// End of the parameter dump
    Complete,
}

impl IniKey {
    /// Get the key byte
    pub fn key(&self) -> char {
        match self {
            IniKey::Axes => 'a',
            IniKey::MaxFeedOverride => 'F',
            IniKey::MinSpindleOverride => 's',
            IniKey::MaxSpindleOverride => 'S',
            IniKey::SpindleIncrement => 't',
            IniKey::DefaultSpindleSpeed => 'r',
            IniKey::MaxSpindleSpeed => 'R',
            IniKey::LinearUnits => 'U',
            IniKey::AngularUnits => 'u',
            IniKey::DefaultLinearVelocity => 'v',
            IniKey::MaxLinearVelocity => 'V',
            IniKey::NoForceHoming => 'h',
            IniKey::Complete => '.',
        }
    }

    /// Full two-character code for this key
    pub fn code(&self) -> String {
        CommandCode::IniValue.with(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire_roundtrips_selectors() {
        let all = [
            CommandCode::AbsolutePosition,
            CommandCode::SpindleSpeed,
            CommandCode::Jog,
            CommandCode::JogStop,
            CommandCode::G5xOffset,
            CommandCode::Heartbeat,
            CommandCode::Abort,
            CommandCode::DistanceToGo,
        ];
        for code in all {
            assert_eq!(CommandCode::from_wire([code.selector(), b'0']), Some(code));
        }
    }

    #[test]
    fn test_debug_code() {
        assert_eq!(CommandCode::from_wire(*b"DD"), Some(CommandCode::Debug));
        assert_eq!(CommandCode::from_wire(*b"D1"), Some(CommandCode::DistanceToGo));
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(CommandCode::from_wire(*b"Zz"), None);
        assert_eq!(CommandCode::from_wire([0, 0]), None);
    }

    #[test]
    fn test_ini_codes() {
        assert_eq!(IniKey::Axes.code(), "ia");
        assert_eq!(IniKey::Complete.code(), "i.");
        assert_eq!(CommandCode::AbsolutePosition.with(2), "A2");
    }
}
