//! Published field table
//!
//! Every machine field mirrored to the pendant, with its wire code, send shape,
//! formatting and accessor.

use thiserror::Error;

use crate::machine::{SpindleStat, Stat};
use crate::protocol::CommandCode;

/// A status field the snapshot did not provide
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// A scalar field is absent
    #[error("'{0}' missing from status snapshot")]
    Missing(&'static str),

    /// An axis index is beyond a per-axis array
    #[error("axis {index} missing from '{field}'")]
    AxisMissing {
        /// Status array name
        field: &'static str,
        /// Requested axis index
        index: usize,
    },
}

/// A raw field value, compared to detect changes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Integer or flag value
    Int(i64),
    /// Floating point value
    Real(f64),
}

impl Reading {
    /// Change detection equality; NaN matches NaN
    pub fn same_as(self, other: Reading) -> bool {
        match (self, other) {
            (Reading::Int(a), Reading::Int(b)) => a == b,
            (Reading::Real(a), Reading::Real(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl From<bool> for Reading {
    fn from(value: bool) -> Self {
        Reading::Int(value as i64)
    }
}

impl From<u8> for Reading {
    fn from(value: u8) -> Self {
        Reading::Int(value as i64)
    }
}

impl From<f64> for Reading {
    fn from(value: f64) -> Self {
        Reading::Real(value)
    }
}

/// How a reading is rendered as payload text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Shortest natural representation
    Plain,
    /// Five decimal places, for positions and offsets
    Fixed5,
}

impl Format {
    /// Render a reading
    pub fn render(self, reading: Reading) -> String {
        match (self, reading) {
            (Format::Plain, Reading::Int(v)) => v.to_string(),
            (Format::Plain, Reading::Real(v)) => v.to_string(),
            (Format::Fixed5, Reading::Int(v)) => format!("{:.5}", v as f64),
            (Format::Fixed5, Reading::Real(v)) => format!("{:.5}", v),
        }
    }
}

/// How a field is framed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Code and payload are separate (`"f "` + `"1.2"`)
    Value,
    /// The value is appended to the code (`"E"` + `"4"` = `"E4"`)
    Inline,
}

/// Scalar fields published while the machine is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarField {
    /// Active work coordinate system
    G5xIndex,
    /// Spindle override fraction
    SpindleOverride,
    /// Spindle direction (-1, 0, 1)
    SpindleDirection,
    /// Feed override fraction
    FeedOverride,
    /// Rapid override fraction
    RapidOverride,
    /// Manual, auto or MDI
    TaskMode,
    /// Every configured joint homed
    AllHomed,
    /// Interpreter state
    InterpState,
    /// Current tool velocity
    CurrentVelocity,
    /// Type of the current move
    MotionType,
    /// Flood coolant
    Flood,
    /// Mist coolant
    Mist,
    /// Execution state
    ExecState,
    /// Derived program state
    ProgramState,
}

impl ScalarField {
    /// Publication order within a pass
    pub const ALL: [ScalarField; 14] = [
        ScalarField::G5xIndex,
        ScalarField::SpindleOverride,
        ScalarField::SpindleDirection,
        ScalarField::FeedOverride,
        ScalarField::RapidOverride,
        ScalarField::TaskMode,
        ScalarField::AllHomed,
        ScalarField::InterpState,
        ScalarField::CurrentVelocity,
        ScalarField::MotionType,
        ScalarField::Flood,
        ScalarField::Mist,
        ScalarField::ExecState,
        ScalarField::ProgramState,
    ];

    /// Wire command
    pub fn command(self) -> CommandCode {
        match self {
            ScalarField::G5xIndex => CommandCode::G5xIndex,
            ScalarField::SpindleOverride => CommandCode::SpindleOverride,
            ScalarField::SpindleDirection => CommandCode::SpindleDirection,
            ScalarField::FeedOverride => CommandCode::FeedOverride,
            ScalarField::RapidOverride => CommandCode::RapidOverride,
            ScalarField::TaskMode => CommandCode::TaskMode,
            ScalarField::AllHomed => CommandCode::AllHomed,
            ScalarField::InterpState => CommandCode::InterpState,
            ScalarField::CurrentVelocity => CommandCode::CurrentVelocity,
            ScalarField::MotionType => CommandCode::MotionType,
            ScalarField::Flood => CommandCode::Flood,
            ScalarField::Mist => CommandCode::Mist,
            ScalarField::ExecState => CommandCode::ExecState,
            ScalarField::ProgramState => CommandCode::ProgramState,
        }
    }

    /// Single-character state fields travel inline
    pub fn shape(self) -> Shape {
        match self {
            ScalarField::G5xIndex
            | ScalarField::TaskMode
            | ScalarField::AllHomed
            | ScalarField::MotionType
            | ScalarField::Flood
            | ScalarField::Mist
            | ScalarField::ExecState
            | ScalarField::ProgramState => Shape::Inline,
            _ => Shape::Value,
        }
    }

    /// Re-sent after a work offset change
    pub fn is_position(self) -> bool {
        self == ScalarField::G5xIndex
    }

    /// Read the field from a snapshot
    pub fn read(self, stat: &Stat) -> Result<Reading, FieldError> {
        let reading = match self {
            ScalarField::G5xIndex => stat.g5x_index.into(),
            ScalarField::SpindleOverride => spindle(stat)?.override_value.into(),
            ScalarField::SpindleDirection => Reading::Int(spindle(stat)?.direction as i64),
            ScalarField::FeedOverride => stat.feedrate.into(),
            ScalarField::RapidOverride => stat.rapidrate.into(),
            ScalarField::TaskMode => stat.task_mode.value().into(),
            ScalarField::AllHomed => stat.is_homed().into(),
            ScalarField::InterpState => stat.interp_state.value().into(),
            ScalarField::CurrentVelocity => stat.current_vel.into(),
            ScalarField::MotionType => stat.motion_type.into(),
            ScalarField::Flood => stat.flood.into(),
            ScalarField::Mist => stat.mist.into(),
            ScalarField::ExecState => stat.exec_state.value().into(),
            ScalarField::ProgramState => stat.program_state().value().into(),
        };
        Ok(reading)
    }
}

fn spindle(stat: &Stat) -> Result<&SpindleStat, FieldError> {
    stat.spindle.first().ok_or(FieldError::Missing("spindle"))
}

/// Per-axis fields published while the machine is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisField {
    /// Work offset
    G5xOffset,
    /// G92 offset
    G92Offset,
    /// Tool length offset
    ToolOffset,
    /// Absolute position
    AbsolutePosition,
    /// Distance to go
    DistanceToGo,
    /// Homed flag
    Homed,
}

impl AxisField {
    /// Publication order within a pass
    pub const ALL: [AxisField; 6] = [
        AxisField::G5xOffset,
        AxisField::G92Offset,
        AxisField::ToolOffset,
        AxisField::AbsolutePosition,
        AxisField::DistanceToGo,
        AxisField::Homed,
    ];

    /// Wire command; the axis index is appended
    pub fn command(self) -> CommandCode {
        match self {
            AxisField::G5xOffset => CommandCode::G5xOffset,
            AxisField::G92Offset => CommandCode::G92Offset,
            AxisField::ToolOffset => CommandCode::ToolOffset,
            AxisField::AbsolutePosition => CommandCode::AbsolutePosition,
            AxisField::DistanceToGo => CommandCode::DistanceToGo,
            AxisField::Homed => CommandCode::Homed,
        }
    }

    /// Payload format
    pub fn format(self) -> Format {
        match self {
            AxisField::Homed => Format::Plain,
            _ => Format::Fixed5,
        }
    }

    /// Offsets and absolute positions are re-sent after a work offset change
    pub fn is_position(self) -> bool {
        !matches!(self, AxisField::DistanceToGo | AxisField::Homed)
    }

    fn name(self) -> &'static str {
        match self {
            AxisField::G5xOffset => "g5x_offset",
            AxisField::G92Offset => "g92_offset",
            AxisField::ToolOffset => "tool_offset",
            AxisField::AbsolutePosition => "actual_position",
            AxisField::DistanceToGo => "dtg",
            AxisField::Homed => "homed",
        }
    }

    /// Read the field for one axis
    pub fn read(self, stat: &Stat, index: usize) -> Result<Reading, FieldError> {
        let missing = || FieldError::AxisMissing {
            field: self.name(),
            index,
        };
        let values = match self {
            AxisField::G5xOffset => &stat.g5x_offset,
            AxisField::G92Offset => &stat.g92_offset,
            AxisField::ToolOffset => &stat.tool_offset,
            AxisField::AbsolutePosition => &stat.actual_position,
            AxisField::DistanceToGo => &stat.dtg,
            AxisField::Homed => {
                return stat.homed.get(index).map(|&h| h.into()).ok_or_else(missing);
            }
        };
        values.get(index).map(|&v| v.into()).ok_or_else(missing)
    }
}
