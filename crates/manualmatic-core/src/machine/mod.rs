//! Machine interface
//!
//! The bridge talks to the CNC controller through two seams: a pollable status
//! snapshot ([`Stat`] via [`StatSource`]) and a command sink ([`CommandSink`]).
//! Enum values follow the controller's numbering so they can be sent to the
//! pendant as-is.

mod sim;

pub use sim::SimulatedMachine;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of axes (X Y Z A B C U V W)
pub const MAX_AXES: usize = 9;

/// Axis letters indexed by axis number, used for MDI commands
pub const AXIS_LETTERS: [char; MAX_AXES] = ['X', 'Y', 'Z', 'A', 'B', 'C', 'U', 'V', 'W'];

/// Errors reported by the machine collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MachineError {
    /// The controller refused the command
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// No status could be read
    #[error("Status unavailable: {0}")]
    Unavailable(String),

    /// The command did not complete in time
    #[error("Timed out waiting for command completion")]
    Timeout,
}

/// Task power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Emergency stop active
    Estop,
    /// Emergency stop released, machine off
    EstopReset,
    /// Machine off
    Off,
    /// Machine on
    On,
}

impl TaskState {
    /// Numeric value on the wire
    pub fn value(self) -> u8 {
        match self {
            TaskState::Estop => 1,
            TaskState::EstopReset => 2,
            TaskState::Off => 3,
            TaskState::On => 4,
        }
    }

    /// Parse a wire digit ('1'..'4')
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'1' => Some(TaskState::Estop),
            b'2' => Some(TaskState::EstopReset),
            b'3' => Some(TaskState::Off),
            b'4' => Some(TaskState::On),
            _ => None,
        }
    }
}

/// Task mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskMode {
    /// Manual (jog) mode
    Manual,
    /// Program execution
    Auto,
    /// Manual data input
    Mdi,
}

impl TaskMode {
    /// Numeric value on the wire
    pub fn value(self) -> u8 {
        match self {
            TaskMode::Manual => 1,
            TaskMode::Auto => 2,
            TaskMode::Mdi => 3,
        }
    }

    /// Parse a wire digit ('1'..'3')
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'1' => Some(TaskMode::Manual),
            b'2' => Some(TaskMode::Auto),
            b'3' => Some(TaskMode::Mdi),
            _ => None,
        }
    }
}

/// Interpreter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpState {
    /// Interpreter idle
    Idle,
    /// Interpreter reading ahead
    Reading,
    /// Interpreter paused
    Paused,
    /// Interpreter waiting for motion
    Waiting,
}

impl InterpState {
    /// Numeric value on the wire
    pub fn value(self) -> u8 {
        match self {
            InterpState::Idle => 1,
            InterpState::Reading => 2,
            InterpState::Paused => 3,
            InterpState::Waiting => 4,
        }
    }
}

/// Execution state of the last issued command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecState {
    /// Last command finished
    Done,
    /// A command is executing
    Exec,
    /// Last command failed
    Error,
}

impl ExecState {
    /// Numeric value on the wire (the pendant numbers these from zero)
    pub fn value(self) -> u8 {
        match self {
            ExecState::Done => 0,
            ExecState::Exec => 1,
            ExecState::Error => 2,
        }
    }
}

/// Trajectory planner mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionMode {
    /// Joint mode
    Free,
    /// Coordinated motion
    Coord,
    /// Cartesian jogging
    Teleop,
}

/// Program state as shown on the pendant while in auto mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramState {
    /// Not in auto mode or no program loaded
    None,
    /// Program running
    Running,
    /// Program paused
    Paused,
    /// Program finished or aborted
    Stopped,
}

impl ProgramState {
    /// Numeric value on the wire
    pub fn value(self) -> u8 {
        match self {
            ProgramState::None => 0,
            ProgramState::Running => 1,
            ProgramState::Paused => 2,
            ProgramState::Stopped => 3,
        }
    }
}

/// Status of one spindle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpindleStat {
    /// Commanded speed (RPM before override)
    pub speed: f64,
    /// Override factor (1.0 = 100%)
    pub override_value: f64,
    /// -1 reverse, 0 stopped, 1 forward
    pub direction: i8,
    /// Whether the override is honoured
    pub override_enabled: bool,
}

impl Default for SpindleStat {
    fn default() -> Self {
        Self {
            speed: 0.0,
            override_value: 1.0,
            direction: 0,
            override_enabled: false,
        }
    }
}

/// A polled machine status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    /// Power state
    pub task_state: TaskState,
    /// Manual, auto or MDI
    pub task_mode: TaskMode,
    /// Interpreter state
    pub interp_state: InterpState,
    /// Execution state of the last command
    pub exec_state: ExecState,
    /// Trajectory planner mode
    pub motion_mode: MotionMode,
    /// Motion type of the current move (0 = none, 1 = traverse, 2 = feed, ...)
    pub motion_type: u8,
    /// Emergency stop asserted
    pub estop: bool,
    /// Motion enabled
    pub enabled: bool,
    /// Bit i set means axis i is configured
    pub axis_mask: u16,
    /// Number of configured joints
    pub joints: usize,
    /// Homed flag per joint
    pub homed: Vec<bool>,
    /// Absolute machine position per axis
    pub actual_position: Vec<f64>,
    /// Active work offset per axis
    pub g5x_offset: Vec<f64>,
    /// G92 offset per axis
    pub g92_offset: Vec<f64>,
    /// Tool length offset per axis
    pub tool_offset: Vec<f64>,
    /// Distance to go per axis
    pub dtg: Vec<f64>,
    /// Active work coordinate system (1 = G54)
    pub g5x_index: u8,
    /// Per-spindle status
    pub spindle: Vec<SpindleStat>,
    /// Feed override, as a fraction
    pub feedrate: f64,
    /// Rapid override, as a fraction
    pub rapidrate: f64,
    /// Feed override switch
    pub feed_override_enabled: bool,
    /// Current tool velocity
    pub current_vel: f64,
    /// Flood coolant on
    pub flood: bool,
    /// Mist coolant on
    pub mist: bool,
    /// Program paused
    pub task_paused: bool,
    /// Loaded program path, empty when none
    pub file: String,
}

impl Default for Stat {
    fn default() -> Self {
        Self {
            task_state: TaskState::EstopReset,
            task_mode: TaskMode::Manual,
            interp_state: InterpState::Idle,
            exec_state: ExecState::Done,
            motion_mode: MotionMode::Free,
            motion_type: 0,
            estop: false,
            enabled: false,
            axis_mask: 0,
            joints: 0,
            homed: vec![false; MAX_AXES],
            actual_position: vec![0.0; MAX_AXES],
            g5x_offset: vec![0.0; MAX_AXES],
            g92_offset: vec![0.0; MAX_AXES],
            tool_offset: vec![0.0; MAX_AXES],
            dtg: vec![0.0; MAX_AXES],
            g5x_index: 1,
            spindle: vec![SpindleStat::default()],
            feedrate: 1.0,
            rapidrate: 1.0,
            feed_override_enabled: false,
            current_vel: 0.0,
            flood: false,
            mist: false,
            task_paused: false,
            file: String::new(),
        }
    }
}

impl Stat {
    /// Indexes of configured axes, in ascending order
    pub fn axes(&self) -> Vec<usize> {
        axis_indexes(self.axis_mask)
    }

    /// Check whether axis `index` is configured
    pub fn has_axis(&self, index: usize) -> bool {
        index < MAX_AXES && self.axis_mask & (1 << index) != 0
    }

    /// All joints homed
    pub fn is_homed(&self) -> bool {
        self.homed.iter().filter(|&&h| h).count() == self.joints
    }

    /// Safe to run an MDI command: powered, homed, out of estop and idle
    pub fn ok_for_mdi(&self) -> bool {
        !self.estop && self.enabled && self.is_homed() && self.interp_state == InterpState::Idle
    }

    /// Derive the program state shown while in auto mode
    pub fn program_state(&self) -> ProgramState {
        if self.task_mode != TaskMode::Auto || self.file.is_empty() {
            return ProgramState::None;
        }
        match self.exec_state {
            ExecState::Done | ExecState::Error => ProgramState::Stopped,
            ExecState::Exec if self.task_paused && self.current_vel == 0.0 => ProgramState::Paused,
            ExecState::Exec => ProgramState::Running,
        }
    }
}

/// Axis indexes set in a bitmask
pub fn axis_indexes(mask: u16) -> Vec<usize> {
    (0..MAX_AXES).filter(|i| mask & (1 << i) != 0).collect()
}

/// Jog request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JogAction {
    /// Stop jogging an axis
    Stop {
        /// Axis index
        axis: usize,
    },
    /// Velocity in units per second; negative jogs in reverse
    Continuous {
        /// Axis index
        axis: usize,
        /// Units per second
        velocity: f64,
    },
    /// Move `distance` at `velocity` units per second
    Increment {
        /// Axis index
        axis: usize,
        /// Units per second
        velocity: f64,
        /// Signed distance to move
        distance: f64,
    },
}

/// Spindle request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpindleCommand {
    /// Clockwise at the given RPM
    Forward(f64),
    /// Counter-clockwise at the given RPM
    Reverse(f64),
    /// Stop the spindle
    Off,
}

/// Program control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAction {
    /// Run the loaded program
    Run {
        /// First program line to execute
        from_line: u32,
    },
    /// Execute one line
    Step,
    /// Pause the running program
    Pause,
    /// Resume a paused program
    Resume,
}

/// Source of machine status snapshots
pub trait StatSource {
    /// Refresh and return the current status
    fn poll(&mut self) -> Result<Stat, MachineError>;

    /// Actual spindle speed output signal, when the controller exposes one
    fn spindle_speed_out(&mut self) -> Option<f64> {
        None
    }
}

/// Machine control operations
pub trait CommandSink {
    /// Abort motion and program execution
    fn abort(&mut self) -> Result<(), MachineError>;
    /// Request a power state
    fn set_task_state(&mut self, state: TaskState) -> Result<(), MachineError>;
    /// Switch task mode
    fn set_mode(&mut self, mode: TaskMode) -> Result<(), MachineError>;
    /// Switch between teleop and joint motion
    fn teleop_enable(&mut self, enable: bool) -> Result<(), MachineError>;
    /// Block until the previous command has completed
    fn wait_complete(&mut self) -> Result<(), MachineError>;
    /// Start or stop a jog
    fn jog(&mut self, action: JogAction) -> Result<(), MachineError>;
    /// Start, reverse or stop the spindle
    fn spindle(&mut self, command: SpindleCommand) -> Result<(), MachineError>;
    /// Enable or disable the spindle override
    fn set_spindle_override_enabled(&mut self, enable: bool) -> Result<(), MachineError>;
    /// Set the spindle override fraction
    fn spindle_override(&mut self, value: f64) -> Result<(), MachineError>;
    /// Also gates the rapid override
    fn set_feed_override_enabled(&mut self, enable: bool) -> Result<(), MachineError>;
    /// Set the feed override fraction
    fn feedrate(&mut self, value: f64) -> Result<(), MachineError>;
    /// Set the rapid override fraction
    fn rapidrate(&mut self, value: f64) -> Result<(), MachineError>;
    /// Switch flood coolant
    fn flood(&mut self, on: bool) -> Result<(), MachineError>;
    /// Switch mist coolant
    fn mist(&mut self, on: bool) -> Result<(), MachineError>;
    /// Execute an MDI line
    fn mdi(&mut self, command: &str) -> Result<(), MachineError>;
    /// Control program execution
    fn auto(&mut self, action: AutoAction) -> Result<(), MachineError>;
    /// External estop latch signal
    fn set_estop_latch(&mut self, active: bool) -> Result<(), MachineError>;
}

/// A complete machine: status plus commands
pub trait Machine: StatSource + CommandSink {}

impl<T: StatSource + CommandSink> Machine for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_indexes() {
        assert_eq!(axis_indexes(0b111), vec![0, 1, 2]);
        assert_eq!(axis_indexes(0b1_0000_1001), vec![0, 3, 8]);
        assert!(axis_indexes(0).is_empty());
    }

    #[test]
    fn test_program_state() {
        let mut stat = Stat::default();
        assert_eq!(stat.program_state(), ProgramState::None);

        stat.task_mode = TaskMode::Auto;
        stat.file = "part.ngc".to_string();
        assert_eq!(stat.program_state(), ProgramState::Stopped);

        stat.exec_state = ExecState::Exec;
        assert_eq!(stat.program_state(), ProgramState::Running);

        stat.task_paused = true;
        stat.current_vel = 1.5;
        assert_eq!(stat.program_state(), ProgramState::Running);

        stat.current_vel = 0.0;
        assert_eq!(stat.program_state(), ProgramState::Paused);
    }

    #[test]
    fn test_ok_for_mdi() {
        let mut stat = Stat {
            enabled: true,
            joints: 2,
            ..Stat::default()
        };
        assert!(!stat.ok_for_mdi());
        stat.homed[0] = true;
        stat.homed[1] = true;
        assert!(stat.ok_for_mdi());
        stat.interp_state = InterpState::Reading;
        assert!(!stat.ok_for_mdi());
    }
}
