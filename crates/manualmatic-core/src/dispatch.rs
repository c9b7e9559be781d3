//! Inbound command dispatch
//!
//! Translates pendant command records into machine calls. Commands whose
//! preconditions do not hold (unconfigured axis, unknown digit, machine not
//! ready for MDI) are dropped without error. Jog failures are swallowed since
//! the pendant streams jogs and the next one supersedes a failed one.

use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::machine::{
    AutoAction, JogAction, Machine, MachineError, MotionMode, SpindleCommand, Stat, TaskMode,
    TaskState, AXIS_LETTERS, MAX_AXES,
};
use crate::protocol::{CommandCode, CommandRecord};

/// Errors raised while dispatching a command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The payload does not parse for this command
    #[error("Invalid payload for '{code}': {payload:?}")]
    InvalidPayload {
        /// Wire code of the command
        code: String,
        /// Payload as received
        payload: String,
    },

    /// The machine refused or failed the resulting call
    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// Follow-up work the bridge has to do after a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing further to do
    None,
    /// A heartbeat arrived
    Heartbeat,
    /// Offsets and positions must be re-sent
    RefreshPositions,
    /// Frame to send back to the pendant
    Reply {
        /// Wire code
        code: String,
        /// Frame payload
        payload: String,
    },
}

/// Command dispatcher and the bridge-side state it owns
#[derive(Debug, Clone)]
pub struct Dispatcher {
    /// Units per minute, as shown on the pendant
    jog_velocity: f64,
    /// Zero disables clamping
    max_spindle_speed: f64,
    spindle_restart_delay: Duration,
}

impl Dispatcher {
    /// Create a dispatcher; `max_spindle_speed` of zero disables clamping
    pub fn new(jog_velocity: f64, max_spindle_speed: f64, spindle_restart_delay: Duration) -> Self {
        Self {
            jog_velocity,
            max_spindle_speed,
            spindle_restart_delay,
        }
    }

    /// Cached jog velocity in units per minute
    pub fn jog_velocity(&self) -> f64 {
        self.jog_velocity
    }

    /// Dispatch one record against the machine, using `stat` for guards.
    pub fn dispatch<M: Machine + ?Sized>(
        &mut self,
        record: &CommandRecord,
        machine: &mut M,
        stat: &Stat,
    ) -> Result<Outcome, CommandError> {
        let Some(command) = CommandCode::from_wire(record.code) else {
            debug!(code = %record.code_str(), "ignoring unrecognized command");
            return Ok(Outcome::None);
        };

        match command {
            CommandCode::Abort => {
                debug!("Received abort");
                machine.abort()?;
                Ok(Outcome::None)
            }
            CommandCode::Heartbeat => Ok(Outcome::Heartbeat),
            command if command.is_jog() => {
                self.jog(command, record, machine, stat)?;
                Ok(Outcome::None)
            }
            CommandCode::TaskState => self.task_state(record, machine, stat),
            CommandCode::JogVelocity => {
                self.jog_velocity = parse_payload(record)?;
                Ok(Outcome::Reply {
                    code: CommandCode::JogVelocity.code(),
                    payload: self.jog_velocity.to_string(),
                })
            }
            CommandCode::SpindleSpeed => {
                self.spindle_speed(parse_payload(record)?, machine, stat)?;
                Ok(Outcome::None)
            }
            CommandCode::SpindleOverride => {
                let value = parse_payload(record)?;
                let enabled = stat.spindle.first().is_some_and(|s| s.override_enabled);
                if !enabled {
                    machine.set_spindle_override_enabled(true)?;
                    machine.wait_complete()?;
                }
                machine.spindle_override(value)?;
                Ok(Outcome::None)
            }
            CommandCode::FeedOverride | CommandCode::RapidOverride => {
                let value = parse_payload(record)?;
                // The feed override switch gates rapids as well
                if !stat.feed_override_enabled {
                    machine.set_feed_override_enabled(true)?;
                    machine.wait_complete()?;
                }
                if command == CommandCode::FeedOverride {
                    machine.feedrate(value)?;
                } else {
                    machine.rapidrate(value)?;
                }
                Ok(Outcome::None)
            }
            CommandCode::TaskMode => {
                if let Some(mode) = TaskMode::from_digit(record.qualifier()) {
                    machine.set_mode(mode)?;
                }
                Ok(Outcome::None)
            }
            CommandCode::G5xOffset => self.work_offset(record, machine, stat),
            CommandCode::Flood | CommandCode::Mist => {
                let on = match record.qualifier() {
                    b'0' => false,
                    b'1'..=b'9' => true,
                    _ => return Err(invalid(record)),
                };
                if command == CommandCode::Flood {
                    machine.flood(on)?;
                } else {
                    machine.mist(on)?;
                }
                Ok(Outcome::None)
            }
            CommandCode::Auto => {
                let action = match record.qualifier() {
                    b'0' => AutoAction::Run { from_line: 1 },
                    b'1' => AutoAction::Step,
                    b'2' => AutoAction::Pause,
                    b'3' => AutoAction::Resume,
                    _ => return Ok(Outcome::None),
                };
                machine.auto(action)?;
                Ok(Outcome::None)
            }
            CommandCode::Debug => {
                debug!("Debug: {}", record.payload);
                Ok(Outcome::None)
            }
            _ => {
                debug!(code = %record.code_str(), "ignoring outbound-only command");
                Ok(Outcome::None)
            }
        }
    }

    fn jog<M: Machine + ?Sized>(
        &mut self,
        command: CommandCode,
        record: &CommandRecord,
        machine: &mut M,
        stat: &Stat,
    ) -> Result<(), CommandError> {
        let Some(axis) = axis_index(record).filter(|&axis| stat.has_axis(axis)) else {
            return Ok(());
        };
        // Only the jog itself is best effort; a machine refusing teleop is reported
        if stat.motion_mode != MotionMode::Teleop {
            machine.teleop_enable(true)?;
            machine.wait_complete()?;
        }

        let action = match command {
            CommandCode::JogStop => Some(JogAction::Stop { axis }),
            CommandCode::Jog => parse_payload(record).ok().map(|distance| JogAction::Increment {
                axis,
                velocity: self.jog_velocity / 60.0,
                distance,
            }),
            _ => parse_payload(record).ok().map(|velocity| {
                if velocity == 0.0 {
                    JogAction::Stop { axis }
                } else {
                    JogAction::Continuous {
                        axis,
                        velocity: velocity / 60.0,
                    }
                }
            }),
        };
        match action {
            Some(action) => {
                if let Err(e) = machine.jog(action) {
                    debug!(?action, "jog failed: {}", e);
                }
            }
            None => debug!(payload = %record.payload, "unparseable jog payload"),
        }
        Ok(())
    }

    fn task_state<M: Machine + ?Sized>(
        &mut self,
        record: &CommandRecord,
        machine: &mut M,
        stat: &Stat,
    ) -> Result<Outcome, CommandError> {
        let Some(target) = TaskState::from_digit(record.qualifier()) else {
            return Ok(Outcome::None);
        };
        let current = stat.task_state;
        let outcome = match target {
            TaskState::On if matches!(current, TaskState::EstopReset | TaskState::Off) => {
                info!("Turning machine on");
                machine.set_task_state(TaskState::On)?;
                Outcome::RefreshPositions
            }
            TaskState::Off if current == TaskState::On => {
                info!("Turning machine off");
                machine.set_task_state(TaskState::Off)?;
                Outcome::None
            }
            TaskState::Estop => {
                info!("ESTOP");
                machine.set_estop_latch(true)?;
                machine.set_task_state(TaskState::Estop)?;
                Outcome::None
            }
            TaskState::EstopReset => {
                info!("ESTOP reset");
                machine.set_estop_latch(false)?;
                machine.set_task_state(TaskState::EstopReset)?;
                Outcome::None
            }
            _ => {
                debug!(?current, ?target, "ignoring task state request");
                Outcome::None
            }
        };
        Ok(outcome)
    }

    fn spindle_speed<M: Machine + ?Sized>(
        &mut self,
        rpm: f64,
        machine: &mut M,
        stat: &Stat,
    ) -> Result<(), CommandError> {
        let (override_enabled, stopped) = stat
            .spindle
            .first()
            .map_or((false, true), |s| (s.override_enabled, s.direction == 0));
        if !override_enabled {
            machine.set_spindle_override_enabled(true)?;
            machine.wait_complete()?;
        }

        let magnitude = if self.max_spindle_speed > 0.0 {
            rpm.abs().min(self.max_spindle_speed)
        } else {
            rpm.abs()
        };
        let command = if rpm > 0.0 {
            SpindleCommand::Forward(magnitude)
        } else if rpm < 0.0 {
            SpindleCommand::Reverse(magnitude)
        } else {
            SpindleCommand::Off
        };

        // A stopped spindle ignores the first speed and starts at the GUI default
        if stopped && command != SpindleCommand::Off {
            machine.spindle(command)?;
            thread::sleep(self.spindle_restart_delay);
        }
        machine.spindle(command)?;
        Ok(())
    }

    fn work_offset<M: Machine + ?Sized>(
        &mut self,
        record: &CommandRecord,
        machine: &mut M,
        stat: &Stat,
    ) -> Result<Outcome, CommandError> {
        let Some(axis) = axis_index(record).filter(|&axis| stat.has_axis(axis)) else {
            return Ok(Outcome::None);
        };
        let value = parse_payload(record)?;

        // Guard on fresh status; the tick's snapshot may predate earlier commands
        let fresh = machine.poll()?;
        if !fresh.ok_for_mdi() {
            debug!(axis, "not ready for MDI, ignoring offset");
            return Ok(Outcome::None);
        }

        let offset = (value * 1e5).round() / 1e5;
        let mdi = format!("G10 L20 P0 {}{}", AXIS_LETTERS[axis], offset);
        machine.set_mode(TaskMode::Mdi)?;
        machine.wait_complete()?;
        machine.mdi(&mdi)?;
        machine.wait_complete()?;
        machine.set_mode(TaskMode::Manual)?;
        machine.wait_complete()?;
        Ok(Outcome::RefreshPositions)
    }
}

/// Axis index carried in the second code byte
fn axis_index(record: &CommandRecord) -> Option<usize> {
    let digit = record.qualifier();
    digit
        .is_ascii_digit()
        .then(|| (digit - b'0') as usize)
        .filter(|&axis| axis < MAX_AXES)
}

fn parse_payload(record: &CommandRecord) -> Result<f64, CommandError> {
    record
        .payload
        .trim()
        .parse()
        .map_err(|_| invalid(record))
}

fn invalid(record: &CommandRecord) -> CommandError {
    CommandError::InvalidPayload {
        code: record.code_str(),
        payload: record.payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_index() {
        assert_eq!(axis_index(&CommandRecord::new("J2", "1")), Some(2));
        assert_eq!(axis_index(&CommandRecord::new("J8", "1")), Some(8));
        assert_eq!(axis_index(&CommandRecord::new("J9", "1")), None);
        assert_eq!(axis_index(&CommandRecord::new("J", "1")), None);
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(&CommandRecord::new("f", " 1.25")), Ok(1.25));
        assert_eq!(
            parse_payload(&CommandRecord::new("f", "fast")),
            Err(CommandError::InvalidPayload {
                code: "f ".to_string(),
                payload: "fast".to_string()
            })
        );
    }
}
