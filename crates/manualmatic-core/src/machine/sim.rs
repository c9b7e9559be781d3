//! Simulated machine
//!
//! A crude in-process stand-in for the CNC controller, good enough to drive a
//! pendant on the bench without a real machine attached.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::{
    axis_indexes, AutoAction, CommandSink, ExecState, JogAction, MachineError, MotionMode,
    SpindleCommand, Stat, StatSource, TaskMode, TaskState, AXIS_LETTERS, MAX_AXES,
};

/// Simulated CNC controller
pub struct SimulatedMachine {
    stat: Stat,
    estop_latch: bool,
    /// Noise source for the spindle speed readback
    rng: StdRng,
}

impl SimulatedMachine {
    /// Create a homed machine, in estop reset, with the given axes configured
    pub fn new(axis_mask: u16) -> Self {
        let axes = axis_indexes(axis_mask);
        let mut stat = Stat {
            axis_mask,
            joints: axes.len(),
            file: "sim.ngc".to_string(),
            ..Stat::default()
        };
        for &axis in &axes {
            stat.homed[axis] = true;
        }
        Self {
            stat,
            estop_latch: false,
            rng: StdRng::from_entropy(),
        }
    }

    /// Current estop latch signal
    pub fn estop_latch(&self) -> bool {
        self.estop_latch
    }

    /// Mutable access to the simulated status, for console tweaks
    pub fn stat_mut(&mut self) -> &mut Stat {
        &mut self.stat
    }

    fn check_axis(&self, axis: usize) -> Result<(), MachineError> {
        if self.stat.has_axis(axis) {
            Ok(())
        } else {
            Err(MachineError::Rejected(format!("axis {} not configured", axis)))
        }
    }

    /// Apply `G10 L20 P0 <axis><value>`: make the current position read `value`
    fn apply_g10_l20(&mut self, words: &[&str]) -> Result<(), MachineError> {
        for word in words {
            let mut chars = word.chars();
            let letter = chars.next().map(|c| c.to_ascii_uppercase());
            let Some(axis) = letter.and_then(|l| AXIS_LETTERS.iter().position(|&a| a == l)) else {
                continue;
            };
            let value: f64 = chars
                .as_str()
                .parse()
                .map_err(|_| MachineError::Rejected(format!("bad MDI word '{}'", word)))?;
            self.stat.g5x_offset[axis] = self.stat.actual_position[axis] - value;
        }
        Ok(())
    }
}

impl StatSource for SimulatedMachine {
    fn poll(&mut self) -> Result<Stat, MachineError> {
        Ok(self.stat.clone())
    }

    fn spindle_speed_out(&mut self) -> Option<f64> {
        let spindle = self.stat.spindle.first()?;
        let target = spindle.speed * spindle.override_value;
        if target == 0.0 {
            return Some(0.0);
        }
        // Within half a percent of target, like a real VFD readback
        let wobble = self.rng.gen_range(-0.005..0.005);
        Some((target * (1.0 + wobble)).round())
    }
}

impl CommandSink for SimulatedMachine {
    fn abort(&mut self) -> Result<(), MachineError> {
        info!("Abort sent!");
        self.stat.exec_state = ExecState::Done;
        self.stat.task_paused = false;
        Ok(())
    }

    fn set_task_state(&mut self, state: TaskState) -> Result<(), MachineError> {
        let current = self.stat.task_state;
        match state {
            TaskState::On if matches!(current, TaskState::EstopReset | TaskState::Off) => {
                info!("turning on");
                self.stat.task_state = TaskState::On;
                self.stat.enabled = true;
            }
            TaskState::Off if current == TaskState::On => {
                info!("turning off");
                self.stat.task_state = TaskState::Off;
                self.stat.enabled = false;
            }
            TaskState::Estop => {
                self.stat.task_state = TaskState::Estop;
                self.stat.estop = true;
                self.stat.enabled = false;
            }
            TaskState::EstopReset => {
                self.stat.task_state = TaskState::EstopReset;
                self.stat.estop = false;
            }
            _ => debug!(?current, target = ?state, "ignoring task state request"),
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: TaskMode) -> Result<(), MachineError> {
        self.stat.task_mode = mode;
        Ok(())
    }

    fn teleop_enable(&mut self, enable: bool) -> Result<(), MachineError> {
        self.stat.motion_mode = if enable {
            MotionMode::Teleop
        } else {
            MotionMode::Free
        };
        Ok(())
    }

    fn wait_complete(&mut self) -> Result<(), MachineError> {
        Ok(())
    }

    fn jog(&mut self, action: JogAction) -> Result<(), MachineError> {
        if self.stat.task_state != TaskState::On {
            return Err(MachineError::Rejected("machine is not on".to_string()));
        }
        match action {
            JogAction::Stop { axis } => {
                self.check_axis(axis)?;
                self.stat.current_vel = 0.0;
            }
            JogAction::Continuous { axis, velocity } => {
                self.check_axis(axis)?;
                self.stat.current_vel = velocity.abs();
            }
            JogAction::Increment { axis, distance, .. } => {
                self.check_axis(axis)?;
                self.stat.actual_position[axis] += distance;
            }
        }
        Ok(())
    }

    fn spindle(&mut self, command: SpindleCommand) -> Result<(), MachineError> {
        let Some(spindle) = self.stat.spindle.first_mut() else {
            return Err(MachineError::Rejected("no spindle".to_string()));
        };
        let (speed, direction) = match command {
            SpindleCommand::Forward(rpm) => (rpm, 1),
            SpindleCommand::Reverse(rpm) => (rpm, -1),
            SpindleCommand::Off => (0.0, 0),
        };
        spindle.speed = speed;
        spindle.direction = direction;
        Ok(())
    }

    fn set_spindle_override_enabled(&mut self, enable: bool) -> Result<(), MachineError> {
        if let Some(spindle) = self.stat.spindle.first_mut() {
            spindle.override_enabled = enable;
        }
        Ok(())
    }

    fn spindle_override(&mut self, value: f64) -> Result<(), MachineError> {
        if let Some(spindle) = self.stat.spindle.first_mut() {
            spindle.override_value = value;
        }
        Ok(())
    }

    fn set_feed_override_enabled(&mut self, enable: bool) -> Result<(), MachineError> {
        self.stat.feed_override_enabled = enable;
        Ok(())
    }

    fn feedrate(&mut self, value: f64) -> Result<(), MachineError> {
        self.stat.feedrate = value;
        Ok(())
    }

    fn rapidrate(&mut self, value: f64) -> Result<(), MachineError> {
        self.stat.rapidrate = value;
        Ok(())
    }

    fn flood(&mut self, on: bool) -> Result<(), MachineError> {
        self.stat.flood = on;
        Ok(())
    }

    fn mist(&mut self, on: bool) -> Result<(), MachineError> {
        self.stat.mist = on;
        Ok(())
    }

    fn mdi(&mut self, command: &str) -> Result<(), MachineError> {
        info!(command, "MDI");
        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            ["G10", "L20", "P0", rest @ ..] => self.apply_g10_l20(rest),
            _ => Ok(()),
        }
    }

    fn auto(&mut self, action: AutoAction) -> Result<(), MachineError> {
        debug!(?action, "auto");
        self.stat.exec_state = ExecState::Exec;
        self.stat.task_paused = matches!(action, AutoAction::Pause | AutoAction::Step);
        Ok(())
    }

    fn set_estop_latch(&mut self, active: bool) -> Result<(), MachineError> {
        self.estop_latch = active;
        Ok(())
    }
}
