//! Per-connection publishing session
//!
//! A session is built from one status snapshot and is thrown away whenever
//! the power state or the axis configuration changes. Building one sends the
//! pendant everything it needs to start over: power state, machine
//! parameters and jog velocity, followed by every tracked field on the first
//! publish pass.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::PendantSettings;
use crate::machine::{Stat, TaskState};
use crate::protocol::{CommandCode, IniKey};
use crate::publish::{
    AxisField, FrameSink, PublishError, ScalarField, Tracked, TrackedArray, TrackedValue,
};

/// Throttled publisher for the actual spindle speed
#[derive(Debug, Clone)]
struct SpindleRpm {
    interval: Duration,
    last_sent: Option<f64>,
    last_update: Option<Instant>,
}

impl SpindleRpm {
    fn update<S: FrameSink + ?Sized>(&mut self, now: Instant, rpm: f64, sink: &mut S) -> bool {
        if self.last_sent == Some(rpm) {
            return false;
        }
        if let Some(last) = self.last_update {
            if now.saturating_duration_since(last) <= self.interval {
                return false;
            }
        }
        self.last_update = Some(now);
        let sent = sink.send(&CommandCode::SpindleRpm.code(), &rpm.to_string());
        if sent {
            self.last_sent = Some(rpm);
        }
        sent
    }
}

/// State mirrored to the pendant for the current power state and axis set
#[derive(Debug, Clone)]
pub struct Session {
    task_state: TaskState,
    axis_mask: u16,
    axes: Vec<usize>,
    table: Vec<Tracked>,
    spindle_rpm: SpindleRpm,
}

impl Session {
    /// Start a session for `stat`, announcing it to the pendant.
    ///
    /// Sends the power state, the parameter dump (terminated by `i.`) and the
    /// jog velocity. Tracked fields start dirty and go out on the next
    /// [`publish`](Self::publish).
    pub fn reset<S: FrameSink + ?Sized>(
        stat: &Stat,
        settings: &PendantSettings,
        jog_velocity: f64,
        spindle_rpm_interval: Duration,
        sink: &mut S,
    ) -> Self {
        debug!(task_state = ?stat.task_state, axis_mask = stat.axis_mask, "resetting session");
        sink.send(&CommandCode::TaskState.with(stat.task_state.value()), "");

        let axes = stat.axes();
        info!("Sending ini values...");
        sink.send(&IniKey::Axes.code(), &axes.len().to_string());
        for (key, value) in settings.entries() {
            sink.send(&key.code(), &value);
        }
        sink.send(&IniKey::Complete.code(), "");

        let table = build_table(&axes);
        sink.send(&CommandCode::JogVelocity.code(), &jog_velocity.to_string());

        Self {
            task_state: stat.task_state,
            axis_mask: stat.axis_mask,
            axes,
            table,
            spindle_rpm: SpindleRpm {
                interval: spindle_rpm_interval,
                last_sent: None,
                last_update: None,
            },
        }
    }

    /// Task state the session was built for
    pub fn task_state(&self) -> TaskState {
        self.task_state
    }

    /// Configured axes, in ascending order
    pub fn axes(&self) -> &[usize] {
        &self.axes
    }

    /// Publish table, in send order
    pub fn table(&self) -> &[Tracked] {
        &self.table
    }

    /// Whether `stat` has moved on from the snapshot this session was built for
    pub fn is_stale(&self, stat: &Stat) -> bool {
        stat.task_state != self.task_state || stat.axis_mask != self.axis_mask
    }

    /// Re-send offsets, absolute positions and the work coordinate index
    pub fn refresh_positions(&mut self) {
        for entry in self.table.iter_mut().filter(|e| e.is_position()) {
            entry.force_refresh();
        }
    }

    /// Force every tracked field out on the next pass
    pub fn refresh_all(&mut self) {
        for entry in &mut self.table {
            entry.force_refresh();
        }
    }

    /// Publish changed fields. Nothing is published unless the machine is on.
    ///
    /// Returns the number of frames sent; the first unreadable field aborts
    /// the pass.
    pub fn publish<S: FrameSink + ?Sized>(
        &mut self,
        stat: &Stat,
        sink: &mut S,
    ) -> Result<usize, PublishError> {
        if stat.task_state != TaskState::On {
            return Ok(0);
        }
        let mut sent = 0;
        for entry in &mut self.table {
            sent += entry.update(stat, sink)?;
        }
        Ok(sent)
    }

    /// Publish the actual spindle speed when it changed, at most once per interval
    pub fn publish_spindle_rpm<S: FrameSink + ?Sized>(
        &mut self,
        now: Instant,
        rpm: f64,
        sink: &mut S,
    ) -> bool {
        self.spindle_rpm.update(now, rpm, sink)
    }
}

/// Publish table in pass order
fn build_table(axes: &[usize]) -> Vec<Tracked> {
    let mut table = vec![Tracked::Value(TrackedValue::scalar(ScalarField::G5xIndex))];
    table.extend(
        AxisField::ALL
            .into_iter()
            .filter(|&field| field != AxisField::Homed)
            .map(|field| Tracked::Array(TrackedArray::new(field, axes))),
    );
    for field in ScalarField::ALL.into_iter().skip(1) {
        // Per-axis homed flags go out just ahead of the all-homed summary
        if field == ScalarField::AllHomed {
            table.push(Tracked::Array(TrackedArray::new(AxisField::Homed, axes)));
        }
        table.push(Tracked::Value(TrackedValue::scalar(field)));
    }
    table
}
