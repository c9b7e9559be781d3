//! Shared fakes for integration tests: a scripted serial link and a machine
//! that records every command it receives.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use manualmatic_core::config::{BridgeConfig, PendantSettings};
use manualmatic_core::machine::{
    AutoAction, CommandSink, JogAction, MachineError, SpindleCommand, Stat, StatSource, TaskMode,
    TaskState,
};
use manualmatic_core::protocol::{encode_frame, Connector, FrameDecoder, Link, ProtocolError};
use manualmatic_core::publish::FrameSink;
use manualmatic_core::bridge::Bridge;
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct LinkShared {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    fail_reads: bool,
    fail_writes: bool,
    available: bool,
    opens: usize,
}

/// Handle on the far end of a scripted link, kept by the test
#[derive(Clone, Default)]
pub struct LinkHandle(Arc<Mutex<LinkShared>>);

impl LinkHandle {
    /// A pendant that is plugged in
    pub fn available() -> Self {
        let handle = Self::default();
        handle.set_available(true);
        handle
    }

    pub fn set_available(&self, available: bool) {
        self.0.lock().unwrap().available = available;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.0.lock().unwrap().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.lock().unwrap().fail_writes = fail;
    }

    /// Number of successful opens
    pub fn opens(&self) -> usize {
        self.0.lock().unwrap().opens
    }

    /// Queue raw bytes as if sent by the pendant
    pub fn feed(&self, bytes: &[u8]) {
        self.0.lock().unwrap().incoming.extend(bytes.iter().copied());
    }

    /// Queue a framed command as if sent by the pendant
    pub fn feed_frame(&self, code: &str, payload: &str) {
        self.feed(&encode_frame(code, payload));
    }

    /// Take everything written so far, decoded as (code, payload) frames
    pub fn take_frames(&self) -> Vec<(String, String)> {
        let written = std::mem::take(&mut self.0.lock().unwrap().written);
        let mut decoder = FrameDecoder::new();
        written
            .into_iter()
            .filter_map(|b| decoder.push(b).ok().flatten())
            .map(|r| (r.code_str(), r.payload))
            .collect()
    }

    /// Take written frame codes only
    pub fn take_codes(&self) -> Vec<String> {
        self.take_frames().into_iter().map(|(code, _)| code).collect()
    }
}

/// Link end handed to the transport
pub struct ScriptedLink(LinkHandle);

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = (self.0).0.lock().unwrap();
        if shared.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if shared.incoming.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        }
        let n = buf.len().min(shared.incoming.len());
        for slot in buf.iter_mut().take(n) {
            *slot = shared.incoming.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = (self.0).0.lock().unwrap();
        if shared.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        shared.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Connector that opens scripted links
pub struct ScriptedConnector {
    pub handle: LinkHandle,
    /// Path reported by discovery
    pub discovered: Option<String>,
    /// Paths passed to `open`
    pub opened: Vec<String>,
    pub discover_calls: usize,
}

impl ScriptedConnector {
    pub fn new(handle: LinkHandle) -> Self {
        Self {
            handle,
            discovered: Some("/dev/ttyACM0".to_string()),
            opened: Vec::new(),
            discover_calls: 0,
        }
    }
}

impl Connector for ScriptedConnector {
    fn discover(&mut self) -> Option<String> {
        self.discover_calls += 1;
        self.discovered.clone()
    }

    fn open(&mut self, path: &str) -> Result<Box<dyn Link>, ProtocolError> {
        self.opened.push(path.to_string());
        let mut shared = self.handle.0.lock().unwrap();
        if !shared.available {
            return Err(ProtocolError::PortNotFound(path.to_string()));
        }
        shared.opens += 1;
        drop(shared);
        Ok(Box::new(ScriptedLink(self.handle.clone())))
    }
}

/// A command received by the recording machine
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Abort,
    TaskState(TaskState),
    Mode(TaskMode),
    Teleop(bool),
    WaitComplete,
    Jog(JogAction),
    Spindle(SpindleCommand),
    SpindleOverrideEnabled(bool),
    SpindleOverride(f64),
    FeedOverrideEnabled(bool),
    Feedrate(f64),
    Rapidrate(f64),
    Flood(bool),
    Mist(bool),
    Mdi(String),
    Auto(AutoAction),
    EstopLatch(bool),
}

/// Machine fake that records commands and serves a settable snapshot
#[derive(Debug, Clone, Default)]
pub struct RecordingMachine {
    pub stat: Stat,
    pub calls: Vec<Call>,
    pub fail_jog: bool,
    pub fail_teleop: bool,
    pub fail_poll: bool,
    pub rpm: Option<f64>,
}

impl RecordingMachine {
    /// A powered, homed machine with the given axes, in teleop
    pub fn on(axis_mask: u16) -> Self {
        let mut machine = Self::default();
        let stat = &mut machine.stat;
        stat.axis_mask = axis_mask;
        stat.task_state = TaskState::On;
        stat.enabled = true;
        stat.motion_mode = manualmatic_core::machine::MotionMode::Teleop;
        for axis in stat.axes() {
            stat.homed[axis] = true;
        }
        stat.joints = stat.axes().len();
        machine
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }
}

impl StatSource for RecordingMachine {
    fn poll(&mut self) -> Result<Stat, MachineError> {
        if self.fail_poll {
            return Err(MachineError::Unavailable("stat channel closed".to_string()));
        }
        Ok(self.stat.clone())
    }

    fn spindle_speed_out(&mut self) -> Option<f64> {
        self.rpm
    }
}

impl CommandSink for RecordingMachine {
    fn abort(&mut self) -> Result<(), MachineError> {
        self.calls.push(Call::Abort);
        Ok(())
    }

    fn set_task_state(&mut self, state: TaskState) -> Result<(), MachineError> {
        self.calls.push(Call::TaskState(state));
        Ok(())
    }

    fn set_mode(&mut self, mode: TaskMode) -> Result<(), MachineError> {
        self.calls.push(Call::Mode(mode));
        Ok(())
    }

    fn teleop_enable(&mut self, enable: bool) -> Result<(), MachineError> {
        self.calls.push(Call::Teleop(enable));
        if self.fail_teleop {
            return Err(MachineError::Rejected("teleop refused".to_string()));
        }
        Ok(())
    }

    fn wait_complete(&mut self) -> Result<(), MachineError> {
        self.calls.push(Call::WaitComplete);
        Ok(())
    }

    fn jog(&mut self, action: JogAction) -> Result<(), MachineError> {
        self.calls.push(Call::Jog(action));
        if self.fail_jog {
            return Err(MachineError::Rejected("joint limit".to_string()));
        }
        Ok(())
    }

    fn spindle(&mut self, command: SpindleCommand) -> Result<(), MachineError> {
        self.calls.push(Call::Spindle(command));
        Ok(())
    }

    fn set_spindle_override_enabled(&mut self, enable: bool) -> Result<(), MachineError> {
        self.calls.push(Call::SpindleOverrideEnabled(enable));
        Ok(())
    }

    fn spindle_override(&mut self, value: f64) -> Result<(), MachineError> {
        self.calls.push(Call::SpindleOverride(value));
        Ok(())
    }

    fn set_feed_override_enabled(&mut self, enable: bool) -> Result<(), MachineError> {
        self.calls.push(Call::FeedOverrideEnabled(enable));
        Ok(())
    }

    fn feedrate(&mut self, value: f64) -> Result<(), MachineError> {
        self.calls.push(Call::Feedrate(value));
        Ok(())
    }

    fn rapidrate(&mut self, value: f64) -> Result<(), MachineError> {
        self.calls.push(Call::Rapidrate(value));
        Ok(())
    }

    fn flood(&mut self, on: bool) -> Result<(), MachineError> {
        self.calls.push(Call::Flood(on));
        Ok(())
    }

    fn mist(&mut self, on: bool) -> Result<(), MachineError> {
        self.calls.push(Call::Mist(on));
        Ok(())
    }

    fn mdi(&mut self, command: &str) -> Result<(), MachineError> {
        self.calls.push(Call::Mdi(command.to_string()));
        Ok(())
    }

    fn auto(&mut self, action: AutoAction) -> Result<(), MachineError> {
        self.calls.push(Call::Auto(action));
        Ok(())
    }

    fn set_estop_latch(&mut self, active: bool) -> Result<(), MachineError> {
        self.calls.push(Call::EstopLatch(active));
        Ok(())
    }
}

/// Frame sink that records frames and accepts or rejects them
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub frames: Vec<(String, String)>,
    pub reject: bool,
}

impl RecordingSink {
    pub fn codes(&self) -> Vec<&str> {
        self.frames.iter().map(|(code, _)| code.as_str()).collect()
    }
}

impl FrameSink for RecordingSink {
    fn send(&mut self, code: &str, payload: &str) -> bool {
        if self.reject {
            return false;
        }
        self.frames.push((code.to_string(), payload.to_string()));
        true
    }
}

/// Bridge config for tests: fixed port, no sleeps
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        port: Some("/dev/ttyACM0".to_string()),
        settle_delay_ms: 0,
        spindle_restart_delay_ms: 0,
        idle_interval_ms: 0,
        ..BridgeConfig::default()
    }
}

/// Bridge over a recording machine and a scripted link
/// Route log output through the test harness; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_bridge(
    machine: RecordingMachine,
    handle: &LinkHandle,
) -> Bridge<RecordingMachine, ScriptedConnector> {
    init_tracing();
    Bridge::new(
        test_config(),
        PendantSettings::default(),
        machine,
        ScriptedConnector::new(handle.clone()),
    )
}

pub const NO_DELAY: Duration = Duration::ZERO;
