//! Bridge loop
//!
//! Ties the transport, frame decoder, dispatcher, heartbeat monitor and
//! publishing session together. Everything runs on one thread, one
//! [`tick`](Bridge::tick) at a time; other threads reach the loop only
//! through the injection channel.

mod session;

pub use session::Session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::config::{BridgeConfig, PendantSettings};
use crate::dispatch::{CommandError, Dispatcher, Outcome};
use crate::heartbeat::HeartbeatMonitor;
use crate::machine::{JogAction, Machine, MachineError, MotionMode, Stat, TaskState};
use crate::protocol::{CommandCode, CommandRecord, Connector, FrameDecoder, LinkEvent, Transport};
use crate::publish::PublishError;

/// Errors surfaced by a bridge tick. None of them stop the loop.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Polling or commanding the machine failed
    #[error("Machine error: {0}")]
    Machine(#[from] MachineError),

    /// A field could not be published
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// A pendant command could not be applied
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Messages injected into the loop from outside, e.g. a debug console
#[derive(Debug, Clone, PartialEq)]
pub enum Injected {
    /// Dispatch as if received from the pendant
    Inbound(CommandRecord),
    /// Write a frame to the pendant
    Outbound {
        /// Wire code
        code: String,
        /// Frame payload
        payload: String,
    },
}

/// The pendant bridge
pub struct Bridge<M: Machine, C: Connector> {
    config: BridgeConfig,
    settings: PendantSettings,
    machine: M,
    transport: Transport<C>,
    decoder: FrameDecoder,
    dispatcher: Dispatcher,
    heartbeat: HeartbeatMonitor,
    session: Option<Session>,
    injector: Sender<Injected>,
    injected: Receiver<Injected>,
}

impl<M: Machine, C: Connector> Bridge<M, C> {
    /// Build a bridge; nothing is opened until the first tick
    pub fn new(config: BridgeConfig, settings: PendantSettings, machine: M, connector: C) -> Self {
        let transport = Transport::new(config.transport_config(), connector);
        let dispatcher = Dispatcher::new(
            settings.jog_velocity,
            settings.max_spindle_speed,
            config.spindle_restart_delay(),
        );
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_timeout());
        let (injector, injected) = mpsc::channel();
        Self {
            config,
            settings,
            machine,
            transport,
            decoder: FrameDecoder::new(),
            dispatcher,
            heartbeat,
            session: None,
            injector,
            injected,
        }
    }

    /// Sender for injecting commands into the loop
    pub fn injector(&self) -> Sender<Injected> {
        self.injector.clone()
    }

    /// The machine being driven
    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Mutable access to the machine
    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    /// The pendant transport
    pub fn transport(&self) -> &Transport<C> {
        &self.transport
    }

    /// Mutable access to the pendant transport
    pub fn transport_mut(&mut self) -> &mut Transport<C> {
        &mut self.transport
    }

    /// Current session, present while connected
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Command dispatcher and its cached state
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Heartbeat monitor for the current link
    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    /// Run until `running` is cleared. Tick errors are logged, never fatal.
    pub fn run(&mut self, running: &AtomicBool) {
        info!("Starting Manualmatic...");
        self.settings.log_values();
        while running.load(Ordering::SeqCst) {
            if let Err(e) = self.tick(Instant::now()) {
                error!("{}", e);
            }
            if !self.transport.is_connected() {
                std::thread::sleep(self.config.idle_interval());
            }
        }
        info!("Stopping Manualmatic...");
        self.transport.close();
    }

    /// One pass of the loop.
    ///
    /// Reads pending input (connecting first if the link is down), dispatches
    /// every complete record, then checks the heartbeat and publishes changes.
    /// A failing record does not stop the rest of the pass; the first error
    /// is returned once the pass is done.
    pub fn tick(&mut self, now: Instant) -> Result<(), BridgeError> {
        let input = self.transport.poll_input(now);
        let mut stat = self.machine.poll()?;
        self.handle_link_events(&stat);

        let mut first_error: Option<BridgeError> = None;
        let mut dispatched = 0;

        for message in self.injected.try_iter().collect::<Vec<_>>() {
            match message {
                Injected::Inbound(record) => {
                    dispatched += 1;
                    if let Err(e) = self.handle_record(&record, &stat, now) {
                        first_error.get_or_insert(e);
                    }
                }
                Injected::Outbound { code, payload } => {
                    self.transport.send(&code, &payload);
                }
            }
        }

        for byte in input {
            match self.decoder.push(byte) {
                Ok(Some(record)) => {
                    dispatched += 1;
                    if let Err(e) = self.handle_record(&record, &stat, now) {
                        first_error.get_or_insert(e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Input error: {}", e),
            }
        }

        if dispatched > 0 {
            stat = self.machine.poll()?;
        }
        self.handle_link_events(&stat);

        if self.transport.is_connected() {
            if self.heartbeat.check(now) {
                warn!("no heartbeat, disconnecting");
                self.heartbeat.reset();
                self.transport.close();
                self.handle_link_events(&stat);
            } else if let Err(e) = self.publish(&stat, now) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn handle_record(
        &mut self,
        record: &CommandRecord,
        stat: &Stat,
        now: Instant,
    ) -> Result<(), BridgeError> {
        if record.selector() != CommandCode::Heartbeat.selector() {
            trace!(code = %record.code_str(), payload = %record.payload, "incoming");
        }
        match self.dispatcher.dispatch(record, &mut self.machine, stat)? {
            Outcome::None => {}
            Outcome::Heartbeat => {
                self.heartbeat.record_beat(now);
                if self.config.echo_heartbeat {
                    self.transport.send(&CommandCode::Heartbeat.code(), "");
                }
            }
            Outcome::RefreshPositions => {
                if let Some(session) = &mut self.session {
                    session.refresh_positions();
                }
            }
            Outcome::Reply { code, payload } => {
                self.transport.send(&code, &payload);
            }
        }
        Ok(())
    }

    fn publish(&mut self, stat: &Stat, now: Instant) -> Result<(), BridgeError> {
        if self.session.as_ref().map_or(true, |s| s.is_stale(stat)) {
            self.reset_session(stat);
        }
        let rpm = self.machine.spindle_speed_out();
        let Some(session) = &mut self.session else {
            return Ok(());
        };
        if let Some(rpm) = rpm {
            session.publish_spindle_rpm(now, rpm, &mut self.transport);
        }
        session.publish(stat, &mut self.transport)?;
        Ok(())
    }

    fn reset_session(&mut self, stat: &Stat) {
        self.session = Some(Session::reset(
            stat,
            &self.settings,
            self.dispatcher.jog_velocity(),
            self.config.spindle_rpm_interval(),
            &mut self.transport,
        ));
    }

    fn handle_link_events(&mut self, stat: &Stat) {
        for event in self.transport.take_events() {
            match event {
                LinkEvent::Connected => self.on_connected(stat),
                LinkEvent::Disconnected => self.on_disconnected(stat),
            }
        }
    }

    fn on_connected(&mut self, stat: &Stat) {
        self.heartbeat.reset();
        self.decoder.reset();
        self.transport.send(&CommandCode::Heartbeat.code(), "");
        self.reset_session(stat);
    }

    /// Stop any jog in progress; the pendant can no longer release the button
    fn on_disconnected(&mut self, stat: &Stat) {
        let axes = match self.session.take() {
            Some(session) => session.axes().to_vec(),
            None => stat.axes(),
        };
        if stat.task_state == TaskState::On && stat.motion_mode == MotionMode::Teleop {
            debug!("stopping jog on disconnect");
            for axis in axes {
                if let Err(e) = self.machine.jog(JogAction::Stop { axis }) {
                    warn!(axis, "jog stop failed: {}", e);
                }
            }
        }
    }
}
