//! # Manualmatic Core Library
//!
//! Protocol bridge between a CNC controller and the Manualmatic hand pendant.
//!
//! This library provides:
//! - STX/ETX frame encoding and decoding
//! - Serial link supervision with discovery and rate-limited reconnects
//! - Differential publishing of machine status to the pendant
//! - Dispatch of pendant commands to the controller
//! - Heartbeat based liveness checking
//!
//! ## Example
//!
//! ```rust,ignore
//! use manualmatic_core::prelude::*;
//! use std::sync::atomic::AtomicBool;
//!
//! let config = BridgeConfig::default();
//! let connector = SerialConnector::new(config.baud_rate, config.read_timeout(), config.signature());
//! let mut bridge = Bridge::new(config, PendantSettings::default(), SimulatedMachine::new(0b111), connector);
//!
//! let running = AtomicBool::new(true);
//! bridge.run(&running);
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod heartbeat;
pub mod machine;
pub mod protocol;
pub mod publish;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bridge::{Bridge, BridgeError, Injected, Session};
    pub use crate::config::{BridgeConfig, IniFile, PendantSettings};
    pub use crate::dispatch::{CommandError, Dispatcher, Outcome};
    pub use crate::heartbeat::HeartbeatMonitor;
    pub use crate::machine::{
        CommandSink, Machine, MachineError, SimulatedMachine, Stat, StatSource, TaskMode,
        TaskState,
    };
    pub use crate::protocol::{
        CommandCode, CommandRecord, ConnectionState, Connector, FrameDecoder, SerialConnector,
        Transport,
    };
    pub use crate::publish::{FrameSink, Tracked, TrackedArray, TrackedValue};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
