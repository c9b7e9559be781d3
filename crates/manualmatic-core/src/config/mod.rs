//! Bridge configuration
//!
//! [`BridgeConfig`] holds the runtime knobs (serial port, timings, discovery
//! signature) and is stored as JSON. [`PendantSettings`] are the machine
//! parameters sent to the pendant, seeded from the controller's ini file.

mod ini;
mod settings;

pub use ini::{parse_number, parse_percent, IniError, IniFile};
pub use settings::PendantSettings;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{
    PendantSignature, TransportConfig, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS,
};

/// Errors loading or saving a bridge config
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not a valid config
    #[error("Invalid config: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Runtime configuration of the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Serial device path; discovered by USB signature when unset
    pub port: Option<String>,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Per-read timeout on the serial port
    pub read_timeout_ms: u64,

    /// Minimum time between connection attempts
    pub retry_interval_ms: u64,

    /// Delay after opening the port before talking to the pendant
    pub settle_delay_ms: u64,

    /// Drop the link when no heartbeat arrives for this long
    pub heartbeat_timeout_ms: u64,

    /// Loop sleep while disconnected
    pub idle_interval_ms: u64,

    /// Bounce each heartbeat back to the pendant
    pub echo_heartbeat: bool,

    /// Pause between the two spindle commands sent when starting a stopped spindle
    pub spindle_restart_delay_ms: u64,

    /// Minimum time between spindle RPM updates
    pub spindle_rpm_interval_ms: u64,

    /// USB vendor id of the pendant
    pub usb_vid: u16,

    /// USB product id of the pendant
    pub usb_pid: u16,

    /// Directory of stable serial device links
    pub by_id_dir: String,

    /// Link name prefix identifying the pendant
    pub by_id_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            retry_interval_ms: 3000,
            settle_delay_ms: 100,
            heartbeat_timeout_ms: 10_000,
            idle_interval_ms: 250,
            echo_heartbeat: true,
            spindle_restart_delay_ms: 120,
            spindle_rpm_interval_ms: 333,
            usb_vid: 0x16c0,
            usb_pid: 0x0483,
            by_id_dir: "/dev/serial/by-id".to_string(),
            by_id_prefix: "usb-Teensyduino_USB_Serial_".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Per-read serial timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Silence after which the link is dropped
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Loop sleep while disconnected
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Pause between the two commands that start a stopped spindle
    pub fn spindle_restart_delay(&self) -> Duration {
        Duration::from_millis(self.spindle_restart_delay_ms)
    }

    /// Minimum time between spindle RPM updates
    pub fn spindle_rpm_interval(&self) -> Duration {
        Duration::from_millis(self.spindle_rpm_interval_ms)
    }

    /// Transport settings derived from this config
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            port: self.port.clone(),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            ..TransportConfig::default()
        }
    }

    /// Discovery signature derived from this config
    pub fn signature(&self) -> PendantSignature {
        PendantSignature {
            vid: self.usb_vid,
            pid: self.usb_pid,
            by_id_dir: self.by_id_dir.clone(),
            by_id_prefix: self.by_id_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{ "port": "/dev/ttyACM1", "heartbeat_timeout_ms": 5000 }"#)
                .unwrap();
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(5));
        assert_eq!(config.baud_rate, 115_200);
        assert!(config.echo_heartbeat);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manualmatic.json");
        let config = BridgeConfig {
            retry_interval_ms: 1000,
            echo_heartbeat: false,
            ..BridgeConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(BridgeConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_transport_config() {
        let config = BridgeConfig::default();
        let transport = config.transport_config();
        assert_eq!(transport.port, None);
        assert_eq!(transport.retry_interval, Duration::from_secs(3));
        assert_eq!(transport.settle_delay, Duration::from_millis(100));

        let signature = config.signature();
        assert_eq!((signature.vid, signature.pid), (0x16c0, 0x0483));
    }
}
