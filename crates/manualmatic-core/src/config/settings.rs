//! Machine parameters published to the pendant
//!
//! As a UI, values from `[DISPLAY]` take priority, with QtVCP's
//! `*_SPINDLE_0_*` spellings as fallbacks. A `[MANUALMATIC]` section overrides
//! where it defines a key. The spindle maximum is the lowest of every limit
//! the file declares.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::ini::{parse_percent, IniFile};
use crate::protocol::IniKey;

/// Parameters sent to the pendant in the ini dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendantSettings {
    /// Feed override ceiling, as a fraction
    pub max_feed_override: f64,
    /// Spindle override floor, as a fraction
    pub min_spindle_override: f64,
    /// Spindle override ceiling, as a fraction
    pub max_spindle_override: f64,
    /// RPM
    pub default_spindle_speed: f64,
    /// RPM; zero means no limit is configured
    pub max_spindle_speed: f64,
    /// RPM step, or a fraction when configured as a percentage
    pub spindle_increment: f64,
    /// e.g. "mm" or "inch"
    pub linear_units: String,
    /// e.g. "degree"
    pub angular_units: String,
    /// Units per second
    pub default_linear_velocity: f64,
    /// Units per second
    pub max_linear_velocity: f64,
    /// Non-zero lets MDI run before homing
    pub no_force_homing: u8,
    /// Signal carrying the actual spindle speed
    pub spindle_rpm_pin: String,
    /// Initial jog velocity in units per minute
    pub jog_velocity: f64,
}

/// The values an ini file without any relevant keys produces
impl Default for PendantSettings {
    fn default() -> Self {
        Self::from_ini(&IniFile::default())
    }
}

impl PendantSettings {
    /// Seed settings from the controller's ini file
    pub fn from_ini(ini: &IniFile) -> Self {
        let number = |candidates: &[(&str, &str)], fallback: f64| {
            candidates
                .iter()
                .find_map(|(section, key)| ini.find_f64(section, key))
                .unwrap_or(fallback)
        };

        let max_spindle_speed = [
            ("SPINDLE_0", "MAX_FORWARD_VELOCITY"),
            ("SPINDLE_0", "MAX_VELOCITY"),
            ("DISPLAY", "MAX_SPINDLE_0_SPEED"),
            ("DISPLAY", "MAX_SPINDLE_SPEED"),
        ]
        .iter()
        .filter_map(|(section, key)| ini.find_f64(section, key))
        .reduce(f64::min)
        .unwrap_or(0.0);

        let spindle_increment = [
            ("MANUALMATIC", "SPINDLE_INCREMENT"),
            ("DISPLAY", "SPINDLE_INCREMENT"),
            ("SPINDLE_0", "INCREMENT"),
        ]
        .iter()
        .find_map(|(section, key)| ini.find(section, key).and_then(parse_percent))
        .unwrap_or(100.0);

        let default_linear_velocity = number(
            &[
                ("DISPLAY", "DEFAULT_LINEAR_VELOCITY"),
                ("TRAJ", "DEFAULT_LINEAR_VELOCITY"),
            ],
            20.0,
        );

        let text = |section: &str, key: &str, fallback: &str| {
            ini.find(section, key).unwrap_or(fallback).to_string()
        };

        Self {
            max_feed_override: number(&[("DISPLAY", "MAX_FEED_OVERRIDE")], 1.5),
            min_spindle_override: number(
                &[
                    ("DISPLAY", "MIN_SPINDLE_OVERRIDE"),
                    ("DISPLAY", "MIN_SPINDLE_0_OVERRIDE"),
                ],
                0.5,
            ),
            max_spindle_override: number(
                &[
                    ("DISPLAY", "MAX_SPINDLE_OVERRIDE"),
                    ("DISPLAY", "MAX_SPINDLE_0_OVERRIDE"),
                ],
                1.5,
            ),
            default_spindle_speed: number(
                &[
                    ("DISPLAY", "DEFAULT_SPINDLE_SPEED"),
                    ("DISPLAY", "DEFAULT_SPINDLE_0_SPEED"),
                ],
                1000.0,
            ),
            max_spindle_speed,
            spindle_increment,
            linear_units: text("TRAJ", "LINEAR_UNITS", "mm"),
            angular_units: text("TRAJ", "ANGULAR_UNITS", "degree"),
            default_linear_velocity,
            max_linear_velocity: number(
                &[
                    ("DISPLAY", "MAX_LINEAR_VELOCITY"),
                    ("TRAJ", "MAX_LINEAR_VELOCITY"),
                ],
                30.0,
            ),
            no_force_homing: number(&[("TRAJ", "NO_FORCE_HOMING")], 0.0) as u8,
            spindle_rpm_pin: text("MANUALMATIC", "SPINDLE_RPM_PIN", "spindle.0.speed-out"),
            jog_velocity: default_linear_velocity * 60.0,
        }
    }

    /// Ini dump entries in send order, excluding the axis count and sentinel
    pub fn entries(&self) -> Vec<(IniKey, String)> {
        vec![
            (IniKey::MaxFeedOverride, self.max_feed_override.to_string()),
            (IniKey::MinSpindleOverride, self.min_spindle_override.to_string()),
            (IniKey::MaxSpindleOverride, self.max_spindle_override.to_string()),
            (IniKey::DefaultSpindleSpeed, self.default_spindle_speed.to_string()),
            (IniKey::MaxSpindleSpeed, self.max_spindle_speed.to_string()),
            (IniKey::SpindleIncrement, self.spindle_increment.to_string()),
            (IniKey::LinearUnits, self.linear_units.clone()),
            (IniKey::AngularUnits, self.angular_units.clone()),
            (IniKey::DefaultLinearVelocity, self.default_linear_velocity.to_string()),
            (IniKey::MaxLinearVelocity, self.max_linear_velocity.to_string()),
            (IniKey::NoForceHoming, self.no_force_homing.to_string()),
        ]
    }

    /// Log every value at info level
    pub fn log_values(&self) {
        info!(
            max_feed_override = self.max_feed_override,
            min_spindle_override = self.min_spindle_override,
            max_spindle_override = self.max_spindle_override,
            default_spindle_speed = self.default_spindle_speed,
            max_spindle_speed = self.max_spindle_speed,
            spindle_increment = self.spindle_increment,
            spindle_rpm_pin = %self.spindle_rpm_pin,
            linear_units = %self.linear_units,
            angular_units = %self.angular_units,
            default_linear_velocity = self.default_linear_velocity,
            max_linear_velocity = self.max_linear_velocity,
            no_force_homing = self.no_force_homing,
            "pendant settings"
        );
    }
}
