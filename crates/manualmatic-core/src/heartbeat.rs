//! Link liveness watchdog
//!
//! The pendant sends a heartbeat every few seconds. Once one has been seen,
//! silence longer than the timeout means the link is dead even if the serial
//! port still looks open.

use std::time::{Duration, Instant};

/// Default time allowed between heartbeats
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tracks the pendant's heartbeats against a timeout
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    last_beat: Option<Instant>,
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_TIMEOUT)
    }
}

impl HeartbeatMonitor {
    /// A monitor that has not seen a beat yet
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_beat: None,
        }
    }

    /// Allowed silence between beats
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time of the last heartbeat, if any since the last reset
    pub fn last_beat(&self) -> Option<Instant> {
        self.last_beat
    }

    /// Note a beat received at `now`
    pub fn record_beat(&mut self, now: Instant) {
        self.last_beat = Some(now);
    }

    /// Stale when a beat has been seen and more than `timeout` has passed since.
    pub fn check(&self, now: Instant) -> bool {
        match self.last_beat {
            Some(last) => now.saturating_duration_since(last) > self.timeout,
            None => false,
        }
    }

    /// Forget the last beat; no staleness until the next one arrives
    pub fn reset(&mut self) {
        self.last_beat = None;
    }
}
