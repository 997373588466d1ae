//! Shared data model between the Triad agent, its wire protocol, and the CLI
//!
//! This crate defines:
//! - `Identity` - who is contributing (account address + device)
//! - `HostSample` - one instantaneous read of host telemetry
//! - `ContributionRecord` - the per-cycle record sent to the coordinator
//! - `SessionState` - the lifecycle of a contribution session
//! - The eco policy (`eco_actions`, `trees_planted`)

use std::fmt;

/// Default coordinator endpoint
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";

/// Default simulated load value when none is given
pub const DEFAULT_LOAD_VALUE: f64 = 50.0;

/// CPU temperature (Celsius) at or above which a session is stopped
pub const DEFAULT_TEMP_THRESHOLD_C: f64 = 85.0;

/// Longest address or device ID the coordinator accepts
pub const MAX_ID_LEN: usize = 64;

/// Load units per eco action
pub const LOAD_PER_ECO_ACTION: f64 = 10.0;

/// Eco actions per planted tree
pub const ECO_ACTIONS_PER_TREE: u64 = 5;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Account address and device for the lifetime of the process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub address: String,
    pub device_id: String,
}

impl Identity {
    pub fn new(address: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            device_id: device_id.into(),
        }
    }
}

/// Instantaneous host telemetry, in raw units
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HostSample {
    /// Global CPU load, 0-100
    pub cpu_percent: f64,
    pub memory_used_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_free_bytes: u64,
    /// Cumulative bytes transmitted over all interfaces
    pub bytes_sent: u64,
    pub uptime_secs: u64,
}

/// One cycle of resource-usage telemetry as reported to the coordinator
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContributionRecord {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub storage_gb: f64,
    pub bandwidth_mb: f64,
    pub uptime_secs: u64,
    pub eco_actions: u64,
}

impl ContributionRecord {
    /// Build a record from a host sample and the session's load value
    pub fn from_sample(sample: &HostSample, load: f64) -> Self {
        Self {
            cpu_percent: sample.cpu_percent,
            memory_mb: sample.memory_used_bytes as f64 / BYTES_PER_MB,
            storage_gb: sample.disk_used_bytes as f64 / BYTES_PER_GB,
            bandwidth_mb: sample.bytes_sent as f64 / BYTES_PER_MB,
            uptime_secs: sample.uptime_secs,
            eco_actions: eco_actions(load),
        }
    }

    /// Trees credited for this record's eco actions
    pub fn trees_planted(&self) -> u64 {
        trees_planted(self.eco_actions)
    }

    /// Coordinator's power-to-computation formula: `floor(cpu% * 10 + memMB * 5)`
    pub fn computations(&self) -> u64 {
        let value = self.cpu_percent * 10.0 + self.memory_mb * 5.0;
        if value.is_finite() && value > 0.0 {
            value.floor() as u64
        } else {
            0
        }
    }
}

/// `floor(load / 10)`; negative or non-finite loads yield zero
pub fn eco_actions(load: f64) -> u64 {
    if !load.is_finite() || load <= 0.0 {
        return 0;
    }
    (load / LOAD_PER_ECO_ACTION).floor() as u64
}

/// `floor(eco_actions / 5)`
pub fn trees_planted(eco_actions: u64) -> u64 {
    eco_actions / ECO_ACTIONS_PER_TREE
}

/// Lifecycle of a contribution session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    AwaitingAuthorization,
    Reporting,
    Degraded,
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::AwaitingAuthorization => "awaiting-authorization",
            SessionState::Reporting => "reporting",
            SessionState::Degraded => "degraded",
            SessionState::Terminated => "terminated",
        }
    }

    /// Whether the session can no longer carry contributions
    pub fn is_stopped(&self) -> bool {
        matches!(self, SessionState::Degraded | SessionState::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eco_policy_examples() {
        assert_eq!(eco_actions(73.0), 7);
        assert_eq!(trees_planted(7), 1);
        assert_eq!(eco_actions(50.0), 5);
        assert_eq!(eco_actions(9.99), 0);
        assert_eq!(eco_actions(100.0), 10);
        assert_eq!(trees_planted(10), 2);
    }

    #[test]
    fn test_eco_policy_full_range() {
        for tenths in 0..=1000u64 {
            let load = tenths as f64 / 10.0;
            let expected = (load / 10.0).floor() as u64;
            assert_eq!(eco_actions(load), expected, "load {}", load);
            assert_eq!(trees_planted(eco_actions(load)), expected / 5);
        }
    }

    #[test]
    fn test_eco_actions_rejects_garbage() {
        assert_eq!(eco_actions(-5.0), 0);
        assert_eq!(eco_actions(f64::NAN), 0);
        assert_eq!(eco_actions(f64::INFINITY), 0);
    }

    #[test]
    fn test_record_from_sample() {
        let sample = HostSample {
            cpu_percent: 12.5,
            memory_used_bytes: 512 * 1024 * 1024,
            disk_used_bytes: 3 * 1024 * 1024 * 1024,
            disk_free_bytes: 0,
            bytes_sent: 10 * 1024 * 1024,
            uptime_secs: 3600,
        };

        let record = ContributionRecord::from_sample(&sample, 73.0);
        assert_eq!(record.cpu_percent, 12.5);
        assert_eq!(record.memory_mb, 512.0);
        assert_eq!(record.storage_gb, 3.0);
        assert_eq!(record.bandwidth_mb, 10.0);
        assert_eq!(record.uptime_secs, 3600);
        assert_eq!(record.eco_actions, 7);
        assert_eq!(record.trees_planted(), 1);
        assert_eq!(record.computations(), 125 + 2560);
    }

    #[test]
    fn test_session_state_stopped() {
        assert!(!SessionState::Reporting.is_stopped());
        assert!(SessionState::Degraded.is_stopped());
        assert!(SessionState::Terminated.is_stopped());
        assert_eq!(SessionState::AwaitingAuthorization.to_string(), "awaiting-authorization");
    }
}
