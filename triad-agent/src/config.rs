//! Agent configuration
//!
//! Values come from defaults, then an optional YAML file, then command-line
//! overrides (see `cli`). Defaults follow the coordinator's conventions:
//! `ws://localhost:8080/ws`, 5 connection attempts 2s apart, 85°C thermal
//! limit.

use crate::error::{Result, SessionError};
use crate::retry::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use triad_common::{DEFAULT_ENDPOINT, DEFAULT_LOAD_VALUE, DEFAULT_TEMP_THRESHOLD_C, MAX_ID_LEN};

/// Environment override for the coordinator endpoint
pub const ENDPOINT_ENV: &str = "TRIAD_ENDPOINT";

/// Environment override for the device ID
pub const DEVICE_ID_ENV: &str = "TRIAD_DEVICE_ID";

/// Which coordinator protocol to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    /// Action messages, fire-and-forget, authorization token pushed by the coordinator
    TokenPush,
    /// Typed envelopes, each answered by one reply, signed with the device key
    RequestResponse,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::TokenPush => "token-push",
            ProtocolKind::RequestResponse => "request-response",
        }
    }

    /// Reporting interval used when none is configured
    pub fn default_interval(&self) -> Duration {
        match self {
            ProtocolKind::TokenPush => Duration::from_secs(10),
            ProtocolKind::RequestResponse => Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub endpoint: String,
    pub protocol: ProtocolKind,
    /// Simulated load; drives the eco policy
    pub load_value: f64,
    /// Account address; derived from the device key when unset
    pub address: Option<String>,
    pub device_id: String,
    /// Seconds between contributions; protocol default when unset
    pub report_interval_secs: Option<u64>,
    pub temp_threshold_c: f64,
    pub connect_attempts: u32,
    pub connect_delay_secs: u64,
    pub backoff: Backoff,
    pub probe_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub exchange_timeout_secs: u64,
    /// Query state, history and trees after each contribution (request-response only)
    pub follow_up_queries: bool,
    /// Hex-encoded ed25519 seed; created on first use
    pub key_file: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            protocol: ProtocolKind::TokenPush,
            load_value: DEFAULT_LOAD_VALUE,
            address: None,
            device_id: default_device_id(),
            report_interval_secs: None,
            temp_threshold_c: DEFAULT_TEMP_THRESHOLD_C,
            connect_attempts: 5,
            connect_delay_secs: 2,
            backoff: Backoff::Fixed,
            probe_timeout_secs: 2,
            handshake_timeout_secs: 30,
            exchange_timeout_secs: 10,
            follow_up_queries: true,
            key_file: None,
        }
    }
}

fn default_device_id() -> String {
    std::env::var(DEVICE_ID_ENV)
        .or_else(|_| hostname::get().map(|h| h.to_string_lossy().to_string()))
        .unwrap_or_else(|_| "unknown".to_string())
}

impl AgentConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SessionError::Config(e.to_string()))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(SessionError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {}",
                self.endpoint
            )));
        }

        if !(0.0..=100.0).contains(&self.load_value) {
            return Err(SessionError::Config(format!(
                "load value must be between 0 and 100, got {}",
                self.load_value
            )));
        }

        check_id("device ID", &self.device_id)?;
        if let Some(address) = &self.address {
            check_id("address", address)?;
        }

        if self.report_interval_secs == Some(0) {
            return Err(SessionError::Config(
                "report interval must be at least 1 second".to_string(),
            ));
        }

        if self.connect_attempts == 0 {
            return Err(SessionError::Config(
                "connect attempts must be at least 1".to_string(),
            ));
        }

        if !self.temp_threshold_c.is_finite() {
            return Err(SessionError::Config(
                "temperature threshold must be a number".to_string(),
            ));
        }

        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        self.report_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.protocol.default_interval())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.connect_attempts,
            delay: Duration::from_secs(self.connect_delay_secs),
            backoff: self.backoff,
            ..Default::default()
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }
}

fn check_id(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SessionError::Config(format!("{} must not be empty", what)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(SessionError::Config(format!(
            "{} must be at most {} characters",
            what, MAX_ID_LEN
        )));
    }
    Ok(())
}
