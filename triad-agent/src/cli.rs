//! Command-line arguments shared by `triad-agent` and the `triad` CLI

use crate::config::{AgentConfig, ProtocolKind};
use crate::error::{Result, SessionError};
use clap::Args;
use std::path::PathBuf;

/// Where and as whom to connect
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    #[arg(short, long, help = "YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Coordinator endpoint (ws:// or wss://)")]
    pub endpoint: Option<String>,

    #[arg(short, long, value_enum, help = "Coordinator protocol")]
    pub protocol: Option<ProtocolKind>,

    #[arg(long, help = "Account address (derived from the device key if omitted)")]
    pub address: Option<String>,

    #[arg(short, long, help = "Device ID (defaults to the hostname)")]
    pub device_id: Option<String>,

    #[arg(long, help = "Device key file, created on first use")]
    pub key_file: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Config file (or defaults) with these flags applied on top
    pub fn into_config(self) -> Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_yaml_file(path)?,
            None => AgentConfig::default(),
        };

        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if let Some(address) = self.address {
            config.address = Some(address);
        }
        if let Some(device_id) = self.device_id {
            config.device_id = device_id;
        }
        if let Some(key_file) = self.key_file {
            config.key_file = Some(key_file);
        }

        Ok(config)
    }
}

/// Arguments for a contribution session
#[derive(Args, Debug, Clone, Default)]
pub struct AgentArgs {
    #[arg(help = "Simulated load value (required for request-response coordinators)")]
    pub load: Option<f64>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(short, long, help = "Seconds between contributions")]
    pub interval: Option<u64>,

    #[arg(long, help = "CPU temperature (°C) that stops contribution")]
    pub temp_threshold: Option<f64>,

    #[arg(long, help = "Skip state/history/trees queries after each contribution")]
    pub no_follow_ups: bool,
}

impl AgentArgs {
    pub fn into_config(self) -> Result<AgentConfig> {
        let has_config_file = self.connection.config.is_some();
        let mut config = self.connection.into_config()?;

        match self.load {
            Some(load) => config.load_value = load,
            None if config.protocol == ProtocolKind::RequestResponse && !has_config_file => {
                return Err(SessionError::Config(
                    "a load value is required for request-response coordinators".to_string(),
                ))
            }
            None => {}
        }
        if let Some(interval) = self.interval {
            config.report_interval_secs = Some(interval);
        }
        if let Some(threshold) = self.temp_threshold {
            config.temp_threshold_c = threshold;
        }
        if self.no_follow_ups {
            config.follow_up_queries = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        agent: AgentArgs,
    }

    fn parse(args: &[&str]) -> Result<AgentConfig> {
        let cli = TestCli::try_parse_from(std::iter::once("triad-agent").chain(args.iter().copied()))
            .expect("arguments should parse");
        cli.agent.into_config()
    }

    #[test]
    fn test_overrides_apply() {
        let config = parse(&[
            "73",
            "--endpoint",
            "ws://coordinator:9000/ws",
            "--device-id",
            "rig-7",
            "--interval",
            "5",
            "--temp-threshold",
            "80",
            "--no-follow-ups",
        ])
        .unwrap();

        assert_eq!(config.load_value, 73.0);
        assert_eq!(config.endpoint, "ws://coordinator:9000/ws");
        assert_eq!(config.device_id, "rig-7");
        assert_eq!(config.report_interval_secs, Some(5));
        assert_eq!(config.temp_threshold_c, 80.0);
        assert!(!config.follow_up_queries);
    }

    #[test]
    fn test_request_response_requires_load() {
        let err = parse(&["--protocol", "request-response", "-d", "rig"]).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));

        let config = parse(&["42", "--protocol", "request-response", "-d", "rig"]).unwrap();
        assert_eq!(config.protocol, ProtocolKind::RequestResponse);
        assert_eq!(config.load_value, 42.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse(&["-d", "rig", "--interval", "0"]).is_err());
        assert!(parse(&["-d", "rig", "--endpoint", "http://x"]).is_err());
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.yaml");
        std::fs::write(
            &path,
            "protocol: request-response\nload_value: 20\ndevice_id: from-file\n",
        )
        .unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "-d", "from-flag"]).unwrap();
        assert_eq!(config.protocol, ProtocolKind::RequestResponse);
        assert_eq!(config.load_value, 20.0);
        assert_eq!(config.device_id, "from-flag");
    }
}
