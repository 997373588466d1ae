//! Action-tagged messages for token-push coordinators
//!
//! The coordinator answers the first message carrying an address with an
//! `mfaToken`, and keeps pushing fresh tokens on later replies. Power
//! contributions and the start announcement must carry the latest token.

use crate::{to_json, PocContribution, Result};
use serde::{Deserialize, Serialize};
use triad_common::{ContributionRecord, Identity};

/// Balance requested for a newly registered account
pub const INITIAL_BALANCE: i64 = 1000;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    AddUser,
    ContributePower,
    StartContributing,
    #[serde(rename = "getMFAToken")]
    GetMfaToken,
    GetUser,
    GetTransactions,
    GetTrees,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poc_contribution: Option<PocContribution>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Power {
    #[serde(rename = "cpuPercent")]
    pub cpu_percent: f64,
    #[serde(rename = "memoryMB")]
    pub memory_mb: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPushMessage {
    pub action: Action,
    pub user_data: UserData,
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<Power>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eco_actions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_load: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_token: Option<String>,
}

impl TokenPushMessage {
    fn bare(action: Action, identity: &Identity) -> Self {
        Self {
            action,
            user_data: UserData {
                address: identity.address.clone(),
                ..Default::default()
            },
            device_id: identity.device_id.clone(),
            power: None,
            storage: None,
            bandwidth: None,
            uptime: None,
            eco_actions: None,
            cpu_load: None,
            mfa_token: None,
        }
    }

    /// Registration: new account with this device and zeroed contribution totals
    pub fn add_user(identity: &Identity) -> Self {
        let mut msg = Self::bare(Action::AddUser, identity);
        msg.user_data.balance = Some(INITIAL_BALANCE);
        msg.user_data.devices = Some(vec![identity.device_id.clone()]);
        msg.user_data.poc_contribution = Some(PocContribution::default());
        msg
    }

    /// Announce the simulated load this device will run at
    pub fn start_contributing(identity: &Identity, load: f64, token: &str) -> Self {
        let mut msg = Self::bare(Action::StartContributing, identity);
        msg.cpu_load = Some(load);
        msg.mfa_token = Some(token.to_string());
        msg
    }

    pub fn contribute_power(identity: &Identity, record: &ContributionRecord, token: &str) -> Self {
        let mut msg = Self::bare(Action::ContributePower, identity);
        msg.power = Some(Power {
            cpu_percent: record.cpu_percent,
            memory_mb: record.memory_mb,
        });
        msg.storage = Some(record.storage_gb);
        msg.bandwidth = Some(record.bandwidth_mb);
        msg.uptime = Some(record.uptime_secs);
        msg.eco_actions = Some(record.eco_actions);
        msg.mfa_token = Some(token.to_string());
        msg
    }

    /// Queries that need no token: `getMFAToken`, `getUser`, `getTransactions`, `getTrees`
    pub fn query(action: Action, identity: &Identity) -> Self {
        Self::bare(action, identity)
    }

    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn identity() -> Identity {
        Identity::new("user1", "macbook")
    }

    #[test]
    fn test_add_user_shape() {
        let value: Value =
            serde_json::from_str(&TokenPushMessage::add_user(&identity()).to_json().unwrap())
                .unwrap();

        assert_eq!(
            value,
            json!({
                "action": "addUser",
                "userData": {
                    "address": "user1",
                    "balance": 1000,
                    "devices": ["macbook"],
                    "pocContribution": {
                        "computations": 0,
                        "storage": 0.0,
                        "bandwidth": 0.0,
                        "uptime": 0,
                        "ecoActions": 0
                    }
                },
                "deviceID": "macbook"
            })
        );
    }

    #[test]
    fn test_contribute_power_shape() {
        let record = ContributionRecord {
            cpu_percent: 42.5,
            memory_mb: 2048.0,
            storage_gb: 120.0,
            bandwidth_mb: 33.0,
            uptime_secs: 900,
            eco_actions: 5,
        };
        let msg = TokenPushMessage::contribute_power(&identity(), &record, "tok-1");
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["action"], "contributePower");
        assert_eq!(value["userData"], json!({ "address": "user1" }));
        assert_eq!(value["deviceID"], "macbook");
        assert_eq!(value["power"], json!({ "cpuPercent": 42.5, "memoryMB": 2048.0 }));
        assert_eq!(value["storage"], 120.0);
        assert_eq!(value["bandwidth"], 33.0);
        assert_eq!(value["uptime"], 900);
        assert_eq!(value["ecoActions"], 5);
        assert_eq!(value["mfaToken"], "tok-1");
        assert!(value.get("cpuLoad").is_none());
    }

    #[test]
    fn test_start_contributing_and_token_query() {
        let start = TokenPushMessage::start_contributing(&identity(), 73.0, "abc");
        let value: Value = serde_json::from_str(&start.to_json().unwrap()).unwrap();
        assert_eq!(value["action"], "startContributing");
        assert_eq!(value["cpuLoad"], 73.0);
        assert_eq!(value["mfaToken"], "abc");

        let query = TokenPushMessage::query(Action::GetMfaToken, &identity());
        let value: Value = serde_json::from_str(&query.to_json().unwrap()).unwrap();
        assert_eq!(value["action"], "getMFAToken");
        assert!(value.get("mfaToken").is_none());
    }
}
