//! Type-tagged envelopes for request/response coordinators
//!
//! Every envelope is answered by exactly one JSON reply. Envelopes may carry
//! an ed25519 signature over the serialized `data` object together with the
//! signer's public key.

use crate::{to_json, PocContribution, ProtoError, Result};
use serde::{Deserialize, Serialize};
use triad_common::{ContributionRecord, Identity};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Register,
    Contribute,
    GetData,
    GetTransactions,
    GetTrees,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Register => "register",
            RequestType::Contribute => "contribute",
            RequestType::GetData => "get_data",
            RequestType::GetTransactions => "get_transactions",
            RequestType::GetTrees => "get_trees",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RequestData {
    pub address: String,
    #[serde(rename = "deviceID", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contribution: Option<PocContribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trees: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: RequestType,
    pub data: RequestData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl Envelope {
    fn new(kind: RequestType, data: RequestData) -> Self {
        Self {
            kind,
            data,
            signature: None,
            public_key: None,
        }
    }

    pub fn register(identity: &Identity) -> Self {
        Self::new(
            RequestType::Register,
            RequestData {
                address: identity.address.clone(),
                device_id: Some(identity.device_id.clone()),
                ..Default::default()
            },
        )
    }

    pub fn contribute(identity: &Identity, record: &ContributionRecord) -> Self {
        Self::new(
            RequestType::Contribute,
            RequestData {
                address: identity.address.clone(),
                device_id: Some(identity.device_id.clone()),
                contribution: Some(PocContribution::from(record)),
                trees: Some(record.trees_planted()),
            },
        )
    }

    /// Address-only query (`get_data`, `get_transactions`, `get_trees`)
    pub fn query(kind: RequestType, identity: &Identity) -> Self {
        Self::new(
            kind,
            RequestData {
                address: identity.address.clone(),
                ..Default::default()
            },
        )
    }

    /// Bytes covered by the signature
    pub fn signing_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.data).map_err(ProtoError::Encode)
    }

    pub fn with_signature(mut self, signature: String, public_key: String) -> Self {
        self.signature = Some(signature);
        self.public_key = Some(public_key);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_register_shape() {
        let identity = Identity::new("0xabc", "laptop");
        let value: Value =
            serde_json::from_str(&Envelope::register(&identity).to_json().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "register",
                "data": { "address": "0xabc", "deviceID": "laptop" }
            })
        );
    }

    #[test]
    fn test_contribute_carries_trees() {
        let identity = Identity::new("0xabc", "laptop");
        let record = ContributionRecord {
            cpu_percent: 10.0,
            memory_mb: 100.0,
            storage_gb: 1.5,
            bandwidth_mb: 2.5,
            uptime_secs: 60,
            eco_actions: 7,
        };
        let value: Value =
            serde_json::from_str(&Envelope::contribute(&identity, &record).to_json().unwrap())
                .unwrap();

        assert_eq!(value["type"], "contribute");
        assert_eq!(value["data"]["trees"], 1);
        assert_eq!(
            value["data"]["contribution"],
            json!({
                "computations": 600,
                "storage": 1.5,
                "bandwidth": 2.5,
                "uptime": 60,
                "ecoActions": 7
            })
        );
    }

    #[test]
    fn test_query_and_signature() {
        let identity = Identity::new("0xabc", "laptop");
        let envelope = Envelope::query(RequestType::GetTrees, &identity);
        assert_eq!(envelope.signing_payload().unwrap(), br#"{"address":"0xabc"}"#.to_vec());

        let signed = envelope.with_signature("sig".to_string(), "pk".to_string());
        let value: Value = serde_json::from_str(&signed.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "get_trees");
        assert_eq!(value["signature"], "sig");
        assert_eq!(value["publicKey"], "pk");
    }
}
