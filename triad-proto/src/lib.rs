//! Coordinator wire protocol definitions for Triad
//!
//! Defines:
//! - `token_push` - action-tagged messages for coordinators that push a
//!   rotating authorization token (`mfaToken`)
//! - `request_response` - type-tagged envelopes answered by exactly one reply
//! - `inbound` - parsing of frames received from the coordinator
//!
//! All frames are UTF-8 JSON text.

pub mod inbound;
pub mod request_response;
pub mod token_push;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use triad_common::ContributionRecord;

pub use inbound::{InboundFrame, ReplyStatus};
pub use request_response::{Envelope, RequestData, RequestType};
pub use token_push::{Action, Power, TokenPushMessage, UserData};

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtoError>;

/// Proof-of-contribution totals as understood by the coordinator
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PocContribution {
    pub computations: u64,
    pub storage: f64,
    pub bandwidth: f64,
    pub uptime: u64,
    pub eco_actions: u64,
}

impl From<&ContributionRecord> for PocContribution {
    fn from(record: &ContributionRecord) -> Self {
        Self {
            computations: record.computations(),
            storage: record.storage_gb,
            bandwidth: record.bandwidth_mb,
            uptime: record.uptime_secs,
            eco_actions: record.eco_actions,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(ProtoError::Encode)
}
