//! Resource contribution agent for Triad
//!
//! Responsibilities:
//! - Keep a WebSocket session to the coordinator
//! - Hold the authorization token the coordinator pushes, rotating it on every push
//! - Sample CPU, memory, storage, bandwidth and uptime on a fixed interval
//! - Report contributions, stopping if the CPU runs too hot
//! - Speak either the token-push or the request/response coordinator protocol

pub mod cli;
pub mod config;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod metrics_source;
pub mod protocol;
pub mod query;
pub mod reporting;
pub mod retry;
pub mod session;
pub mod token;
pub mod transport;

pub use config::{AgentConfig, ProtocolKind};
pub use error::{Result, SensorError, SessionError};
pub use identity::{Ed25519Identity, IdentityProvider};
pub use metrics_source::{MetricsSource, SysinfoSource};
pub use query::{run_query, Query};
pub use reporting::LoopExit;
pub use session::{SessionController, SessionSummary};

use log::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use triad_common::Identity;

/// Device key and the identity reported to the coordinator.
///
/// Uses the configured key file when set, otherwise a key that lives only
/// for this process. A configured address overrides the derived one.
pub fn resolve_identity(config: &AgentConfig) -> Result<(Identity, Arc<Ed25519Identity>)> {
    let mut key = match &config.key_file {
        Some(path) => Ed25519Identity::load_or_create(path)?,
        None => Ed25519Identity::generate(),
    };
    if let Some(address) = &config.address {
        key = key.with_address(address.clone());
    }

    let identity = Identity::new(key.address().to_string(), config.device_id.clone());
    Ok((identity, Arc::new(key)))
}

/// Run one contribution session against the host's own sensors
pub async fn run_agent(config: AgentConfig, cancel: CancellationToken) -> Result<SessionSummary> {
    config.validate()?;
    let (identity, signer) = resolve_identity(&config)?;
    info!(
        "Contributing as {} from device {}",
        identity.address, identity.device_id
    );

    let protocol = protocol::for_kind(config.protocol, signer);
    let controller = SessionController::new(config, identity, protocol);
    controller.run(Box::new(SysinfoSource::new()), cancel).await
}
