//! Reporting protocol capability
//!
//! The session controller and reporting loop only see `ReportingProtocol`.
//! Two variants exist:
//! - `TokenPush`: fire-and-forget action messages authorized by the token the
//!   coordinator pushes
//! - `RequestResponse`: signed envelopes, each answered by exactly one reply

use crate::config::ProtocolKind;
use crate::identity::IdentityProvider;
use std::sync::Arc;
use triad_common::{ContributionRecord, Identity};
use triad_proto::{Action, Envelope, RequestType, Result, TokenPushMessage};

/// How sends are paired with replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// Send and move on; replies are handled by the listener alone
    FireAndForget,
    /// Block on exactly one reply per request
    RequestResponse,
}

pub trait ReportingProtocol: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    fn exchange(&self) -> Exchange;

    /// Contributions must carry a coordinator-issued token
    fn requires_token(&self) -> bool;

    fn registration(&self, identity: &Identity) -> Result<String>;

    /// Message sent once authorization is in place, before the first contribution
    fn start_announcement(
        &self,
        identity: &Identity,
        load: f64,
        token: Option<&str>,
    ) -> Result<Option<String>>;

    fn contribution(
        &self,
        identity: &Identity,
        record: &ContributionRecord,
        token: Option<&str>,
    ) -> Result<String>;

    /// Labelled queries issued after each contribution
    fn follow_ups(&self, identity: &Identity) -> Result<Vec<(&'static str, String)>>;

    /// Request for a fresh token after the coordinator refused the held one
    fn token_refresh(&self, identity: &Identity) -> Result<Option<String>>;
}

pub struct TokenPush;

impl ReportingProtocol for TokenPush {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::TokenPush
    }

    fn exchange(&self) -> Exchange {
        Exchange::FireAndForget
    }

    fn requires_token(&self) -> bool {
        true
    }

    fn registration(&self, identity: &Identity) -> Result<String> {
        TokenPushMessage::add_user(identity).to_json()
    }

    fn start_announcement(
        &self,
        identity: &Identity,
        load: f64,
        token: Option<&str>,
    ) -> Result<Option<String>> {
        let msg = TokenPushMessage::start_contributing(identity, load, token.unwrap_or_default());
        msg.to_json().map(Some)
    }

    fn contribution(
        &self,
        identity: &Identity,
        record: &ContributionRecord,
        token: Option<&str>,
    ) -> Result<String> {
        TokenPushMessage::contribute_power(identity, record, token.unwrap_or_default()).to_json()
    }

    fn follow_ups(&self, _identity: &Identity) -> Result<Vec<(&'static str, String)>> {
        Ok(Vec::new())
    }

    fn token_refresh(&self, identity: &Identity) -> Result<Option<String>> {
        TokenPushMessage::query(Action::GetMfaToken, identity)
            .to_json()
            .map(Some)
    }
}

pub struct RequestResponse {
    signer: Arc<dyn IdentityProvider>,
}

impl RequestResponse {
    pub fn new(signer: Arc<dyn IdentityProvider>) -> Self {
        Self { signer }
    }

    /// Signed query envelope, as sent by the follow-ups and one-shot queries
    pub fn query(&self, kind: RequestType, identity: &Identity) -> Result<String> {
        self.signed(Envelope::query(kind, identity))
    }

    fn signed(&self, envelope: Envelope) -> Result<String> {
        let signature = self.signer.sign(&envelope.signing_payload()?);
        envelope
            .with_signature(signature, self.signer.public_key_hex())
            .to_json()
    }
}

impl ReportingProtocol for RequestResponse {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::RequestResponse
    }

    fn exchange(&self) -> Exchange {
        Exchange::RequestResponse
    }

    fn requires_token(&self) -> bool {
        false
    }

    fn registration(&self, identity: &Identity) -> Result<String> {
        self.signed(Envelope::register(identity))
    }

    fn start_announcement(
        &self,
        _identity: &Identity,
        _load: f64,
        _token: Option<&str>,
    ) -> Result<Option<String>> {
        Ok(None)
    }

    fn contribution(
        &self,
        identity: &Identity,
        record: &ContributionRecord,
        _token: Option<&str>,
    ) -> Result<String> {
        self.signed(Envelope::contribute(identity, record))
    }

    fn follow_ups(&self, identity: &Identity) -> Result<Vec<(&'static str, String)>> {
        [
            ("state", RequestType::GetData),
            ("history", RequestType::GetTransactions),
            ("trees", RequestType::GetTrees),
        ]
        .into_iter()
        .map(|(label, kind)| -> Result<(&'static str, String)> {
            Ok((label, self.query(kind, identity)?))
        })
        .collect()
    }

    fn token_refresh(&self, _identity: &Identity) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Protocol implementation for `kind`
pub fn for_kind(kind: ProtocolKind, signer: Arc<dyn IdentityProvider>) -> Arc<dyn ReportingProtocol> {
    match kind {
        ProtocolKind::TokenPush => Arc::new(TokenPush),
        ProtocolKind::RequestResponse => Arc::new(RequestResponse::new(signer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Ed25519Identity;
    use ed25519_dalek::{Signature, Verifier};
    use serde_json::Value;

    fn record() -> ContributionRecord {
        ContributionRecord {
            cpu_percent: 20.0,
            memory_mb: 10.0,
            storage_gb: 1.0,
            bandwidth_mb: 2.0,
            uptime_secs: 30,
            eco_actions: 5,
        }
    }

    #[test]
    fn test_token_push_carries_token() {
        let identity = Identity::new("user1", "macbook");
        let protocol = TokenPush;

        assert_eq!(protocol.exchange(), Exchange::FireAndForget);
        assert!(protocol.requires_token());

        let value: Value =
            serde_json::from_str(&protocol.contribution(&identity, &record(), Some("tok")).unwrap())
                .unwrap();
        assert_eq!(value["action"], "contributePower");
        assert_eq!(value["mfaToken"], "tok");

        let start = protocol
            .start_announcement(&identity, 50.0, Some("tok"))
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&start).unwrap();
        assert_eq!(value["cpuLoad"], 50.0);
        assert!(protocol.follow_ups(&identity).unwrap().is_empty());

        let refresh = protocol.token_refresh(&identity).unwrap().unwrap();
        let value: Value = serde_json::from_str(&refresh).unwrap();
        assert_eq!(value["action"], "getMFAToken");
        assert_eq!(value["userData"]["address"], "user1");
    }

    #[test]
    fn test_request_response_signs_every_envelope() {
        let signer = Arc::new(Ed25519Identity::from_seed([9u8; 32]));
        let verifying_key = signer.verifying_key();
        let identity = Identity::new(signer.address(), "rig");
        let protocol = RequestResponse::new(signer);

        let mut messages = vec![
            protocol.registration(&identity).unwrap(),
            protocol.contribution(&identity, &record(), None).unwrap(),
        ];
        let follow_ups = protocol.follow_ups(&identity).unwrap();
        assert_eq!(
            follow_ups.iter().map(|(label, _)| *label).collect::<Vec<_>>(),
            vec!["state", "history", "trees"]
        );
        messages.extend(follow_ups.into_iter().map(|(_, msg)| msg));
        assert_eq!(protocol.token_refresh(&identity).unwrap(), None);

        for raw in messages {
            let envelope: Envelope = serde_json::from_str(&raw).unwrap();
            let payload = envelope.signing_payload().unwrap();
            let bytes: [u8; 64] = hex::decode(envelope.signature.as_deref().unwrap())
                .unwrap()
                .try_into()
                .unwrap();
            assert!(verifying_key
                .verify(&payload, &Signature::from_bytes(&bytes))
                .is_ok());
        }
    }
}
