//! One-shot account queries
//!
//! Opens its own channel, sends a single query and returns the first reply
//! that answers it. Used by the operator CLI; the reporting loop never calls
//! this.

use crate::config::{AgentConfig, ProtocolKind};
use crate::error::{Result, SessionError};
use crate::protocol::RequestResponse;
use crate::resolve_identity;
use crate::transport::{self, ChannelReader, Frame};
use log::{debug, info, warn};
use serde_json::Value;
use std::time::Duration;
use triad_proto::{Action, InboundFrame, ReplyStatus, RequestType, TokenPushMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Account record (balance, devices, contribution totals)
    State,
    Transactions,
    Trees,
    /// Fresh authorization token (token-push coordinators only)
    Token,
}

impl Query {
    /// Action to send and the reply key that answers it
    fn token_push(&self) -> (Action, &'static str) {
        match self {
            Query::State => (Action::GetUser, "user"),
            Query::Transactions => (Action::GetTransactions, "transactions"),
            Query::Trees => (Action::GetTrees, "trees"),
            Query::Token => (Action::GetMfaToken, "mfaToken"),
        }
    }

    fn request_type(&self) -> Option<RequestType> {
        match self {
            Query::State => Some(RequestType::GetData),
            Query::Transactions => Some(RequestType::GetTransactions),
            Query::Trees => Some(RequestType::GetTrees),
            Query::Token => None,
        }
    }
}

/// Run `query` against the configured coordinator and return its reply
pub async fn run_query(config: &AgentConfig, query: Query) -> Result<Value> {
    config.validate()?;
    let (identity, signer) = resolve_identity(config)?;
    let timeout = config.exchange_timeout();

    let request = match config.protocol {
        ProtocolKind::TokenPush => {
            TokenPushMessage::query(query.token_push().0, &identity).to_json()?
        }
        ProtocolKind::RequestResponse => {
            let kind = query.request_type().ok_or_else(|| {
                SessionError::Config(
                    "token queries need a token-push coordinator".to_string(),
                )
            })?;
            RequestResponse::new(signer).query(kind, &identity)?
        }
    };

    let channel =
        transport::connect(&config.endpoint, &config.retry_policy(), config.probe_timeout()).await?;
    let (writer, mut reader) = channel.split();
    info!("Querying {:?} for {}", query, identity.address);
    writer.send_text(request).await?;

    let reply = match config.protocol {
        ProtocolKind::TokenPush => {
            let key = query.token_push().1;
            await_frame(&mut reader, timeout, |frame| frame.get(key).is_some()).await
        }
        ProtocolKind::RequestResponse => await_frame(&mut reader, timeout, |_| true).await,
    };
    writer.close().await;

    let frame = reply?;
    if let ReplyStatus::Error(message) = frame.status() {
        return Err(SessionError::Rejected(message));
    }
    Ok(frame.into_value())
}

/// First frame accepted by `answers`, or an error-status frame, within `timeout`
async fn await_frame<F>(reader: &mut ChannelReader, timeout: Duration, answers: F) -> Result<InboundFrame>
where
    F: Fn(&InboundFrame) -> bool,
{
    tokio::time::timeout(timeout, next_answer(reader, answers))
        .await
        .map_err(|_| SessionError::NoReply(timeout))?
}

async fn next_answer<F>(reader: &mut ChannelReader, answers: F) -> Result<InboundFrame>
where
    F: Fn(&InboundFrame) -> bool,
{
    loop {
        let next = reader.next_frame().await;

        let raw = match next {
            Some(Ok(Frame::Text(raw))) => raw,
            Some(Ok(Frame::Closed { code, reason })) => {
                return Err(SessionError::Transport(format!(
                    "channel closed before reply (code {:?}, reason {:?})",
                    code, reason
                )))
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(SessionError::Transport(
                    "channel closed before reply".to_string(),
                ))
            }
        };

        let frame = match InboundFrame::parse(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring frame: {}", e);
                continue;
            }
        };

        if answers(&frame) || matches!(frame.status(), ReplyStatus::Error(_)) {
            return Ok(frame);
        }
        debug!("Skipping unrelated frame: {}", frame.value());
    }
}
