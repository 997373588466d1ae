//! Frames received from the coordinator
//!
//! Token-push coordinators reply with objects that may carry `mfaToken`,
//! `status` and `message`, and push unsolicited updates tagged by `action`.
//! Request/response coordinators reply with any JSON value (objects for
//! acknowledgements and account data, arrays for transaction history) and
//! report failures as `{"error": "..."}`.

use crate::{ProtoError, Result};
use serde_json::Value;

/// Key carrying a pushed authorization token
pub const TOKEN_KEY: &str = "mfaToken";

/// Outcome reported by a reply
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    /// `status` present and not `"error"`
    Success(String),
    /// `status: "error"` or an `error` key
    Error(String),
    /// No status information (raw data replies)
    Unspecified,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InboundFrame {
    value: Value,
}

impl InboundFrame {
    pub fn parse(raw: &str) -> Result<Self> {
        let value = serde_json::from_str(raw).map_err(ProtoError::Decode)?;
        Ok(Self { value })
    }

    pub fn is_object(&self) -> bool {
        self.value.is_object()
    }

    /// Pushed authorization token, if the frame carries one
    pub fn token(&self) -> Option<&str> {
        self.value.get(TOKEN_KEY).and_then(Value::as_str)
    }

    /// Unsolicited update kind (`userUpdated`, `powerContributed`, ...)
    pub fn action(&self) -> Option<&str> {
        self.value.get("action").and_then(Value::as_str)
    }

    pub fn status(&self) -> ReplyStatus {
        if let Some(err) = self.value.get("error") {
            return ReplyStatus::Error(value_text(err));
        }

        match self.value.get("status").and_then(Value::as_str) {
            Some("error") => ReplyStatus::Error(
                self.value
                    .get("message")
                    .map(value_text)
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            Some(status) => ReplyStatus::Success(status.to_string()),
            None => ReplyStatus::Unspecified,
        }
    }

    /// Error reply refusing the authorization token (`Invalid MFA token`)
    pub fn is_token_rejection(&self) -> bool {
        match self.status() {
            ReplyStatus::Error(message) => message.to_ascii_lowercase().contains("token"),
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
