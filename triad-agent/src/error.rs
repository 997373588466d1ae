use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use triad_proto::ProtoError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Coordinator unreachable at {endpoint} after {attempts} attempts: {last_error}")]
    Connectivity {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Coordinator did not authorize the session within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("No reply from coordinator within {0:?}")]
    NoReply(Duration),

    #[error("Coordinator rejected request: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtoError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tungstenite::Error> for SessionError {
    fn from(err: tungstenite::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

/// A host sensor could not be read; never escapes the reporting loop
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Sensor read failed: {0}")]
pub struct SensorError(pub String);

pub type Result<T> = std::result::Result<T, SessionError>;
