//! WebSocket channel to the coordinator
//!
//! `connect` probes TCP reachability before every WebSocket handshake and
//! retries both under the configured `RetryPolicy`. The open channel splits
//! into a cloneable writer (one frame in flight at a time) and a reader owned
//! by the listener task.

use crate::error::{Result, SessionError};
use crate::retry::RetryPolicy;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open duplex channel, not yet split
pub struct Channel {
    stream: WsStream,
}

impl Channel {
    pub fn split(self) -> (ChannelWriter, ChannelReader) {
        let (sink, stream) = self.stream.split();
        (
            ChannelWriter {
                sink: Arc::new(Mutex::new(sink)),
                closed: Arc::new(AtomicBool::new(false)),
            },
            ChannelReader { stream },
        )
    }
}

/// Inbound frame as seen by the listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Closed { code: Option<u16>, reason: String },
}

#[derive(Clone)]
pub struct ChannelWriter {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    closed: Arc<AtomicBool>,
}

impl ChannelWriter {
    pub async fn send_text(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::Transport("channel already closed".to_string()));
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Send a normal close frame; later calls do nothing
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut sink = self.sink.lock().await;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "contribution session ended".into(),
        };
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!("Close frame not delivered: {}", e);
        }
        if let Err(e) = sink.close().await {
            debug!("Channel close: {}", e);
        }
    }
}

pub struct ChannelReader {
    stream: SplitStream<WsStream>,
}

impl ChannelReader {
    /// Next text or close frame. Control frames are handled by the library
    /// and skipped here. `None` once the stream has ended.
    pub async fn next_frame(&mut self) -> Option<Result<Frame>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(_) => warn!("Ignoring non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Some(Ok(Frame::Closed { code, reason }));
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }
}

/// Host and port the probe should reach for a `ws://` / `wss://` endpoint
pub fn probe_target(endpoint: &str) -> Result<(String, u16)> {
    let uri: Uri = endpoint
        .parse()
        .map_err(|e| SessionError::Config(format!("invalid endpoint {}: {}", endpoint, e)))?;

    let host = uri
        .host()
        .ok_or_else(|| SessionError::Config(format!("endpoint {} has no host", endpoint)))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();

    let port = match (uri.port_u16(), uri.scheme_str()) {
        (Some(port), _) => port,
        (None, Some("wss")) => 443,
        (None, Some("ws")) => 80,
        (None, other) => {
            return Err(SessionError::Config(format!(
                "unsupported endpoint scheme {:?}",
                other
            )))
        }
    };

    Ok((host, port))
}

async fn probe(host: &str, port: u16, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(SessionError::Transport(format!(
            "server not available at {}:{} ({})",
            host, port, e
        ))),
        Err(_) => Err(SessionError::Transport(format!(
            "server not available at {}:{} (timed out after {:?})",
            host, port, timeout
        ))),
    }
}

/// Reach the coordinator, retrying probe + handshake under `policy`.
///
/// Exhausting the policy is a `Connectivity` error; callers treat it as fatal.
pub async fn connect(endpoint: &str, policy: &RetryPolicy, probe_timeout: Duration) -> Result<Channel> {
    let (host, port) = probe_target(endpoint)?;

    let outcome = policy
        .run("connect", |attempt| {
            let host = host.clone();
            async move {
                debug!("Connection attempt {} to {}", attempt, endpoint);
                probe(&host, port, probe_timeout).await?;
                let (stream, _response) = connect_async(endpoint).await?;
                Ok::<_, SessionError>(stream)
            }
        })
        .await;

    match outcome {
        Ok((stream, attempt)) => {
            info!("Connected to coordinator at {} (attempt {})", endpoint, attempt);
            Ok(Channel { stream })
        }
        Err(exhausted) => Err(SessionError::Connectivity {
            endpoint: endpoint.to_string(),
            attempts: exhausted.attempts,
            last_error: exhausted.last_error,
        }),
    }
}
