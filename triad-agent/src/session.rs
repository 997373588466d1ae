//! Session controller
//!
//! Owns one contribution session end to end:
//! `Connecting -> AwaitingAuthorization -> Reporting -> Terminated`, with
//! `Degraded` entered when the listener sees a transport error.
//!
//! Inbound frames are handled on a dedicated listener task. Handlers only
//! touch state behind `Shared` (token store, state channel, reply queue), so
//! token pushes are applied in the order the listener delivers them and the
//! reporting loop always reads the latest one.

use crate::config::AgentConfig;
use crate::error::{Result, SessionError};
use crate::exchange::{ExchangeOutcome, ReplyChannel};
use crate::metrics_source::MetricsSource;
use crate::protocol::{Exchange, ReportingProtocol};
use crate::reporting::{LoopExit, LoopSettings, ReportingLoop, SessionHandles};
use crate::token::TokenStore;
use crate::transport::{self, Channel, ChannelReader, ChannelWriter, Frame};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use triad_common::{Identity, SessionState};
use triad_proto::{InboundFrame, ReplyStatus};

/// How long shutdown waits for the listener to see the close handshake
const LISTENER_DRAIN: Duration = Duration::from_secs(2);

/// Raw frame text longer than this is cut in log lines
const LOG_PREVIEW_CHARS: usize = 200;

/// What a finished session did
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub exit: LoopExit,
    pub contributions_sent: u64,
    pub token_rotations: u64,
    pub frames_received: u64,
}

struct Shared {
    tokens: TokenStore,
    state: watch::Sender<SessionState>,
    /// Reply queue for request/response exchanges; dropped when the channel goes away
    replies: Mutex<Option<mpsc::Sender<InboundFrame>>>,
    frames_received: AtomicU64,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `next`. `Terminated` is final.
    fn transition(&self, next: SessionState) {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if *state == next || *state == SessionState::Terminated {
                return false;
            }
            previous = Some(*state);
            *state = next;
            true
        });

        if let Some(previous) = previous {
            info!("Session {} -> {}", previous, next);
        }
    }

    fn on_message(&self, raw: &str) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);

        let frame = match InboundFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring frame: {} ({})", e, preview(raw));
                return;
            }
        };
        info!("Received: {}", preview(raw));

        if let Some(token) = frame.token() {
            if self.tokens.replace(token) {
                info!("Authorization token rotated");
            } else {
                debug!("Authorization token re-sent unchanged");
            }
        }

        if let ReplyStatus::Error(message) = frame.status() {
            warn!("Coordinator reported an error: {}", message);
            if frame.is_token_rejection() {
                self.tokens.mark_stale();
            }
        }

        if let Some(action) = frame.action() {
            debug!("Coordinator update: {}", action);
        }

        let replies = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(replies) = replies {
            match replies.try_send(frame) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Reply queue full, dropping frame")
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("No exchange waiting, frame not queued")
                }
            }
        }
    }

    fn on_error(&self, err: &SessionError) {
        if self.state() == SessionState::Terminated {
            debug!("Transport error after shutdown: {}", err);
            return;
        }
        error!("Transport error: {}", err);
        self.transition(SessionState::Degraded);
        self.release_replies();
    }

    fn on_close(&self, code: Option<u16>, reason: &str) {
        if self.state() == SessionState::Terminated {
            debug!("Channel closed (code {:?})", code);
        } else {
            info!(
                "Channel closed by coordinator (code {:?}, reason {:?})",
                code, reason
            );
        }
        self.transition(SessionState::Terminated);
        self.release_replies();
    }

    /// Wake any pending exchange with `Closed`
    fn release_replies(&self) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

pub struct SessionController {
    config: AgentConfig,
    identity: Identity,
    protocol: Arc<dyn ReportingProtocol>,
    shared: Arc<Shared>,
    replies: Option<ReplyChannel>,
}

impl SessionController {
    pub fn new(config: AgentConfig, identity: Identity, protocol: Arc<dyn ReportingProtocol>) -> Self {
        let (replies_tx, replies) = match protocol.exchange() {
            Exchange::RequestResponse => {
                let (tx, rx) = ReplyChannel::new();
                (Some(tx), Some(rx))
            }
            Exchange::FireAndForget => (None, None),
        };
        let (state, _) = watch::channel(SessionState::Connecting);

        Self {
            config,
            identity,
            protocol,
            shared: Arc::new(Shared {
                tokens: TokenStore::new(),
                state,
                replies: Mutex::new(replies_tx),
                frames_received: AtomicU64::new(0),
            }),
            replies,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Token currently authorizing contributions
    pub fn token(&self) -> Option<String> {
        self.shared.tokens.current()
    }

    pub fn tokens(&self) -> TokenStore {
        self.shared.tokens.clone()
    }

    /// Handle one inbound text frame. Malformed frames are logged and ignored.
    pub fn on_message(&self, raw: &str) {
        self.shared.on_message(raw);
    }

    pub fn on_error(&self, err: &SessionError) {
        self.shared.on_error(err);
    }

    pub fn on_close(&self, code: Option<u16>, reason: &str) {
        self.shared.on_close(code, reason);
    }

    /// Open the channel under the configured retry policy
    pub async fn connect(&self) -> Result<Channel> {
        self.shared.transition(SessionState::Connecting);
        info!(
            "Connecting to {} ({})",
            self.config.endpoint,
            self.protocol.kind().as_str()
        );
        transport::connect(
            &self.config.endpoint,
            &self.config.retry_policy(),
            self.config.probe_timeout(),
        )
        .await
    }

    /// Run the inbound listener until the channel closes or fails
    pub fn spawn_listener(&self, reader: ChannelReader) -> JoinHandle<()> {
        let shared = self.shared.clone();
        tokio::spawn(listen(shared, reader))
    }

    /// Register, wait for authorization if the protocol needs it, and
    /// announce the load. Ends in `Reporting` on success.
    pub async fn handshake(&mut self, writer: &ChannelWriter) -> Result<()> {
        self.shared.transition(SessionState::AwaitingAuthorization);
        let timeout = self.config.handshake_timeout();

        let registration = self.protocol.registration(&self.identity)?;
        info!(
            "Registering {} (device {})",
            self.identity.address, self.identity.device_id
        );

        match (self.protocol.exchange(), self.replies.as_mut()) {
            (Exchange::RequestResponse, Some(replies)) => {
                match replies.exchange(writer, registration, timeout).await? {
                    ExchangeOutcome::Reply(frame) => match frame.status() {
                        ReplyStatus::Error(message) => {
                            warn!("Registration rejected ({}), continuing", message)
                        }
                        _ => info!("Registered: {}", frame.value()),
                    },
                    ExchangeOutcome::TimedOut => return Err(SessionError::HandshakeTimeout(timeout)),
                    ExchangeOutcome::Closed => {
                        return Err(SessionError::Transport(
                            "channel closed during registration".to_string(),
                        ))
                    }
                }
            }
            _ => writer.send_text(registration).await?,
        }

        let token = if self.protocol.requires_token() {
            let mut state = self.shared.state.subscribe();
            tokio::select! {
                token = self.shared.tokens.wait_for_first(timeout) => {
                    let token = token.ok_or(SessionError::HandshakeTimeout(timeout))?;
                    info!("User added and authorization token received");
                    Some(token)
                }
                _ = state.wait_for(|s| s.is_stopped()) => {
                    return Err(SessionError::Transport(
                        "channel lost before authorization".to_string(),
                    ));
                }
            }
        } else {
            None
        };

        if let Some(announcement) =
            self.protocol
                .start_announcement(&self.identity, self.config.load_value, token.as_deref())?
        {
            writer.send_text(announcement).await?;
            info!("Starting to contribute power (load {})", self.config.load_value);
        }

        self.shared.transition(SessionState::Reporting);
        Ok(())
    }

    /// Drive a full session: connect, handshake, report until cancelled,
    /// thermally aborted or disconnected.
    ///
    /// Cancellation and safety aborts end with `Ok`; losing the channel is
    /// a `Transport` error.
    pub async fn run(
        mut self,
        metrics: Box<dyn MetricsSource>,
        cancel: CancellationToken,
    ) -> Result<SessionSummary> {
        let connected = tokio::select! {
            channel = self.connect() => Some(channel),
            _ = cancel.cancelled() => None,
        };
        let channel = match connected {
            None => {
                info!("Cancelled before connecting");
                self.shared.transition(SessionState::Terminated);
                return Ok(self.finish(LoopExit::Cancelled, 0));
            }
            Some(Err(e)) => {
                error!("{}", e);
                self.shared.transition(SessionState::Terminated);
                return Err(e);
            }
            Some(Ok(channel)) => channel,
        };

        let (writer, reader) = channel.split();
        let listener = self.spawn_listener(reader);

        let handshake = tokio::select! {
            result = self.handshake(&writer) => Some(result),
            _ = cancel.cancelled() => None,
        };
        match handshake {
            None => {
                info!("Cancelled during handshake");
                self.shutdown(&writer, listener).await;
                return Ok(self.finish(LoopExit::Cancelled, 0));
            }
            Some(Err(e)) => {
                error!("Handshake failed: {}", e);
                self.shutdown(&writer, listener).await;
                return Err(e);
            }
            Some(Ok(())) => {}
        }

        let handles = SessionHandles {
            writer: writer.clone(),
            tokens: self.shared.tokens.clone(),
            state: self.shared.state.subscribe(),
            replies: self.replies.take(),
        };
        let mut reporting = ReportingLoop::new(
            self.identity.clone(),
            self.protocol.clone(),
            metrics,
            handles,
            LoopSettings::from_config(&self.config),
        );
        let exit = reporting.run(&cancel).await;
        let sent = reporting.contributions_sent();

        self.shutdown(&writer, listener).await;
        let summary = self.finish(exit, sent);
        if summary.exit.is_failure() {
            return Err(SessionError::Transport(summary.exit.to_string()));
        }
        Ok(summary)
    }

    async fn shutdown(&self, writer: &ChannelWriter, mut listener: JoinHandle<()>) {
        self.shared.transition(SessionState::Terminated);
        writer.close().await;

        if tokio::time::timeout(LISTENER_DRAIN, &mut listener).await.is_err() {
            debug!("Listener still running after close, aborting it");
            listener.abort();
        }
        self.shared.release_replies();
    }

    fn finish(&self, exit: LoopExit, contributions_sent: u64) -> SessionSummary {
        let summary = SessionSummary {
            exit,
            contributions_sent,
            token_rotations: self.shared.tokens.rotations(),
            frames_received: self.shared.frames_received.load(Ordering::Relaxed),
        };
        self.shared.tokens.clear();

        info!(
            "Session ended ({}): {} contributions, {} token pushes, {} frames received",
            summary.exit,
            summary.contributions_sent,
            summary.token_rotations,
            summary.frames_received
        );
        summary
    }
}

async fn listen(shared: Arc<Shared>, mut reader: ChannelReader) {
    while let Some(frame) = reader.next_frame().await {
        match frame {
            Ok(Frame::Text(raw)) => shared.on_message(&raw),
            Ok(Frame::Closed { code, reason }) => {
                shared.on_close(code, &reason);
                return;
            }
            Err(e) => {
                shared.on_error(&e);
                return;
            }
        }
    }
    shared.on_close(None, "stream ended");
}

fn preview(raw: &str) -> String {
    if raw.chars().count() <= LOG_PREVIEW_CHARS {
        return raw.to_string();
    }
    let cut: String = raw.chars().take(LOG_PREVIEW_CHARS).collect();
    format!("{}...", cut)
}
