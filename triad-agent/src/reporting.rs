//! Periodic contribution cycle
//!
//! Each tick the loop:
//! 1. samples the host
//! 2. stops the session if the CPU is at or above the thermal limit
//! 3. asks for a fresh token if the coordinator refused the held one
//! 4. builds and sends a `ContributionRecord`
//! 5. runs follow-up queries (request/response coordinators only)
//! 6. sleeps until the next tick, waking early on cancellation or session loss
//!
//! Cancellation is only observed between cycles, never mid-send.

use crate::config::AgentConfig;
use crate::exchange::{ExchangeOutcome, ReplyChannel};
use crate::metrics_source::MetricsSource;
use crate::protocol::{Exchange, ReportingProtocol};
use crate::token::TokenStore;
use crate::transport::ChannelWriter;
use log::{info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use triad_common::{ContributionRecord, HostSample, Identity, SessionState};
use triad_proto::{InboundFrame, ReplyStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    pub interval: Duration,
    pub temp_threshold_c: f64,
    pub load: f64,
    pub exchange_timeout: Duration,
    pub follow_ups: bool,
}

impl LoopSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            interval: config.report_interval(),
            temp_threshold_c: config.temp_threshold_c,
            load: config.load_value,
            exchange_timeout: config.exchange_timeout(),
            follow_ups: config.follow_up_queries,
        }
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    Cancelled,
    /// Protective stop; not an error
    SafetyAbort { temperature_c: f64, threshold_c: f64 },
    /// The coordinator closed the channel or the listener failed
    ChannelLost(String),
    /// A send failed
    Transport(String),
}

impl LoopExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, LoopExit::ChannelLost(_) | LoopExit::Transport(_))
    }
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::Cancelled => write!(f, "cancelled"),
            LoopExit::SafetyAbort {
                temperature_c,
                threshold_c,
            } => write!(
                f,
                "safety abort at {:.1}°C (limit {:.1}°C)",
                temperature_c, threshold_c
            ),
            LoopExit::ChannelLost(reason) => write!(f, "channel lost: {}", reason),
            LoopExit::Transport(reason) => write!(f, "transport failure: {}", reason),
        }
    }
}

/// Session plumbing the loop borrows from its controller
pub struct SessionHandles {
    pub writer: ChannelWriter,
    pub tokens: TokenStore,
    pub state: watch::Receiver<SessionState>,
    pub replies: Option<ReplyChannel>,
}

enum Step {
    Continue,
    Stop(LoopExit),
}

pub struct ReportingLoop {
    identity: Identity,
    protocol: Arc<dyn ReportingProtocol>,
    metrics: Box<dyn MetricsSource>,
    handles: SessionHandles,
    settings: LoopSettings,
    sent: u64,
}

impl ReportingLoop {
    pub fn new(
        identity: Identity,
        protocol: Arc<dyn ReportingProtocol>,
        metrics: Box<dyn MetricsSource>,
        handles: SessionHandles,
        settings: LoopSettings,
    ) -> Self {
        Self {
            identity,
            protocol,
            metrics,
            handles,
            settings,
            sent: 0,
        }
    }

    pub fn contributions_sent(&self) -> u64 {
        self.sent
    }

    pub async fn run(&mut self, cancel: &CancellationToken) -> LoopExit {
        info!(
            "Reporting every {:?} (load {}, thermal limit {:.1}°C)",
            self.settings.interval, self.settings.load, self.settings.temp_threshold_c
        );

        loop {
            if cancel.is_cancelled() {
                return LoopExit::Cancelled;
            }
            if let Some(exit) = self.session_stopped() {
                return exit;
            }
            if let Step::Stop(exit) = self.cycle().await {
                return exit;
            }

            let interval = self.settings.interval;
            tokio::select! {
                _ = cancel.cancelled() => return LoopExit::Cancelled,
                stopped = self.handles.state.wait_for(|s| s.is_stopped()) => {
                    let reason = match stopped {
                        Ok(state) => format!("session {}", *state),
                        Err(_) => "session controller dropped".to_string(),
                    };
                    return LoopExit::ChannelLost(reason);
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    fn session_stopped(&self) -> Option<LoopExit> {
        let state = *self.handles.state.borrow();
        state
            .is_stopped()
            .then(|| LoopExit::ChannelLost(format!("session {}", state)))
    }

    async fn cycle(&mut self) -> Step {
        let sample = match self.metrics.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("{}, reporting neutral readings", e);
                HostSample::default()
            }
        };

        let temperature = match self.metrics.cpu_temperature().await {
            Ok(t) => t,
            Err(e) => {
                warn!("Error getting CPU temp: {}, using 0.0", e);
                0.0
            }
        };

        if temperature >= self.settings.temp_threshold_c {
            warn!(
                "CPU temperature too high ({:.1}°C, limit {:.1}°C), stopping contribution",
                temperature, self.settings.temp_threshold_c
            );
            return Step::Stop(LoopExit::SafetyAbort {
                temperature_c: temperature,
                threshold_c: self.settings.temp_threshold_c,
            });
        }

        if self.handles.tokens.take_stale() {
            if let Err(exit) = self.refresh_token().await {
                return Step::Stop(exit);
            }
        }

        let record = ContributionRecord::from_sample(&sample, self.settings.load);
        let token = self.handles.tokens.current();
        if self.protocol.requires_token() && token.is_none() {
            warn!("No authorization token held, skipping this cycle");
            return Step::Continue;
        }

        let message = match self
            .protocol
            .contribution(&self.identity, &record, token.as_deref())
        {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping contribution: {}", e);
                return Step::Continue;
            }
        };

        if let Err(exit) = self.deliver("contribution", message).await {
            return Step::Stop(exit);
        }
        self.sent += 1;
        info!(
            "Contributed: CPU {:.1}%, Memory {:.2} MB, Storage {:.0} GB, Bandwidth {:.0} MB, \
             Uptime {} sec, EcoActions {}, Trees {}, Temp {:.1}°C",
            record.cpu_percent,
            record.memory_mb,
            record.storage_gb,
            record.bandwidth_mb,
            record.uptime_secs,
            record.eco_actions,
            record.trees_planted(),
            temperature
        );

        if !self.settings.follow_ups {
            return Step::Continue;
        }

        let follow_ups = match self.protocol.follow_ups(&self.identity) {
            Ok(follow_ups) => follow_ups,
            Err(e) => {
                warn!("Skipping follow-up queries: {}", e);
                return Step::Continue;
            }
        };
        for (label, message) in follow_ups {
            if let Err(exit) = self.deliver(label, message).await {
                return Step::Stop(exit);
            }
        }

        Step::Continue
    }

    /// Ask for a new token and give the push one exchange timeout to land
    async fn refresh_token(&mut self) -> Result<(), LoopExit> {
        let request = match self.protocol.token_refresh(&self.identity) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Skipping token refresh: {}", e);
                return Ok(());
            }
        };

        info!("Authorization token refused, requesting a fresh one");
        let seen = self.handles.tokens.rotations();
        self.deliver("token refresh", request).await?;

        let timeout = self.settings.exchange_timeout;
        match self.handles.tokens.wait_for_push(seen, timeout).await {
            Some(_) => info!("Authorization token refreshed"),
            None => warn!("No token pushed within {:?}, keeping the held one", timeout),
        }
        Ok(())
    }

    /// Send one message under the protocol's exchange discipline
    async fn deliver(&mut self, label: &str, message: String) -> Result<Option<InboundFrame>, LoopExit> {
        let timeout = self.settings.exchange_timeout;

        match (self.protocol.exchange(), self.handles.replies.as_mut()) {
            (Exchange::RequestResponse, Some(replies)) => {
                match replies.exchange(&self.handles.writer, message, timeout).await {
                    Ok(ExchangeOutcome::Reply(frame)) => {
                        log_reply(label, &frame);
                        Ok(Some(frame))
                    }
                    Ok(ExchangeOutcome::TimedOut) => {
                        warn!("No {} reply within {:?}, moving on", label, timeout);
                        Ok(None)
                    }
                    Ok(ExchangeOutcome::Closed) => Err(LoopExit::ChannelLost(format!(
                        "channel closed awaiting {} reply",
                        label
                    ))),
                    Err(e) => Err(LoopExit::Transport(e.to_string())),
                }
            }
            _ => match self.handles.writer.send_text(message).await {
                Ok(()) => Ok(None),
                Err(e) => {
                    warn!("Error sending {}: {}", label, e);
                    Err(LoopExit::Transport(e.to_string()))
                }
            },
        }
    }
}

fn log_reply(label: &str, frame: &InboundFrame) {
    match frame.status() {
        ReplyStatus::Error(message) => warn!("Coordinator rejected {}: {}", label, message),
        _ => info!("Received {} reply: {}", label, frame.value()),
    }
}
