//! Synchronous request/response over the shared channel
//!
//! The listener forwards every inbound frame into a bounded queue; an
//! exchange sends one request and waits, with a deadline, for the next
//! frame. Replies carry no correlation ID, so frames left over from a
//! timed-out exchange are dropped before the next request goes out.

use crate::error::Result;
use crate::transport::ChannelWriter;
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;
use triad_proto::InboundFrame;

/// Frames buffered between the listener and an exchange
pub const REPLY_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Reply(InboundFrame),
    TimedOut,
    /// The listener stopped; no reply can arrive
    Closed,
}

pub struct ReplyChannel {
    rx: mpsc::Receiver<InboundFrame>,
}

impl ReplyChannel {
    pub fn new() -> (mpsc::Sender<InboundFrame>, Self) {
        let (tx, rx) = mpsc::channel(REPLY_QUEUE_DEPTH);
        (tx, Self { rx })
    }

    /// Drop replies that arrived after their exchange gave up
    pub fn drain_stale(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(frame) = self.rx.try_recv() {
            debug!("Dropping stale reply: {}", frame.value());
            dropped += 1;
        }
        dropped
    }

    /// Send `request` and wait up to `timeout` for its reply.
    ///
    /// A failed send is an error; a missing reply is an outcome.
    pub async fn exchange(
        &mut self,
        writer: &ChannelWriter,
        request: String,
        timeout: Duration,
    ) -> Result<ExchangeOutcome> {
        self.drain_stale();
        writer.send_text(request).await?;
        Ok(self.await_reply(timeout).await)
    }

    pub async fn await_reply(&mut self, timeout: Duration) -> ExchangeOutcome {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(frame)) => ExchangeOutcome::Reply(frame),
            Ok(None) => ExchangeOutcome::Closed,
            Err(_) => ExchangeOutcome::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_await_reply_outcomes() {
        let (tx, mut replies) = ReplyChannel::new();

        tx.send(InboundFrame::parse(r#"{"status":"registered"}"#).unwrap())
            .await
            .unwrap();
        match replies.await_reply(Duration::from_secs(1)).await {
            ExchangeOutcome::Reply(frame) => assert_eq!(frame.value()["status"], "registered"),
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(
            replies.await_reply(Duration::from_millis(20)).await,
            ExchangeOutcome::TimedOut
        );

        drop(tx);
        assert_eq!(
            replies.await_reply(Duration::from_secs(1)).await,
            ExchangeOutcome::Closed
        );
    }

    #[tokio::test]
    async fn test_drain_stale() {
        let (tx, mut replies) = ReplyChannel::new();
        for i in 0..3 {
            tx.send(InboundFrame::parse(&format!("{{\"late\":{}}}", i)).unwrap())
                .await
                .unwrap();
        }
        assert_eq!(replies.drain_stale(), 3);
        assert_eq!(replies.drain_stale(), 0);
    }

    #[tokio::test]
    async fn test_late_reply_does_not_answer_next_request() {
        let (tx, mut replies) = ReplyChannel::new();
        assert_eq!(
            replies.await_reply(Duration::from_millis(20)).await,
            ExchangeOutcome::TimedOut
        );

        tx.send(InboundFrame::parse(r#"{"status":"late"}"#).unwrap())
            .await
            .unwrap();
        assert_eq!(replies.drain_stale(), 1);

        tx.send(InboundFrame::parse(r#"{"status":"current"}"#).unwrap())
            .await
            .unwrap();
        match replies.await_reply(Duration::from_secs(1)).await {
            ExchangeOutcome::Reply(frame) => assert_eq!(frame.value()["status"], "current"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
