//! Authorization token held for the session
//!
//! Written by the listener task on every push, read by the reporting loop.
//! Every push is authoritative: the last one written wins, whatever order the
//! coordinator's frames arrived in.
//!
//! A rejection of the held token marks it stale; the reporting loop takes
//! that mark at most once per cycle and asks for a fresh token.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone)]
pub struct TokenStore {
    tx: Arc<watch::Sender<Option<String>>>,
    rotations: Arc<AtomicU64>,
    stale: Arc<AtomicBool>,
}

impl TokenStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rotations: Arc::new(AtomicU64::new(0)),
            stale: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the held token. Returns true if the value changed.
    pub fn replace(&self, token: &str) -> bool {
        self.rotations.fetch_add(1, Ordering::Relaxed);
        let previous = self.tx.send_replace(Some(token.to_string()));
        previous.as_deref() != Some(token)
    }

    /// Current token, if a non-empty one has been received
    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone().filter(|t| !t.is_empty())
    }

    /// Wait without spinning until a non-empty token is present
    pub async fn wait_for_first(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.tx.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|t| t.as_deref().is_some_and(|s| !s.is_empty())),
        )
        .await;

        match waited {
            Ok(Ok(token)) => token.clone(),
            _ => None,
        }
    }

    /// Wait until a push arrives beyond the first `seen` ones.
    /// Resolves on re-sent tokens too, since the coordinator may hand back
    /// an unexpired token unchanged.
    pub async fn wait_for_push(&self, seen: u64, timeout: Duration) -> Option<String> {
        let mut rx = self.tx.subscribe();
        let rotations = self.rotations.clone();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|_| rotations.load(Ordering::Relaxed) > seen),
        )
        .await;

        match waited {
            Ok(Ok(token)) => token.clone().filter(|t| !t.is_empty()),
            _ => None,
        }
    }

    /// The coordinator refused the held token
    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    /// Whether a refresh is due, clearing the mark
    pub fn take_stale(&self) -> bool {
        self.stale.swap(false, Ordering::AcqRel)
    }

    /// Discard the token at the end of a session
    pub fn clear(&self) {
        self.tx.send_replace(None);
        self.stale.store(false, Ordering::Release);
    }

    /// Number of token pushes observed
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
