//! WebSocket connection state
//!
//! ```text
//! Connecting ──→ Open ──→ Closed
//!      └──────────────────↑
//! ```
//!
//! `Closed` is terminal: a transport never reconnects on its own. Callers
//! that want a new connection build a new transport (or wrap calls in
//! [`RetryingTransport`](crate::RetryingTransport)).

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of one socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Handshake in progress; requests are queued
    Connecting,
    /// Handshake complete; requests go straight to the socket
    Open,
    /// Socket gone, by error or by request
    Closed,
}

impl ConnectionState {
    /// Numeric value reported on the connection state gauge
    pub fn as_gauge(self) -> i64 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closed => 2,
        }
    }

    /// Whether a transition from `self` to `next` is allowed
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::Connecting, ConnectionState::Open)
                | (ConnectionState::Connecting, ConnectionState::Closed)
                | (ConnectionState::Open, ConnectionState::Closed)
        )
    }
}

/// Shared, observable connection state
///
/// Every transport handle holds a clone; the connection task is the only
/// writer.
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Connecting);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Move to `next`, returning false if the transition is not allowed
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Wait until the state satisfies `f`, returning the state that did
    pub(crate) async fn wait_for(&self, f: impl FnMut(&ConnectionState) -> bool) -> ConnectionState {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(f).await {
            Ok(state) => *state,
            // The sender lives in self, so the channel cannot close while we wait
            Err(_) => self.get(),
        };
        state
    }
}
