//! Connection lifecycle events
//!
//! A WebSocket transport emits [`TransportEvent::Open`] once the handshake
//! completes and [`TransportEvent::Close`] exactly once when the socket goes
//! away. An abnormal end (handshake failure, read error, peer vanishing
//! without a close frame) is preceded by [`TransportEvent::Error`].
//!
//! Handlers are async closures, awaited one at a time in registration order
//! on a task of their own, so a handler may make calls on the transport that
//! fired it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ethrpc_client::{EventKind, WsTransport};
//!
//! # async fn example() -> ethrpc_core::Result<()> {
//! let transport = WsTransport::builder("ws://127.0.0.1:8546")
//!     .on(EventKind::Open, |_| async { println!("connected") })
//!     .on(EventKind::Close, |_| async { println!("disconnected") })
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Something that happened to the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Open,
    /// Socket closed
    Close,
    /// Connection-level failure, followed by `Close`
    Error(String),
}

impl TransportEvent {
    /// Kind used to look up handlers
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::Open => EventKind::Open,
            TransportEvent::Close => EventKind::Close,
            TransportEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Event selector for handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`TransportEvent::Open`]
    Open,
    /// See [`TransportEvent::Close`]
    Close,
    /// See [`TransportEvent::Error`]
    Error,
}

/// Type for event handler functions
pub type EventFn =
    Arc<dyn Fn(TransportEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Wrap an async closure into an [`EventFn`]
pub fn event_fn<F, Fut>(handler: F) -> EventFn
where
    F: Fn(TransportEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| Box::pin(handler(event)))
}

/// Registry of lifecycle handlers
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: Arc<Mutex<HashMap<EventKind, Vec<EventFn>>>>,
}

impl EventHandlers {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with handlers
    pub fn with_handlers(initial: Vec<(EventKind, EventFn)>) -> Self {
        let mut handlers: HashMap<EventKind, Vec<EventFn>> = HashMap::new();
        for (kind, handler) in initial {
            handlers.entry(kind).or_default().push(handler);
        }
        Self {
            handlers: Arc::new(Mutex::new(handlers)),
        }
    }

    /// Add a handler for `kind`
    pub async fn register(&self, kind: EventKind, handler: EventFn) {
        self.handlers.lock().await.entry(kind).or_default().push(handler);
    }

    /// Run every handler registered for the event's kind
    pub async fn emit(&self, event: TransportEvent) {
        let handlers = match self.handlers.lock().await.get(&event.kind()) {
            Some(handlers) => handlers.clone(),
            None => return,
        };

        for handler in handlers {
            handler(event.clone()).await;
        }
    }

    /// Number of handlers registered for `kind`
    pub async fn count(&self, kind: EventKind) -> usize {
        self.handlers
            .lock()
            .await
            .get(&kind)
            .map_or(0, |handlers| handlers.len())
    }
}
