//! WebSocket transport
//!
//! One persistent socket per transport, owned by a single connection task.
//! Handles talk to that task through an unbounded queue, so any number of
//! calls may be in flight at once; replies are matched back to their callers
//! by id through the [`PendingCalls`] map.
//!
//! ```text
//!  execute / subscribe ──register──→ PendingCalls ←──complete/notify──┐
//!          │                                                         │
//!          └──frame──→ outbound queue ──→ connection task ──→ socket ─┘
//! ```
//!
//! Construction returns immediately and the task starts connecting in the
//! background. Frames sent before the handshake completes are queued and
//! flushed in order once it does. When the socket closes (by either side,
//! cleanly or not) every outstanding call fails with
//! `TransportError::ConnectionClosed`, every live subscription callback gets
//! one final `Err(ConnectionClosed)`, and the transport stays closed.
//!
//! Dropping the last handle closes the socket.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ethrpc_client::{Transport, WsTransport};
//! use ethrpc_core::params;
//!
//! # async fn example() -> ethrpc_core::Result<()> {
//! let node = WsTransport::connect("ws://127.0.0.1:8546").await?;
//!
//! let chain_id = node.execute("eth_chainId", params![]).await?;
//!
//! let sub_id = node
//!     .subscribe("eth", |head| println!("new head: {:?}", head), params!["newHeads"])
//!     .await?;
//! node.unsubscribe(sub_id).await?;
//! node.close().await;
//! # Ok(())
//! # }
//! ```

use crate::auth;
use crate::call_log::{CallLog, DEFAULT_CAPACITY};
use crate::connection_state::{ConnectionState, StateCell};
use crate::events::{event_fn, EventFn, EventHandlers, EventKind, TransportEvent};
use crate::metrics::TransportMetrics;
use crate::pending::{Dispatch, LiveSubscription, PendingCalls, SubscriptionFn};
use crate::transport::Transport;
use async_trait::async_trait;
use ethrpc_core::{
    codec, BaseTransport, Error, JsonRpcMessage, ObservabilityConfig, Result, TransportError,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;

/// Work for the connection task
enum Outbound {
    Frame(String),
    Close,
}

/// Which subscriptions [`WsTransport::unsubscribe`] should drop
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionTarget {
    /// The subscription with this server-assigned id
    Id(Value),
    /// Every live subscription
    All,
}

impl From<Value> for SubscriptionTarget {
    fn from(id: Value) -> Self {
        SubscriptionTarget::Id(id)
    }
}

impl From<&str> for SubscriptionTarget {
    fn from(id: &str) -> Self {
        SubscriptionTarget::Id(Value::String(id.to_string()))
    }
}

impl From<String> for SubscriptionTarget {
    fn from(id: String) -> Self {
        SubscriptionTarget::Id(Value::String(id))
    }
}

impl From<u64> for SubscriptionTarget {
    fn from(id: u64) -> Self {
        SubscriptionTarget::Id(Value::from(id))
    }
}

/// JSON-RPC over a persistent WebSocket
#[derive(Clone)]
pub struct WsTransport {
    base: BaseTransport,
    url: String,
    pending: PendingCalls,
    outbound: mpsc::UnboundedSender<Outbound>,
    state: StateCell,
    events: EventHandlers,
    close_reason: Arc<Mutex<Option<String>>>,
    metrics: Option<TransportMetrics>,
    call_log: CallLog,
}

impl WsTransport {
    /// Start connecting to `url` with default settings
    ///
    /// Returns at once; must be called inside a tokio runtime.
    pub fn new(url: &str) -> Result<Self> {
        Self::builder(url).build()
    }

    /// Start connecting and wait for the handshake to finish
    pub async fn connect(url: &str) -> Result<Self> {
        Self::builder(url).connect().await
    }

    /// Start configuring a transport
    pub fn builder(url: impl Into<String>) -> WsTransportBuilder {
        WsTransportBuilder::new(url)
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Recent calls made through this transport
    pub fn call_log(&self) -> &CallLog {
        &self.call_log
    }

    /// Number of calls and subscriptions awaiting replies
    pub async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    /// Register a lifecycle handler
    ///
    /// Handlers registered here only see events that happen afterwards; use
    /// [`WsTransportBuilder::on`] to be sure of seeing `Open`.
    pub async fn on<F, Fut>(&self, kind: EventKind, handler: F)
    where
        F: Fn(TransportEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.events.register(kind, event_fn(handler)).await;
    }

    /// Wait until the handshake completes
    ///
    /// Fails if the connection closes first, with the reason when one is known.
    pub async fn wait_for_open(&self) -> Result<()> {
        match self.state.wait_for(|s| *s != ConnectionState::Connecting).await {
            ConnectionState::Open => Ok(()),
            _ => Err(self.close_error()),
        }
    }

    /// Wait until the connection is closed
    pub async fn closed(&self) {
        self.state.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// Close the socket
    ///
    /// Returns once the transport is closed and outstanding calls have been
    /// failed. Closing a closed transport does nothing.
    pub async fn close(&self) {
        if self.state.get() == ConnectionState::Closed {
            return;
        }
        let _ = self.outbound.send(Outbound::Close);
        self.closed().await;
    }

    /// Subscribe to `<api>_subscribe` with `params`
    ///
    /// Resolves with the server subscription id. Every later message for the
    /// subscription goes to `callback`, as does one final
    /// `Err(ConnectionClosed)` if the socket closes while it is live.
    pub async fn subscribe<F>(&self, api: &str, callback: F, params: Vec<Value>) -> Result<Value>
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        let callback: SubscriptionFn = Arc::new(callback);
        let method = format!("{}_subscribe", api);
        self.tracked(&method, params, Some((api.to_string(), callback)))
            .await
    }

    /// Drop one subscription, or all of them
    ///
    /// Sends `<api>_unsubscribe [id]` and deletes the subscription once the
    /// node acknowledges. Unknown ids fail with `Error::UnknownSubscription`
    /// without touching the socket. When several APIs handed out the same id,
    /// the oldest of those subscriptions is the one dropped.
    pub async fn unsubscribe(&self, target: impl Into<SubscriptionTarget>) -> Result<()> {
        match target.into() {
            SubscriptionTarget::Id(server_id) => {
                let live = self
                    .pending
                    .find_subscription(&server_id)
                    .await
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::UnknownSubscription(server_id.to_string()))?;
                self.unsubscribe_one(live).await
            }
            SubscriptionTarget::All => {
                let live = self.pending.live_subscriptions().await;
                let results =
                    futures::future::join_all(live.into_iter().map(|live| self.unsubscribe_one(live)))
                        .await;
                results.into_iter().collect::<Result<Vec<()>>>()?;
                Ok(())
            }
        }
    }

    /// Drop every live subscription
    pub async fn unsubscribe_all(&self) -> Result<()> {
        self.unsubscribe(SubscriptionTarget::All).await
    }

    async fn unsubscribe_one(&self, live: LiveSubscription) -> Result<()> {
        let method = format!("{}_unsubscribe", live.api);
        self.tracked(&method, vec![live.server_id], None).await?;
        self.pending.remove(live.request_id).await;
        Ok(())
    }

    async fn tracked(
        &self,
        method: &str,
        params: Vec<Value>,
        subscription: Option<(String, SubscriptionFn)>,
    ) -> Result<Value> {
        let started = Instant::now();
        let outcome = self.send_request(method, params.clone(), subscription).await;
        let elapsed = started.elapsed();

        self.call_log.record(method, &params, &outcome, elapsed);
        if let Some(metrics) = &self.metrics {
            metrics.record_request(method, &outcome, elapsed.as_secs_f64());
        }

        outcome
    }

    async fn send_request(
        &self,
        method: &str,
        params: Vec<Value>,
        subscription: Option<(String, SubscriptionFn)>,
    ) -> Result<Value> {
        let request = self.base.envelope(method, params);
        let id = request.id;
        let text = codec::encode_request(&request)?;

        let completion = match subscription {
            Some((api, callback)) => self.pending.register_subscription(id, api, callback).await,
            None => self.pending.register_call(id).await,
        };

        self.base.log(format!("sending {}", text));
        if self.outbound.send(Outbound::Frame(text)).is_err() {
            self.pending.remove(id).await;
            return Err(TransportError::ConnectionClosed.into());
        }
        if let Some(metrics) = &self.metrics {
            metrics.update_pending(self.pending.len().await);
        }

        completion
            .await
            .unwrap_or_else(|_| Err(TransportError::ConnectionClosed.into()))
    }

    fn close_error(&self) -> Error {
        let reason = self.close_reason.lock().ok().and_then(|slot| slot.clone());
        match reason {
            Some(reason) => TransportError::WebSocket(reason).into(),
            None => TransportError::ConnectionClosed.into(),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn base(&self) -> &BaseTransport {
        &self.base
    }

    async fn execute(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.tracked(method, params, None).await
    }

    fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Open
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.url)
            .field("base", &self.base)
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// Builder for [`WsTransport`]
pub struct WsTransportBuilder {
    url: String,
    token: Option<String>,
    token_file: Option<PathBuf>,
    debug: bool,
    metrics: Option<TransportMetrics>,
    call_log_capacity: usize,
    handlers: Vec<(EventKind, EventFn)>,
}

impl WsTransportBuilder {
    /// Builder with defaults for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            token_file: None,
            debug: false,
            metrics: None,
            call_log_capacity: DEFAULT_CAPACITY,
            handlers: Vec::new(),
        }
    }

    /// Authenticate the handshake with a node token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Authenticate with the token read from a node auth-codes file at build time
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Initial debug flag
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Record metrics from the global meter named `service_name`
    pub fn with_metrics(mut self, service_name: impl Into<String>) -> Self {
        self.metrics = Some(TransportMetrics::new(service_name, "ws"));
        self
    }

    /// Install observability from `config` and record metrics if it enables them
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        if config.enable_metrics {
            self.metrics = Some(TransportMetrics::new(config.service_name.clone(), "ws"));
        }
        if let Err(e) = ethrpc_core::init_observability(config) {
            tracing::warn!(error = %e, "observability not installed");
        }
        self
    }

    /// Number of recent calls kept; 0 disables the call log
    pub fn call_log_capacity(mut self, capacity: usize) -> Self {
        self.call_log_capacity = capacity;
        self
    }

    /// Register a lifecycle handler before the connection starts
    pub fn on<F, Fut>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(TransportEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.push((kind, event_fn(handler)));
        self
    }

    /// Validate the settings and start connecting in the background
    pub fn build(self) -> Result<WsTransport> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::WebSocket(format!("no tokio runtime: {}", e)))?;

        let request = self.handshake_request()?;

        let base = BaseTransport::new();
        base.set_debug(self.debug);

        let pending = PendingCalls::new();
        let state = StateCell::new();
        let events = EventHandlers::with_handlers(self.handlers);
        let close_reason = Arc::new(Mutex::new(None));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        if let Some(metrics) = &self.metrics {
            metrics.update_connection_state(ConnectionState::Connecting);
        }

        let connection = Connection {
            base: base.clone(),
            pending: pending.clone(),
            state: state.clone(),
            events: event_tx,
            close_reason: close_reason.clone(),
            metrics: self.metrics.clone(),
        };

        runtime.spawn(dispatch_events(events.clone(), event_rx));
        runtime.spawn(connection.run(request, outbound_rx));

        Ok(WsTransport {
            base,
            url: self.url,
            pending,
            outbound: outbound_tx,
            state,
            events,
            close_reason,
            metrics: self.metrics,
            call_log: CallLog::new(self.call_log_capacity),
        })
    }

    /// Build and wait for the handshake to finish
    pub async fn connect(self) -> Result<WsTransport> {
        let transport = self.build()?;
        transport.wait_for_open().await?;
        Ok(transport)
    }

    fn handshake_request(&self) -> Result<Request> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", self.url, e)))?;

        match request.uri().scheme_str() {
            Some("ws") | Some("wss") => {}
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme for WebSocket transport: {}",
                    other.unwrap_or("none")
                ))
                .into())
            }
        }

        let token = match (&self.token, &self.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(path)) => Some(auth::read_token_file(path)?),
            (None, None) => None,
        };
        if let Some(token) = token {
            auth::authorize(&mut request, &token)?;
        }

        Ok(request)
    }
}

async fn dispatch_events(handlers: EventHandlers, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = rx.recv().await {
        handlers.emit(event).await;
    }
}

/// State owned by the connection task
struct Connection {
    base: BaseTransport,
    pending: PendingCalls,
    state: StateCell,
    events: mpsc::UnboundedSender<TransportEvent>,
    close_reason: Arc<Mutex<Option<String>>>,
    metrics: Option<TransportMetrics>,
}

impl Connection {
    async fn run(self, request: Request, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
        let mut queued = Vec::new();

        let handshake = tokio_tungstenite::connect_async(request);
        tokio::pin!(handshake);

        let stream = loop {
            tokio::select! {
                result = &mut handshake => match result {
                    Ok((stream, _)) => break stream,
                    Err(e) => {
                        self.finish(&mut outbound, Some(format!("connect failed: {}", e))).await;
                        return;
                    }
                },
                msg = outbound.recv() => match msg {
                    Some(Outbound::Frame(text)) => queued.push(text),
                    Some(Outbound::Close) | None => {
                        self.finish(&mut outbound, None).await;
                        return;
                    }
                },
            }
        };

        self.set_state(ConnectionState::Open);
        self.base.log("connection open");
        let _ = self.events.send(TransportEvent::Open);

        let (mut sink, mut source) = stream.split();

        for text in queued {
            if let Err(e) = sink.send(Message::Text(text)).await {
                self.finish(&mut outbound, Some(format!("send failed: {}", e))).await;
                return;
            }
        }

        let error = loop {
            tokio::select! {
                msg = outbound.recv() => match msg {
                    Some(Outbound::Frame(text)) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break Some(format!("send failed: {}", e));
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sink.close().await;
                        break None;
                    }
                },
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.handle_text(&text).await,
                        Err(_) => self.base.error("dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        self.base.log(format!("closed by server: {:?}", frame));
                        break None;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break Some("connection lost".to_string()),
                },
            }
        };

        self.finish(&mut outbound, error).await;
    }

    async fn handle_text(&self, text: &str) {
        let messages = match codec::decode_frame(text) {
            Ok(messages) => messages,
            Err(e) => {
                self.drop_malformed(&e, text);
                return;
            }
        };

        for message in messages {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    self.drop_malformed(&e, text);
                    continue;
                }
            };
            let dispatch = match message {
                JsonRpcMessage::Response(response) => {
                    let id = response.id.clone();
                    let failed = response.is_error();
                    let dispatch = self.pending.complete(response).await;
                    match (&dispatch, failed) {
                        (Dispatch::Unmatched, _) => self
                            .base
                            .log(format!("ignoring reply for unknown id {}: {}", id, text)),
                        (_, true) => self.base.error(text),
                        (_, false) => self.base.log(text),
                    }
                    dispatch
                }
                JsonRpcMessage::Notification(notification) => {
                    let dispatch = self.pending.notify(&notification).await;
                    match &dispatch {
                        Dispatch::Unmatched => self.base.log(format!(
                            "ignoring notification {}: {}",
                            notification.method, text
                        )),
                        _ => self.base.log(text),
                    }
                    dispatch
                }
            };

            if let (Some(metrics), Dispatch::Delivered { api }) = (&self.metrics, &dispatch) {
                metrics.record_subscription_message(api);
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_pending(self.pending.len().await);
        }
    }

    fn drop_malformed(&self, error: &Error, text: &str) {
        self.base.error(format!("dropping malformed message ({}): {}", error, text));
        if let Some(metrics) = &self.metrics {
            metrics.record_error(error);
        }
    }

    async fn finish(&self, outbound: &mut mpsc::UnboundedReceiver<Outbound>, error: Option<String>) {
        outbound.close();

        if let Some(reason) = &error {
            if let Ok(mut slot) = self.close_reason.lock() {
                *slot = Some(reason.clone());
            }
        }

        self.pending
            .fail_all(TransportError::ConnectionClosed.into())
            .await;
        self.set_state(ConnectionState::Closed);
        if let Some(metrics) = &self.metrics {
            metrics.update_pending(0);
        }

        if let Some(reason) = error {
            self.base.error(format!("connection error: {}", reason));
            let _ = self.events.send(TransportEvent::Error(reason));
        }
        self.base.log("connection closed");
        let _ = self.events.send(TransportEvent::Close);
    }

    fn set_state(&self, next: ConnectionState) {
        if self.state.transition(next) {
            if let Some(metrics) = &self.metrics {
                metrics.update_connection_state(next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_rejects_non_ws_scheme() {
        let error = WsTransport::new("http://127.0.0.1:8545").unwrap_err();
        assert!(matches!(error, Error::Transport(TransportError::InvalidUrl(_))));
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        assert!(WsTransport::new("ws://127.0.0.1:8546").is_err());
    }

    #[tokio::test]
    async fn test_missing_token_file_fails_build() {
        let result = WsTransport::builder("ws://127.0.0.1:8546")
            .token_file("/nonexistent/ethrpc/authcodes")
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refused_connection_closes() {
        let transport = WsTransport::new("ws://127.0.0.1:1").unwrap();

        let error = transport.wait_for_open().await.unwrap_err();
        assert!(error.is_transport());
        assert_eq!(transport.state(), ConnectionState::Closed);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_calls_after_close_fail_immediately() {
        let transport = WsTransport::new("ws://127.0.0.1:1").unwrap();
        transport.closed().await;

        let error = transport.execute("eth_blockNumber", vec![]).await.unwrap_err();
        assert!(matches!(error, Error::Transport(TransportError::ConnectionClosed)));
        assert_eq!(transport.pending_count().await, 0);

        transport.close().await;
        transport.close().await;
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_id() {
        let transport = WsTransport::new("ws://127.0.0.1:1").unwrap();

        let error = transport.unsubscribe(json!("0xdead")).await.unwrap_err();
        assert!(matches!(error, Error::UnknownSubscription(_)));
    }

    #[tokio::test]
    async fn test_unsubscribe_all_without_subscriptions() {
        let transport = WsTransport::new("ws://127.0.0.1:1").unwrap();
        transport.unsubscribe_all().await.unwrap();
    }

    #[test]
    fn test_subscription_target_conversions() {
        assert_eq!(SubscriptionTarget::from("0x1"), SubscriptionTarget::Id(json!("0x1")));
        assert_eq!(SubscriptionTarget::from(5u64), SubscriptionTarget::Id(json!(5)));
        assert_eq!(
            SubscriptionTarget::from(json!({"a": 1})),
            SubscriptionTarget::Id(json!({"a": 1}))
        );
    }
}
