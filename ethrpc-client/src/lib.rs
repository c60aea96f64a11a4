//! JSON-RPC 2.0 transports for Ethereum nodes
//!
//! Two transports share one contract, [`Transport`]: give it a method name
//! and positional params, get back the node's `result` or an [`ethrpc_core::Error`].
//!
//! - [`HttpTransport`]: one POST per call, stateless apart from the id counter
//! - [`WsTransport`]: one persistent socket, many concurrent calls,
//!   subscriptions with callbacks, lifecycle events
//!
//! Both keep a bounded [`CallLog`] and can record OpenTelemetry metrics.
//! [`RetryingTransport`] adds retries for connection-level failures to either.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ethrpc_client::{EventKind, TransportExt, WsTransport};
//! use ethrpc_core::params;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = WsTransport::builder("ws://127.0.0.1:8546")
//!         .token_file("/var/lib/node/authcodes")
//!         .on(EventKind::Close, |_| async { eprintln!("node went away") })
//!         .connect()
//!         .await?;
//!
//!     let peers: String = node.request("net_peerCount", params![]).await?;
//!     println!("peers: {}", peers);
//!
//!     node.subscribe("eth", |head| println!("{:?}", head), params!["newHeads"])
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
mod call_log;
mod connection_state;
mod events;
mod http;
mod metrics;
mod pending;
mod retry;
mod transport;
mod ws;

pub use call_log::{CallLog, CallRecord, DEFAULT_CAPACITY};
pub use connection_state::ConnectionState;
pub use events::{event_fn, EventFn, EventHandlers, EventKind, TransportEvent};
pub use http::{HttpTransport, HttpTransportBuilder, DEFAULT_TIMEOUT};
pub use metrics::{error_kind, TransportMetrics};
pub use pending::{Completion, Dispatch, LiveSubscription, PendingCalls, SubscriptionFn};
pub use retry::{ExponentialBackoff, FixedDelay, NoRetry, RetryStrategy, RetryingTransport};
pub use transport::{Transport, TransportExt};
pub use ws::{SubscriptionTarget, WsTransport, WsTransportBuilder};
