//! Core JSON-RPC 2.0 types for ethrpc
//!
//! This crate holds everything the transports share and nothing that touches
//! the network:
//!
//! - **Types**: request, response and notification envelopes
//! - **Codec**: frame encoding and decoding
//! - **Base transport**: the per-connection id counter and debug-gated
//!   diagnostics
//! - **Error handling**: the transport / rpc / protocol error taxonomy
//! - **Observability**: `tracing` and OpenTelemetry bootstrap
//!
//! The HTTP and WebSocket transports live in `ethrpc-client`.
//!
//! # Example
//!
//! ```rust
//! use ethrpc_core::{codec, params, BaseTransport};
//!
//! let base = BaseTransport::new();
//! let request = base.envelope("eth_getBalance", params!["0x407d73d8a49eeb85d32cf465507dd71d507100c1", "latest"]);
//! assert_eq!(request.id, 1);
//!
//! let text = codec::encode_request(&request).unwrap();
//! assert_eq!(codec::decode_request(&text).unwrap().params, request.params);
//! ```

pub mod base;
pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use base::{BaseTransport, INITIAL_ID, LOG_TARGET};
pub use error::{Error, JsonRpcErrorData, Result, TransportError};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    Id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, SubscriptionParams,
};

// Used by `params!` so callers need not depend on serde_json directly
#[doc(hidden)]
pub use serde_json;

/// Build an ordered parameter list from serializable expressions
///
/// Each argument is any `Serialize` expression and goes through
/// `serde_json::json!`. Expands to a `Vec<serde_json::Value>`.
///
/// ```rust
/// use ethrpc_core::params;
/// use serde_json::json;
///
/// let block = 42u64;
/// assert_eq!(params![], Vec::<serde_json::Value>::new());
/// assert_eq!(params![1, "two", block], vec![json!(1), json!("two"), json!(42)]);
/// assert_eq!(params![json!({"to": "0x00"}), -1][1], json!(-1));
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::serde_json::Value>::new()
    };
    ($($param:expr),+ $(,)?) => {
        ::std::vec![$($crate::serde_json::json!($param)),+]
    };
}
