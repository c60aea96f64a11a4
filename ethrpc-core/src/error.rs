//! Error types for ethrpc
//!
//! Every failure a caller can observe falls into one of three families:
//!
//! - **Transport**: the request never produced a JSON-RPC answer (non-2xx HTTP
//!   status, refused connection, socket closed while the call was in flight).
//! - **Rpc**: the node answered with a JSON-RPC `error` object. The error is
//!   surfaced verbatim; its `Display` is exactly the server-provided message so
//!   callers can match on it.
//! - **Protocol**: an inbound frame could not be understood. Transports log and
//!   drop such frames; the variant only reaches callers from the codec.
//!
//! None of these are retried by the transports themselves. See
//! `ethrpc_client::RetryingTransport` for an opt-in policy.
//!
//! # Examples
//!
//! ```rust
//! use ethrpc_core::{Error, JsonRpcErrorData, TransportError};
//!
//! let rpc = Error::Rpc(JsonRpcErrorData::new(-32000, "nonce too low"));
//! assert_eq!(rpc.to_string(), "nonce too low");
//! assert_eq!(rpc.rpc_code(), Some(-32000));
//!
//! let closed: Error = TransportError::ConnectionClosed.into();
//! assert!(closed.is_transport());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used throughout the ethrpc crates
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type
///
/// `Clone` because a single socket failure is fanned out to every pending
/// call on that socket.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Connection-level failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The node answered with a JSON-RPC error object
    #[error("{}", .0.message)]
    Rpc(JsonRpcErrorData),

    /// Malformed or unexpected inbound message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Conversion between Rust values and JSON failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// `unsubscribe` was asked to drop a subscription this transport does not hold
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),
}

impl Error {
    /// True for connection-level failures (the only kind worth retrying)
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// The JSON-RPC error code, when the node reported one
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Error::Rpc(data) => Some(data.code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Failures below the JSON-RPC layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The HTTP endpoint answered with a non-2xx status
    #[error("HTTP {status}: {status_text}")]
    Http {
        /// Numeric status code
        status: u16,
        /// Canonical reason phrase for the status
        status_text: String,
    },

    /// The HTTP request produced no response at all (refused, DNS, timeout)
    #[error("Request failed: {0}")]
    Request(String),

    /// WebSocket handshake or frame error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The socket closed while the call was outstanding, or before it was sent
    #[error("Connection closed")]
    ConnectionClosed,

    /// The endpoint URL was rejected before any I/O happened
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No usable node authentication token
    #[error("Authentication error: {0}")]
    Auth(String),
}

/// JSON-RPC 2.0 error object as it appears on the wire
///
/// Ethereum nodes use the reserved range (`-32700..=-32000`) as well as
/// positive, node-specific codes, so `code` is kept as `i64`.
///
/// ```rust
/// use ethrpc_core::JsonRpcErrorData;
///
/// let error: JsonRpcErrorData =
///     serde_json::from_str(r#"{"code":1,"message":"TestError"}"#).unwrap();
/// assert_eq!(error.code, 1);
/// assert!(error.data.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code
    pub code: i64,

    /// Human-readable description, surfaced to callers unchanged
    pub message: String,

    /// Optional extra information (revert data, validation details)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    /// Create an error object with code and message
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error object carrying additional data
    pub fn with_data(code: i64, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    /// Formats as "[code] message", the shape used in diagnostic logs
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_error_displays_server_message() {
        let error = Error::Rpc(JsonRpcErrorData::new(1, "TestError"));
        assert_eq!(error.to_string(), "TestError");
        assert_eq!(error.rpc_code(), Some(1));
        assert!(!error.is_transport());
    }

    #[test]
    fn test_http_error_display() {
        let error: Error = TransportError::Http {
            status: 500,
            status_text: "Internal Server Error".to_string(),
        }
        .into();

        assert!(error.is_transport());
        assert_eq!(error.to_string(), "HTTP 500: Internal Server Error");
        assert_eq!(error.rpc_code(), None);
    }

    #[test]
    fn test_error_data_display() {
        let error = JsonRpcErrorData::new(-32601, "Method not found");
        assert_eq!(format!("{}", error), "[-32601] Method not found");
    }

    #[test]
    fn test_error_data_with_data_roundtrip() {
        let error = JsonRpcErrorData::with_data(3, "execution reverted", json!("0x08c379a0"));

        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: JsonRpcErrorData = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, error);
    }

    #[test]
    fn test_error_data_without_data_omits_field() {
        let serialized = serde_json::to_string(&JsonRpcErrorData::new(-32000, "Custom")).unwrap();
        assert!(!serialized.contains("data"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let serde_error = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let error: Error = serde_error.into();

        match error {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            other => panic!("Expected Serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_closed_is_transport() {
        let error: Error = TransportError::ConnectionClosed.into();
        assert!(error.is_transport());
        assert_eq!(error.to_string(), "Connection closed");
    }
}
