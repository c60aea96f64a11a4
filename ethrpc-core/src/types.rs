//! JSON-RPC 2.0 envelopes exchanged with an Ethereum node
//!
//! Outgoing traffic is always a [`JsonRpcRequest`] with a numeric id and a
//! positional parameter list. Incoming traffic is either a [`JsonRpcResponse`]
//! correlated by id, or (WebSocket only) a [`JsonRpcNotification`] carrying a
//! pub/sub payload such as:
//!
//! ```json
//! {"jsonrpc":"2.0","method":"eth_subscription",
//!  "params":{"subscription":"0x9cef478923ff08bf67fde6c64013158d","result":"0x1b4"}}
//! ```

use crate::error::{Error, JsonRpcErrorData, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol version carried by every envelope
pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Identifier of an inbound response
///
/// Requests built by this crate always use numbers, but a node may echo a
/// string or `null` (for parse errors). Only non-negative integers can be
/// correlated with a pending call.
///
/// ```rust
/// use ethrpc_core::Id;
///
/// assert_eq!(Id::Number(7).as_u64(), Some(7));
/// assert_eq!(Id::Null.as_u64(), None);
/// assert_eq!(Id::String("a".into()).to_string(), "\"a\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric identifier
    Number(u64),
    /// String identifier
    String(String),
    /// Null identifier (the server could not read the request id)
    Null,
}

impl Id {
    /// The numeric value, if this id can match a request issued by a transport
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Id::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{}", n),
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

/// Outgoing request envelope
///
/// Field order is the wire order: `jsonrpc`, `method`, `params`, `id`. The
/// derive keeps it stable, which makes encoded requests comparable
/// byte-for-byte.
///
/// ```rust
/// use ethrpc_core::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("foo", vec![json!("a"), json!("b")], 1);
/// assert_eq!(
///     serde_json::to_string(&request).unwrap(),
///     r#"{"jsonrpc":"2.0","method":"foo","params":["a","b"],"id":1}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Remote method, passed through uninterpreted (`eth_*`, `parity_*`, `net_*`)
    pub method: String,
    /// Positional parameters, emitted as `[]` when empty
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
    /// Correlation id assigned by the base transport
    pub id: u64,
}

impl JsonRpcRequest {
    /// Build a request envelope
    pub fn new(method: impl Into<String>, params: Vec<serde_json::Value>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// Incoming response envelope
///
/// Exactly one of `result` and `error` is meaningful. A `result` of JSON
/// `null` deserializes to `None` and is still a success (`eth_getTransactionReceipt`
/// for an unknown hash, for instance), so callers should go through
/// [`JsonRpcResponse::into_result`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"; tolerated when missing
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Success value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
    /// Id of the request being answered
    pub id: Id,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(result: serde_json::Value, id: impl Into<Id>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: id.into(),
        }
    }

    /// Create an error response
    pub fn error(error: JsonRpcErrorData, id: impl Into<Id>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id: id.into(),
        }
    }

    /// True when the node reported an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert into the caller-facing outcome
    ///
    /// `error` wins over `result`; a missing result is JSON `null`.
    pub fn into_result(self) -> Result<serde_json::Value> {
        match self.error {
            Some(error) => Err(Error::Rpc(error)),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// Server-pushed message without an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always "2.0"; tolerated when missing
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Notification method, e.g. `eth_subscription`
    pub method: String,
    /// Payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Create a notification
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    /// The pub/sub API prefix when this is an `<api>_subscription` message
    ///
    /// ```rust
    /// use ethrpc_core::JsonRpcNotification;
    ///
    /// let notif = JsonRpcNotification::new("parity_subscription", None);
    /// assert_eq!(notif.subscription_api(), Some("parity"));
    /// ```
    pub fn subscription_api(&self) -> Option<&str> {
        self.method.strip_suffix("_subscription")
    }

    /// Decode the pub/sub payload, if the params have that shape
    pub fn subscription_params(&self) -> Option<SubscriptionParams> {
        self.params
            .as_ref()
            .and_then(|params| serde_json::from_value(params.clone()).ok())
    }
}

/// Payload of an `<api>_subscription` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    /// Server-assigned subscription id (the value `<api>_subscribe` resolved with)
    pub subscription: serde_json::Value,
    /// New value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure reported for this subscription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
}

impl SubscriptionParams {
    /// Convert into the value handed to a subscription callback
    pub fn into_result(self) -> Result<serde_json::Value> {
        match self.error {
            Some(error) => Err(Error::Rpc(error)),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// Any message a transport may receive
///
/// A frame with an `id` is a response, one without is a notification. A
/// frame carrying both `id` and `method` is a request from the server; this
/// client does not serve those, so it fails to deserialize rather than being
/// mistaken for a reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// Reply to a request
    Response(JsonRpcResponse),
    /// Server-pushed message
    Notification(JsonRpcNotification),
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let value = serde_json::Value::deserialize(deserializer)?;
        let has_id = value.get("id").is_some();
        let has_method = value.get("method").is_some();

        match (has_id, has_method) {
            (true, true) => Err(D::Error::custom("server requests are not supported")),
            (true, false) => JsonRpcResponse::deserialize(value)
                .map(JsonRpcMessage::Response)
                .map_err(D::Error::custom),
            (false, _) => JsonRpcNotification::deserialize(value)
                .map(JsonRpcMessage::Notification)
                .map_err(D::Error::custom),
        }
    }
}

impl JsonRpcMessage {
    /// True for [`JsonRpcMessage::Response`]
    pub fn is_response(&self) -> bool {
        matches!(self, JsonRpcMessage::Response(_))
    }

    /// True for [`JsonRpcMessage::Notification`]
    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcMessage::Notification(_))
    }
}
