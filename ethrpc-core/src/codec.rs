//! Encoding and decoding of JSON-RPC frames
//!
//! Outgoing frames are produced with [`encode`] / [`encode_request`]; the key
//! order follows the struct declaration, so the output is stable and
//! comparable byte-for-byte.
//!
//! Incoming text goes through [`decode_frame`], which accepts a single message
//! or an array of messages (some nodes batch replies on a socket). Anything it
//! cannot make sense of is reported as [`Error::Protocol`]; transports log and
//! drop such messages rather than failing the connection.
//!
//! # Examples
//!
//! ```rust
//! use ethrpc_core::{codec, JsonRpcRequest};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new("eth_blockNumber", vec![], 1);
//! let text = codec::encode_request(&request).unwrap();
//!
//! let decoded = codec::decode_request(&text).unwrap();
//! assert_eq!(decoded.method, "eth_blockNumber");
//!
//! let frames = codec::decode_frame(r#"[{"jsonrpc":"2.0","id":1,"result":"0x10"}, 7]"#).unwrap();
//! assert_eq!(frames.len(), 2);
//! assert!(frames[0].is_ok());
//! assert!(frames[1].is_err());
//! ```

use crate::error::{Error, Result};
use crate::types::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use serde::{Deserialize, Serialize};

/// Serialize any message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Serialize a request envelope
pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

/// Decode a string into a specific type
///
/// Mismatches are [`Error::Serialization`]; use [`decode`] or
/// [`decode_frame`] for inbound traffic of unknown shape.
pub fn decode_as<'de, T: Deserialize<'de>>(data: &'de str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a request envelope
pub fn decode_request(data: &str) -> Result<JsonRpcRequest> {
    decode_as(data)
}

/// Decode a response envelope
pub fn decode_response(data: &str) -> Result<JsonRpcResponse> {
    decode_as(data)
}

/// Decode a single inbound message
///
/// ```rust
/// use ethrpc_core::codec;
///
/// assert!(codec::decode(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap().is_response());
/// assert!(codec::decode("[]").is_err());
/// ```
pub fn decode(data: &str) -> Result<JsonRpcMessage> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| Error::Protocol(format!("invalid JSON: {}", e)))?;
    decode_value(value)
}

/// Decode an inbound frame holding one message or an array of messages
///
/// Unparseable JSON, an empty array and a malformed single message fail the
/// whole frame. Array elements are decoded independently: each gets its own
/// entry, so one broken element does not hide the replies around it.
pub fn decode_frame(data: &str) -> Result<Vec<Result<JsonRpcMessage>>> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| Error::Protocol(format!("invalid JSON: {}", e)))?;

    match value {
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Err(Error::Protocol("empty batch".to_string()));
            }
            Ok(items.into_iter().map(decode_value).collect())
        }
        other => Ok(vec![Ok(decode_value(other)?)]),
    }
}

fn decode_value(value: serde_json::Value) -> Result<JsonRpcMessage> {
    if !value.is_object() {
        return Err(Error::Protocol(format!("not a JSON-RPC message: {}", value)));
    }
    serde_json::from_value(value)
        .map_err(|e| Error::Protocol(format!("not a JSON-RPC message: {}", e)))
}
