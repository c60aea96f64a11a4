//! Node token authentication for WebSocket connections
//!
//! A node started with WebSocket authentication expects the handshake to
//! carry a `Sec-WebSocket-Protocol` of the form
//!
//! ```text
//! <hex keccak256("<token>:<unix seconds>")>_<unix seconds>
//! ```
//!
//! The token itself is the first `;`-separated field of the first line of
//! the node's auth-codes file.

use ethrpc_core::{Result, TransportError};
use sha3::{Digest, Keccak256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};

/// Handshake subprotocol proving knowledge of `token` at time `secs`
///
/// ```rust
/// use ethrpc_client::auth::auth_protocol;
///
/// let proto = auth_protocol("secret", 1_500_000_000);
/// assert!(proto.ends_with("_1500000000"));
/// assert_eq!(proto.len(), 64 + 1 + 10);
/// ```
pub fn auth_protocol(token: &str, secs: u64) -> String {
    let hashed = Keccak256::digest(format!("{}:{}", token, secs).as_bytes());
    format!("{}_{}", hex::encode(hashed), secs)
}

/// [`auth_protocol`] for the current time
pub fn auth_protocol_now(token: &str) -> Result<String> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| TransportError::Auth(format!("system clock before epoch: {}", e)))?
        .as_secs();
    Ok(auth_protocol(token, secs))
}

/// Read the token from a node auth-codes file
pub fn read_token_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| TransportError::Auth(format!("{}: {}", path.display(), e)))?;

    contents
        .lines()
        .next()
        .and_then(|line| line.split(';').next())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TransportError::Auth(format!("{}: no auth code", path.display())).into())
}

/// Add the authentication subprotocol to a handshake request
pub fn authorize(request: &mut Request, token: &str) -> Result<()> {
    let proto = auth_protocol_now(token)?;
    let value = HeaderValue::from_str(&proto)
        .map_err(|e| TransportError::Auth(format!("invalid subprotocol: {}", e)))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    Ok(())
}
