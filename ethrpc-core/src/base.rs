//! Request envelope encoder shared by the concrete transports
//!
//! A [`BaseTransport`] owns the two pieces of state every transport needs: the
//! id counter and the debug flag. Clones share both, so one logical connection
//! hands out one strictly increasing id sequence no matter which handle
//! encodes the request.
//!
//! Diagnostics go through [`BaseTransport::log`] and [`BaseTransport::error`].
//! With debug off they return before touching `tracing`, so no event is
//! created at all; with debug on each call emits exactly one event on the
//! `ethrpc::transport` target.
//!
//! # Examples
//!
//! ```rust
//! use ethrpc_core::BaseTransport;
//! use serde_json::json;
//!
//! let base = BaseTransport::new();
//! assert_eq!(base.id(), 1);
//!
//! let text = base.encode("foo", vec![json!("a"), json!("b")]).unwrap();
//! assert_eq!(text, r#"{"jsonrpc":"2.0","method":"foo","params":["a","b"],"id":1}"#);
//! assert_eq!(base.id(), 2);
//! ```

use crate::codec;
use crate::error::Result;
use crate::types::JsonRpcRequest;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// First id handed out by a fresh transport
pub const INITIAL_ID: u64 = 1;

/// Target used for all transport diagnostics
pub const LOG_TARGET: &str = "ethrpc::transport";

/// Id counter and debug gate for one logical connection
#[derive(Clone)]
pub struct BaseTransport {
    next_id: Arc<AtomicU64>,
    debug: Arc<AtomicBool>,
}

impl BaseTransport {
    /// Create a transport base with debug output off
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(INITIAL_ID)),
            debug: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The id the next encoded request will carry
    pub fn id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Consume one id
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Build a request envelope, consuming one id
    pub fn envelope(&self, method: &str, params: Vec<serde_json::Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(method, params, self.next_id())
    }

    /// Build and serialize a request envelope, consuming one id
    pub fn encode(&self, method: &str, params: Vec<serde_json::Value>) -> Result<String> {
        codec::encode_request(&self.envelope(method, params))
    }

    /// Turn diagnostic output on or off
    pub fn set_debug(&self, flag: bool) {
        self.debug.store(flag, Ordering::SeqCst);
    }

    /// Whether diagnostic output is on
    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    /// Emit an informational diagnostic when debug is on
    pub fn log(&self, message: impl fmt::Display) {
        if !self.is_debug() {
            return;
        }
        tracing::info!(target: LOG_TARGET, "{}", message);
    }

    /// Emit an error diagnostic when debug is on
    pub fn error(&self, message: impl fmt::Display) {
        if !self.is_debug() {
            return;
        }
        tracing::error!(target: LOG_TARGET, "{}", message);
    }
}

impl Default for BaseTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BaseTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseTransport")
            .field("next_id", &self.id())
            .field("debug", &self.is_debug())
            .finish()
    }
}
