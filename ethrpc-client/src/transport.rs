//! The surface the rest of an application programs against
//!
//! Both [`HttpTransport`](crate::HttpTransport) and
//! [`WsTransport`](crate::WsTransport) implement [`Transport`]; code that
//! only needs "call a method, get a result" should take `impl Transport` (or
//! `&dyn Transport`) so it works over either.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ethrpc_client::{Transport, TransportExt};
//! use ethrpc_core::params;
//!
//! async fn latest_block(node: &impl Transport) -> ethrpc_core::Result<String> {
//!     node.request("eth_blockNumber", params![]).await
//! }
//! ```

use async_trait::async_trait;
use ethrpc_core::{BaseTransport, Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A JSON-RPC connection to an Ethereum node
#[async_trait]
pub trait Transport: Send + Sync {
    /// Id counter and debug gate shared by every handle to this connection
    fn base(&self) -> &BaseTransport;

    /// Call `method` with positional `params` and return the raw result
    ///
    /// Fails with `Error::Transport` when no reply could be obtained and with
    /// `Error::Rpc` when the node reported an error.
    async fn execute(&self, method: &str, params: Vec<Value>) -> Result<Value>;

    /// Last observed connection status
    fn is_connected(&self) -> bool;

    /// Turn diagnostic output on or off
    fn set_debug(&self, flag: bool) {
        self.base().set_debug(flag);
    }

    /// Whether diagnostic output is on
    fn is_debug(&self) -> bool {
        self.base().is_debug()
    }

    /// The id the next request will carry
    fn id(&self) -> u64 {
        self.base().id()
    }
}

/// Typed convenience on top of [`Transport::execute`]
#[async_trait]
pub trait TransportExt: Transport {
    /// Call `method` and deserialize the result into `R`
    async fn request<R>(&self, method: &str, params: Vec<Value>) -> Result<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let value = self.execute(method, params).await?;
        serde_json::from_value(value).map_err(Error::from)
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}
