//! ethrpc - JSON-RPC 2.0 transports for Ethereum nodes
//!
//! This is the convenience crate that re-exports the workspace crates.
//!
//! # Architecture
//!
//! - **ethrpc-core**: wire types, codec, base transport (id counter and debug
//!   gate), errors, observability
//! - **ethrpc-client**: HTTP and WebSocket transports, subscriptions,
//!   metrics, call log, retries
//!
//! # Quick Start - HTTP
//!
//! ```rust,no_run
//! use ethrpc::{params, HttpTransport, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = HttpTransport::new("http://127.0.0.1:8545")?;
//!
//!     let block = node.execute("eth_blockNumber", params![]).await?;
//!     println!("block: {}", block);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - WebSocket
//!
//! ```rust,no_run
//! use ethrpc::{params, WsTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = WsTransport::connect("ws://127.0.0.1:8546").await?;
//!
//!     node.subscribe("eth", |head| println!("head: {:?}", head), params!["newHeads"])
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     node.close().await;
//!     Ok(())
//! }
//! ```

pub use ethrpc_client as client;
pub use ethrpc_core as core;

pub use ethrpc_client::{HttpTransport, Transport, TransportExt, WsTransport};
pub use ethrpc_core::{params, Error, Result};
