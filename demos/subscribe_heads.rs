//! WebSocket subscription example
//!
//! Follows new block headers until Ctrl-C, then unsubscribes and closes.
//!
//! Run with: cargo run --example subscribe_heads -- ws://127.0.0.1:8546

use ethrpc::client::{EventKind, TransportEvent};
use ethrpc::{params, WsTransport};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    number: String,
    hash: String,
    #[serde(default)]
    gas_used: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8546".to_string());

    let node = WsTransport::builder(url.as_str())
        .on(EventKind::Open, |_| async { println!("socket open") })
        .on(EventKind::Error, |event| async move {
            if let TransportEvent::Error(reason) = event {
                eprintln!("socket error: {}", reason);
            }
        })
        .on(EventKind::Close, |_| async { println!("socket closed") })
        .connect()
        .await?;

    let id = node
        .subscribe(
            "eth",
            |message| match message.and_then(|value| {
                serde_json::from_value::<Header>(value).map_err(ethrpc::Error::from)
            }) {
                Ok(header) => println!(
                    "block {} {} gas used {}",
                    header.number,
                    header.hash,
                    header.gas_used.as_deref().unwrap_or("?")
                ),
                Err(e) => tracing::warn!(error = %e, "subscription message"),
            },
            params!["newHeads"],
        )
        .await?;
    println!("subscribed as {}", id);

    tokio::signal::ctrl_c().await?;

    node.unsubscribe(id).await?;
    node.close().await;

    Ok(())
}
